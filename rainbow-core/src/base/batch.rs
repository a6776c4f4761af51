//! Batch of n-step transitions.

/// A batch of n-step transitions.
///
/// `reward` holds the discounted n-step return accumulated before bootstrapping.
/// `is_terminated[i] == 1` means the episode ended within the n steps, so the
/// bootstrap term of that sample is masked out.
pub trait TransitionBatch {
    /// A set of observations in a batch.
    type ObsBatch;

    /// A set of actions in a batch.
    type ActBatch;

    /// Unpack the data `(o_t, a_t, o_t+n, R_t^n, is_terminated, ixs, weight)`.
    #[allow(clippy::type_complexity)]
    fn unpack(
        self,
    ) -> (
        Self::ObsBatch,
        Self::ActBatch,
        Self::ObsBatch,
        Vec<f32>,
        Vec<i8>,
        Option<Vec<usize>>,
        Option<Vec<f32>>,
    );

    /// Returns the number of transitions in the batch.
    fn len(&self) -> usize;

    /// Returns `true` if the batch has no transitions.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A batch of transitions with arbitrary observation and action containers.
#[derive(Debug, Clone)]
pub struct GenericTransitionBatch<O, A> {
    /// Observations at the start of the transitions.
    pub obs: O,

    /// Actions taken at the start of the transitions.
    pub act: A,

    /// Observations n steps later.
    pub next_obs: O,

    /// n-step discounted returns.
    pub reward: Vec<f32>,

    /// Episode termination flags within the n steps.
    pub is_terminated: Vec<i8>,

    /// Indices of sampled transitions, used for priority feedback.
    pub ix_sample: Option<Vec<usize>>,

    /// Importance weights of sampled transitions.
    pub weight: Option<Vec<f32>>,
}

impl<O, A> TransitionBatch for GenericTransitionBatch<O, A> {
    type ObsBatch = O;
    type ActBatch = A;

    fn unpack(
        self,
    ) -> (
        O,
        A,
        O,
        Vec<f32>,
        Vec<i8>,
        Option<Vec<usize>>,
        Option<Vec<f32>>,
    ) {
        (
            self.obs,
            self.act,
            self.next_obs,
            self.reward,
            self.is_terminated,
            self.ix_sample,
            self.weight,
        )
    }

    fn len(&self) -> usize {
        self.reward.len()
    }
}
