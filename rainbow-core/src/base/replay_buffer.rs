//! Sampling interface for the learning core.
//!
//! The learning core does not own the storage of transitions nor the
//! prioritization scheme. It only asks a [`ReplayBufferBase`] for a batch and
//! reports per-sample loss values back through
//! [`ReplayBufferBase::update_priority`].
use anyhow::Result;

/// Interface for replay buffers that generate batches for training.
pub trait ReplayBufferBase {
    /// Configuration parameters for the replay buffer.
    type Config: Clone;

    /// The type of batch generated for training.
    type Batch;

    /// Builds a new replay buffer from the given configuration.
    fn build(config: &Self::Config) -> Self;

    /// Constructs a batch of `size` transitions.
    ///
    /// For prioritized buffers, the batch carries the indices of the sampled
    /// transitions and their importance weights.
    fn batch(&mut self, size: usize) -> Result<Self::Batch>;

    /// Updates the priorities of sampled transitions.
    ///
    /// `td_err` holds one non-negative value per sample in the order of `ixs`.
    /// How these values affect future sampling is up to the buffer.
    fn update_priority(&mut self, ixs: &Option<Vec<usize>>, td_err: &Option<Vec<f32>>);
}
