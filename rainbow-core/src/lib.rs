#![warn(missing_docs)]
//! Backend-independent interfaces of the rainbow agent.
//!
//! The learning core in `rainbow-candle-agent` talks to its collaborators only
//! through the traits defined here:
//!
//! * [`ReplayBufferBase`] - samples batches of transitions with importance weights
//!   and receives per-sample priorities back.
//! * [`TransitionBatch`] - a batch of n-step transitions.
//! * [`Policy`] and [`Agent`] - the acting and training surfaces of an agent.
pub mod error;
pub mod record;

mod base;
pub use base::{
    Agent, Configurable, GenericTransitionBatch, Policy, ReplayBufferBase,
    TransitionBatch,
};
pub use error::RainbowError;
