//! Rainbow agent.
mod base;
mod config;
mod explorer;
pub use base::Rainbow;
pub use config::RainbowConfig;
pub use explorer::EpsilonGreedy;
