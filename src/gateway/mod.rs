//! Orchestrator facade and its builder

mod builder;
mod orchestrator;

pub use builder::HuginnBuilder;
pub use orchestrator::Huginn;
