pub mod engine;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod worker;

pub use engine::ExecutionEngine;
pub use error::{EngineError, SubmitError};
pub use events::AssetEvents;
pub use orchestrator::{SubmitReceipt, TaskOrchestrator};
pub use worker::run_worker;
