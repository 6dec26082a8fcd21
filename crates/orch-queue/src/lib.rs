pub mod callback;
pub mod error;
pub mod manager;
pub mod types;

pub use callback::{ResultSink, TaskHandler};
pub use error::{QueueError, Result};
pub use manager::QueueManager;
pub use types::{QueueKind, QueueManagerStatus, QueueSnapshot, QueueTask};
