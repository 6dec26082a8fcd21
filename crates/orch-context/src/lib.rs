pub mod error;
pub mod facade;
pub mod manager;
pub mod path;
pub mod trim;
pub mod types;

pub use error::{ContextError, Result};
pub use facade::ContextFacade;
pub use manager::ContextStore;
pub use types::{ChatContext, ChatData, ContextStoreStatus};
