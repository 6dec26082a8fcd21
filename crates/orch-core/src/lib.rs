pub mod config;
pub mod error;
pub mod image_resolver;
pub mod shutdown;
pub mod types;

pub use config::OrchConfig;
pub use error::{CoreError, Result};
pub use image_resolver::{ImageResolver, NoImages};
pub use shutdown::Shutdown;
pub use types::{
    ChatId, ChatMode, Content, ImageUrlRef, Message, MessagePart, NoTools, Role, ToolCallFunction,
    ToolCallRequest, ToolDefinition, ToolSchemaHandle, ToolSchemaProvider, WorkflowType,
};
