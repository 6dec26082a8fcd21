pub mod error;
pub mod frontend;
pub mod manager;
pub mod model;
pub mod model_openai;
pub mod types;
pub mod ws;

pub use error::{PortError, Result};
pub use frontend::{Frontend, InboundSink};
pub use manager::{PortManager, PortManagerConfig};
pub use model::ModelAdapter;
pub use model_openai::{build_chat_request, OpenAiCompatModel};
pub use types::{ChatRequest, ChatResponse, InboundFrame, OutboundFrame, PortStatus};
pub use ws::WsFrontend;
