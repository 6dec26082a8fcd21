use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "./orch.toml";

/// Top-level config (`orch.toml` + `ORCH_*` env overrides), one section per
/// leaf component in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchConfig {
    #[serde(default)]
    pub context_store: ContextStoreConfig,
    #[serde(default)]
    pub tool_registry: ToolRegistryConfig,
    #[serde(default)]
    pub session_store: SessionStoreConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub rules_manager: RulesManagerConfig,
    #[serde(default)]
    pub command_handler: CommandHandlerConfig,
    #[serde(default)]
    pub port_manager: PortManagerConfig,
}

impl Default for OrchConfig {
    fn default() -> Self {
        Self {
            context_store: ContextStoreConfig::default(),
            tool_registry: ToolRegistryConfig::default(),
            session_store: SessionStoreConfig::default(),
            workflow: WorkflowConfig::default(),
            rules_manager: RulesManagerConfig::default(),
            command_handler: CommandHandlerConfig::default(),
            port_manager: PortManagerConfig::default(),
        }
    }
}

impl OrchConfig {
    /// Load config from a TOML file with `ORCH_*` env var overrides.
    ///
    /// `path` defaults to [`DEFAULT_CONFIG_PATH`]. A missing or malformed
    /// file is not fatal — the caller decides whether to fall back to
    /// [`OrchConfig::default`] (see `orch-agent::main`, which logs a warning
    /// and continues).
    pub fn load(path: Option<&str>) -> crate::error::Result<Self> {
        let path = path.unwrap_or(DEFAULT_CONFIG_PATH);
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("ORCH_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))
    }
}

/// Named chat-mode model lists, used to decide a freshly created chat's
/// `ChatMode` (LLM if any `llm_models` are configured, else MLLM).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatModeModels {
    #[serde(default)]
    pub llm_models: Vec<String>,
    #[serde(default)]
    pub mllm_models: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextStoreConfig {
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default)]
    pub chat_mode: ChatModeModels,
    #[serde(default)]
    pub default_tools_call: bool,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub stream: bool,
    /// Joined with `"\n"` to form the system message's base content.
    #[serde(default = "default_core_prompt")]
    pub core_prompt: Vec<String>,
    #[serde(default = "default_max_user_messages")]
    pub max_user_messages_per_chat: usize,
    #[serde(default = "default_cache_inactive_unload_seconds")]
    pub cache_inactive_unload_seconds: u64,
    #[serde(default = "default_history_dir")]
    pub history_dir: String,
}

impl Default for ContextStoreConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            chat_mode: ChatModeModels::default(),
            default_tools_call: false,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            stream: false,
            core_prompt: default_core_prompt(),
            max_user_messages_per_chat: default_max_user_messages(),
            cache_inactive_unload_seconds: default_cache_inactive_unload_seconds(),
            history_dir: default_history_dir(),
        }
    }
}

impl ContextStoreConfig {
    pub fn joined_core_prompt(&self) -> String {
        self.core_prompt.join("\n")
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_temperature() -> f32 {
    0.7
}
fn default_core_prompt() -> Vec<String> {
    vec!["You are a helpful assistant.".to_string()]
}
fn default_max_user_messages() -> usize {
    20
}
fn default_cache_inactive_unload_seconds() -> u64 {
    1800
}
fn default_history_dir() -> String {
    "./data/history".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRegistryConfig {
    #[serde(default = "default_tool_timeout")]
    pub default_tool_timeout_seconds: f64,
}

impl Default for ToolRegistryConfig {
    fn default() -> Self {
        Self {
            default_tool_timeout_seconds: default_tool_timeout(),
        }
    }
}

fn default_tool_timeout() -> f64 {
    30.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStoreConfig {
    #[serde(default = "default_session_timeout_minutes")]
    pub session_timeout_minutes: u64,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            session_timeout_minutes: default_session_timeout_minutes(),
            max_sessions: default_max_sessions(),
        }
    }
}

fn default_session_timeout_minutes() -> u64 {
    5
}
fn default_max_sessions() -> usize {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_tool_calls: default_max_tool_calls(),
        }
    }
}

fn default_max_tool_calls() -> u32 {
    10
}

/// Whether workflow C runs inline through the model queue (`Wait`) or as a
/// detached fan-out task (`All`). Defaults to `Wait`, the more conservative
/// choice when no deployment has opted into fan-out dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RulesMode {
    Wait,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesManagerConfig {
    #[serde(default)]
    pub mode: RulesMode,
}

impl Default for RulesManagerConfig {
    fn default() -> Self {
        Self {
            mode: RulesMode::Wait,
        }
    }
}

impl Default for RulesMode {
    fn default() -> Self {
        RulesMode::Wait
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandHandlerConfig {
    /// Chat ids allowed to run admin-only commands (`重载`/`热重载`).
    #[serde(default)]
    pub admins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortManagerConfig {
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_base_secs")]
    pub reconnect_base_secs: u64,
    #[serde(default = "default_reconnect_max_secs")]
    pub reconnect_max_secs: u64,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests_per_model: u32,
}

impl Default for PortManagerConfig {
    fn default() -> Self {
        Self {
            health_check_interval_secs: default_health_check_interval_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_secs: default_reconnect_base_secs(),
            reconnect_max_secs: default_reconnect_max_secs(),
            max_concurrent_requests_per_model: default_max_concurrent_requests(),
        }
    }
}

fn default_health_check_interval_secs() -> u64 {
    30
}
fn default_max_reconnect_attempts() -> u32 {
    10
}
fn default_reconnect_base_secs() -> u64 {
    5
}
fn default_reconnect_max_secs() -> u64 {
    300
}
fn default_max_concurrent_requests() -> u32 {
    4
}
