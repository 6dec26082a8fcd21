use std::sync::Arc;

use orch_context::ContextStore;
use orch_core::config::ChatModeModels;
use orch_core::{ChatId, ChatMode, Content, Role};
use orch_tools::ToolRegistry;
use serde_json::{Map, Value};

const PREFIX: char = '#';

const COMMON_COMMANDS: &[&str] = &[
    "模型列表", "模型查询", "模型更换", "工具支持", "提示词", "设定提示词", "删除提示词", "上下文清理", "删除上下文", "帮助",
];
const ADMIN_COMMANDS: &[&str] = &["重载", "热重载"];

/// Result of running a `#`-prefixed command, matching
/// `essentials_manager.py`'s handler return dicts: always a `success` flag
/// and `content` string, with `chat_id`/`command` filled in once known and
/// any handler-specific fields folded into `details`.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub success: bool,
    pub content: String,
    pub chat_id: Option<ChatId>,
    pub command: Option<String>,
    pub details: Map<String, Value>,
}

impl CommandResult {
    fn error(content: impl Into<String>) -> Self {
        Self {
            success: false,
            content: content.into(),
            chat_id: None,
            command: None,
            details: Map::new(),
        }
    }

    fn ok(command: &str, chat_id: &ChatId, content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            chat_id: Some(chat_id.clone()),
            command: Some(command.to_string()),
            details: Map::new(),
        }
    }

    fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    pub fn into_value(self) -> Value {
        let mut map = self.details;
        map.insert("success".to_string(), Value::Bool(self.success));
        map.insert("content".to_string(), Value::String(self.content));
        if let Some(chat_id) = self.chat_id {
            map.insert("chat_id".to_string(), Value::String(chat_id.0));
        }
        if let Some(command) = self.command {
            map.insert("command".to_string(), Value::String(command));
        }
        Value::Object(map)
    }
}

/// True when `content`/`role` look like a `#`-prefixed command, mirroring
/// `essentials_manager.py::is_command` (assistant messages are never
/// commands; multi-part content is judged on its joined text).
pub fn is_command(role: Role, content: &Content) -> bool {
    if role == Role::Assistant {
        return false;
    }
    content.joined_text().trim().starts_with(PREFIX)
}

fn parse_command(text: &str) -> Option<(String, Vec<String>)> {
    let text = text.trim();
    let rest = text.strip_prefix(PREFIX)?.trim();
    let mut parts = rest.split_whitespace();
    let command = parts.next()?.to_string();
    let args: Vec<String> = parts.map(|s| s.to_string()).collect();
    Some((command, args))
}

fn check_permission(command: &str, chat_id: &ChatId, admins: &[String]) -> bool {
    if COMMON_COMMANDS.contains(&command) {
        return true;
    }
    if ADMIN_COMMANDS.contains(&command) {
        return admins.iter().any(|a| a == chat_id.as_str());
    }
    false
}

/// `#`-prefixed command dispatcher. Grounded on
/// `essentials_manager.py::EssentialsManager`.
pub struct CommandHandler {
    context: Arc<ContextStore>,
    tools: Arc<ToolRegistry>,
    chat_mode: ChatModeModels,
    admins: Vec<String>,
}

impl CommandHandler {
    pub fn new(context: Arc<ContextStore>, tools: Arc<ToolRegistry>, chat_mode: ChatModeModels, admins: Vec<String>) -> Self {
        Self { context, tools, chat_mode, admins }
    }

    pub async fn execute(&self, content: &str, chat_id: &ChatId) -> CommandResult {
        let Some((command, args)) = parse_command(content) else {
            return CommandResult::error("无效指令格式");
        };

        if !check_permission(&command, chat_id, &self.admins) {
            return if ADMIN_COMMANDS.contains(&command.as_str()) {
                CommandResult::error("权限不足，此指令仅限管理员使用")
            } else {
                CommandResult::error("权限不足")
            };
        }

        match command.as_str() {
            "模型列表" => self.handle_model_list(chat_id),
            "模型查询" => self.handle_model_query(chat_id).await,
            "模型更换" => self.handle_model_change(chat_id, &args).await,
            "工具支持" => self.handle_tools_toggle(chat_id, &args).await,
            "提示词" => self.handle_prompt_query(chat_id).await,
            "设定提示词" => self.handle_prompt_set(chat_id, &args).await,
            "删除提示词" => self.handle_prompt_delete(chat_id).await,
            "上下文清理" | "删除上下文" => self.handle_context_clear(chat_id).await,
            "重载" | "热重载" => self.handle_reload(chat_id).await,
            "帮助" => self.handle_help(chat_id),
            _ => CommandResult::error(format!("未知指令: #{}", command)),
        }
    }

    fn available_models(&self) -> Vec<&str> {
        self.chat_mode
            .llm_models
            .iter()
            .chain(self.chat_mode.mllm_models.iter())
            .map(String::as_str)
            .collect()
    }

    fn handle_model_list(&self, chat_id: &ChatId) -> CommandResult {
        let mut lines = vec!["可用模型列表:".to_string()];
        for (mode, models) in [
            (ChatMode::Llm, &self.chat_mode.llm_models),
            (ChatMode::Mllm, &self.chat_mode.mllm_models),
        ] {
            let mode_name = if mode == ChatMode::Llm { "llm" } else { "mllm" };
            lines.push(format!("{}模式:", mode_name));
            for model in models {
                lines.push(format!("  - {}", model));
            }
        }
        CommandResult::ok("模型列表", chat_id, lines.join("\n"))
    }

    async fn handle_model_query(&self, chat_id: &ChatId) -> CommandResult {
        let context = self.context.get(chat_id).await;
        let model = context.data.model;
        CommandResult::ok("模型查询", chat_id, format!("当前对话使用的模型: {}", model))
            .with_detail("current_model", Value::String(model))
    }

    async fn handle_model_change(&self, chat_id: &ChatId, args: &[String]) -> CommandResult {
        let Some(new_model) = args.first() else {
            return CommandResult::error("请指定要更换的模型名称");
        };
        if !self.available_models().contains(&new_model.as_str()) {
            return CommandResult::error(format!("模型 '{}' 不可用", new_model));
        }
        if let Err(e) = self.context.set_model(chat_id, new_model.clone()).await {
            return CommandResult::error(format!("更换模型失败: {}", e));
        }
        CommandResult::ok("模型更换", chat_id, format!("模型已更换为: {}", new_model))
            .with_detail("new_model", Value::String(new_model.clone()))
    }

    async fn handle_tools_toggle(&self, chat_id: &ChatId, args: &[String]) -> CommandResult {
        let Some(raw) = args.first() else {
            return CommandResult::error("请指定 true 或 false");
        };
        let enable = match raw.to_lowercase().as_str() {
            "true" => true,
            "false" => false,
            _ => return CommandResult::error("参数必须是 true 或 false"),
        };
        if let Err(e) = self.context.set_tools_call(chat_id, enable).await {
            return CommandResult::error(format!("设置工具支持失败: {}", e));
        }
        let status_text = if enable { "启用" } else { "禁用" };
        CommandResult::ok("工具支持", chat_id, format!("工具支持已{}", status_text))
            .with_detail("tools_call_enabled", Value::Bool(enable))
    }

    async fn handle_prompt_query(&self, chat_id: &ChatId) -> CommandResult {
        let (prompt, has_custom) = self.context.get_custom_prompt(chat_id).await;
        let content = if has_custom {
            format!("当前对话的专属提示词:\n{}", prompt)
        } else {
            "当前对话没有设置专属提示词，使用默认核心提示词".to_string()
        };
        CommandResult::ok("提示词", chat_id, content)
            .with_detail("has_custom_prompt", Value::Bool(has_custom))
            .with_detail("custom_prompt", Value::String(prompt))
    }

    async fn handle_prompt_set(&self, chat_id: &ChatId, args: &[String]) -> CommandResult {
        if args.is_empty() {
            return CommandResult::error("请指定要设置的提示词内容");
        }
        let new_prompt = args.join(" ");
        if let Err(e) = self.context.set_custom_prompt(chat_id, new_prompt.clone()).await {
            return CommandResult::error(format!("设置提示词失败: {}", e));
        }
        CommandResult::ok("设定提示词", chat_id, format!("专属提示词已设置:\n{}", new_prompt))
            .with_detail("new_prompt", Value::String(new_prompt))
    }

    async fn handle_prompt_delete(&self, chat_id: &ChatId) -> CommandResult {
        if let Err(e) = self.context.delete_custom_prompt(chat_id).await {
            return CommandResult::error(format!("删除提示词失败: {}", e));
        }
        CommandResult::ok("删除提示词", chat_id, "专属提示词已删除")
    }

    async fn handle_context_clear(&self, chat_id: &ChatId) -> CommandResult {
        if let Err(e) = self.context.clear(chat_id).await {
            return CommandResult::error(format!("清理上下文失败: {}", e));
        }
        CommandResult::ok("上下文清理", chat_id, "对话上下文已清理")
    }

    async fn handle_reload(&self, chat_id: &ChatId) -> CommandResult {
        self.tools.reload().await;
        CommandResult::ok("重载", chat_id, "工具系统已重载")
    }

    fn handle_help(&self, chat_id: &ChatId) -> CommandResult {
        let entries: &[(&str, &str, bool)] = &[
            ("#模型列表", "查看所有可用模型", false),
            ("#模型查询", "查看当前对话使用的模型", false),
            ("#模型更换 <模型名>", "更换当前对话的模型", false),
            ("#工具支持 <true/false>", "启用/禁用工具调用", false),
            ("#提示词", "查看当前对话的专属提示词", false),
            ("#设定提示词 <内容>", "设置专属提示词", false),
            ("#删除提示词", "删除专属提示词", false),
            ("#上下文清理 / #删除上下文", "清理当前对话的上下文", false),
            ("#重载 / #热重载", "重新加载工具系统", true),
            ("#帮助", "显示此帮助信息", false),
        ];

        let mut help_text = String::from("📚 可用指令列表:\n\n");
        for (cmd, desc, admin_only) in entries {
            if *admin_only {
                help_text.push_str(&format!("🔒 {}\n   {} (管理员指令)\n\n", cmd, desc));
            } else {
                help_text.push_str(&format!("📝 {}\n   {}\n\n", cmd, desc));
            }
        }
        help_text.push_str("📌 说明:\n");
        help_text.push_str("- 普通指令：所有用户均可使用\n");
        help_text.push_str("- 管理员指令：仅限配置的管理员私聊使用\n");

        CommandResult::ok("帮助", chat_id, help_text)
    }
}
