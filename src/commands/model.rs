// model.rs - Command Model
// Value types for a loadable command: shared metadata lifted into CommandInfo,
// per-kind data carried by the CommandKind variant, and the CommandHandler
// trait implemented by every command body.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::commands::context::CommandContext;
use crate::commands::plugin::BotPlugin;
use crate::error::{CommandError, CommandResult};

static COMMAND_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[-_\p{L}\p{N}]{1,32}$").expect("command name pattern is valid")
});

const MAX_DESCRIPTION_LEN: usize = 100;
const MAX_MENU_NAME_LEN: usize = 32;

// ============================================================================
// KINDS AND OPTIONS
// ============================================================================

/// How a command is invoked on the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandType {
    #[serde(rename = "slash")]
    Slash,
    #[serde(rename = "user")]
    UserContextMenu,
    #[serde(rename = "message")]
    ChatContextMenu,
}

impl CommandType {
    /// Discord application command type discriminator
    pub fn code(self) -> u8 {
        match self {
            CommandType::Slash => 1,
            CommandType::UserContextMenu => 2,
            CommandType::ChatContextMenu => 3,
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CommandType::Slash => "slash",
            CommandType::UserContextMenu => "user",
            CommandType::ChatContextMenu => "message",
        };
        f.write_str(label)
    }
}

/// Discord application command option types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionType {
    SubCommand,
    SubCommandGroup,
    String,
    Integer,
    Boolean,
    User,
    Channel,
    Role,
    Mentionable,
    Number,
    Attachment,
}

impl OptionType {
    pub fn code(self) -> u8 {
        match self {
            OptionType::SubCommand => 1,
            OptionType::SubCommandGroup => 2,
            OptionType::String => 3,
            OptionType::Integer => 4,
            OptionType::Boolean => 5,
            OptionType::User => 6,
            OptionType::Channel => 7,
            OptionType::Role => 8,
            OptionType::Mentionable => 9,
            OptionType::Number => 10,
            OptionType::Attachment => 11,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOption {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: OptionType,
    #[serde(default)]
    pub required: bool,
}

impl CommandOption {
    pub fn new(name: &str, description: &str, kind: OptionType, required: bool) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            required,
        }
    }
}

/// Per-kind data. Context menu commands carry nothing beyond the shared info.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    Slash {
        group: String,
        options: Vec<CommandOption>,
    },
    UserContextMenu,
    ChatContextMenu,
}

impl CommandKind {
    pub fn slash(group: &str, options: Vec<CommandOption>) -> Self {
        CommandKind::Slash {
            group: group.to_string(),
            options,
        }
    }

    pub fn command_type(&self) -> CommandType {
        match self {
            CommandKind::Slash { .. } => CommandType::Slash,
            CommandKind::UserContextMenu => CommandType::UserContextMenu,
            CommandKind::ChatContextMenu => CommandType::ChatContextMenu,
        }
    }
}

/// Registry key: at most one live command per (type, name)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandId {
    pub kind: CommandType,
    pub name: String,
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.code(), self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandInfo {
    pub name: String,
    pub description: String,
    pub dependencies: Vec<String>,
}

impl CommandInfo {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

// ============================================================================
// COMMAND BODY CONTRACT
// ============================================================================

#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    /// Run the command for one interaction
    async fn execute(&self, ctx: &CommandContext) -> CommandResult;

    /// Setup after installation. `previous` is the displaced body on hot-reload.
    async fn load(&self, _previous: Option<&dyn CommandHandler>) -> CommandResult {
        Ok(())
    }

    /// Release timers, listeners and the like. Called at most once per command.
    fn destroy(&self) {}

    fn as_any(&self) -> &dyn Any;
}

// ============================================================================
// COMMAND
// ============================================================================

pub struct Command {
    info: CommandInfo,
    kind: CommandKind,
    plugin: Option<Weak<BotPlugin>>,
    source_path: Option<PathBuf>,
    handler: Box<dyn CommandHandler>,
    loaded_at: DateTime<Utc>,
    destroyed: AtomicBool,
}

impl Command {
    pub fn new(
        info: CommandInfo,
        kind: CommandKind,
        handler: Box<dyn CommandHandler>,
    ) -> Result<Self, CommandError> {
        validate(&info, &kind)?;
        Ok(Self {
            info,
            kind,
            plugin: None,
            source_path: None,
            handler,
            loaded_at: Utc::now(),
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> CommandId {
        CommandId {
            kind: self.command_type(),
            name: self.info.name.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn description(&self) -> &str {
        &self.info.description
    }

    pub fn dependencies(&self) -> &[String] {
        &self.info.dependencies
    }

    pub fn command_type(&self) -> CommandType {
        self.kind.command_type()
    }

    /// Parent namespace of a slash command; `None` when ungrouped or not slash
    pub fn group(&self) -> Option<&str> {
        match &self.kind {
            CommandKind::Slash { group, .. } if !group.is_empty() => Some(group),
            _ => None,
        }
    }

    pub fn options(&self) -> &[CommandOption] {
        match &self.kind {
            CommandKind::Slash { options, .. } => options,
            _ => &[],
        }
    }

    pub fn set_plugin(&mut self, plugin: &Arc<BotPlugin>) {
        self.plugin = Some(Arc::downgrade(plugin));
    }

    /// Owning plugin, if it is still alive
    pub fn plugin(&self) -> Option<Arc<BotPlugin>> {
        self.plugin.as_ref().and_then(Weak::upgrade)
    }

    pub fn set_source_path(&mut self, path: impl Into<PathBuf>) {
        self.source_path = Some(path.into());
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn handler(&self) -> &dyn CommandHandler {
        self.handler.as_ref()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub async fn execute(&self, ctx: &CommandContext) -> CommandResult {
        self.handler.execute(ctx).await
    }

    pub async fn load(&self, previous: Option<&Command>) -> CommandResult {
        self.handler.load(previous.map(Command::handler)).await
    }

    /// Idempotent: the handler's destroy runs on the first call only
    pub fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            self.handler.destroy();
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("info", &self.info)
            .field("kind", &self.kind)
            .field("source_path", &self.source_path)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

fn validate(info: &CommandInfo, kind: &CommandKind) -> Result<(), CommandError> {
    match kind {
        CommandKind::Slash { group, options } => {
            check_slash_name(&info.name)?;
            if !group.is_empty() {
                check_slash_name(group)?;
            }
            check_description(&info.name, &info.description)?;
            for option in options {
                check_slash_name(&option.name)?;
                check_description(&option.name, &option.description)?;
            }
        }
        CommandKind::UserContextMenu | CommandKind::ChatContextMenu => {
            let len = info.name.chars().count();
            if len == 0 || len > MAX_MENU_NAME_LEN {
                return Err(CommandError::Invalid(format!(
                    "context menu name '{}' must be 1-{} characters",
                    info.name, MAX_MENU_NAME_LEN
                )));
            }
        }
    }
    Ok(())
}

fn check_slash_name(name: &str) -> Result<(), CommandError> {
    if !COMMAND_NAME.is_match(name) || name.to_lowercase() != name {
        return Err(CommandError::Invalid(format!(
            "'{}' is not a valid lowercase command name",
            name
        )));
    }
    Ok(())
}

fn check_description(name: &str, description: &str) -> Result<(), CommandError> {
    let len = description.chars().count();
    if len == 0 || len > MAX_DESCRIPTION_LEN {
        return Err(CommandError::Invalid(format!(
            "description of '{}' must be 1-{} characters",
            name, MAX_DESCRIPTION_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::RecordingHandler;

    #[test]
    fn unique_id_combines_type_and_name() {
        let (handler, _) = RecordingHandler::new();
        let command = Command::new(
            CommandInfo::new("ping", "Check latency"),
            CommandKind::slash("", vec![]),
            Box::new(handler),
        )
        .unwrap();

        assert_eq!(command.id().to_string(), "1ping");
        assert_eq!(command.group(), None);
    }

    #[test]
    fn destroy_runs_handler_once() {
        let (handler, calls) = RecordingHandler::new();
        let command = Command::new(
            CommandInfo::new("Quote", ""),
            CommandKind::ChatContextMenu,
            Box::new(handler),
        )
        .unwrap();

        command.destroy();
        command.destroy();

        assert!(command.is_destroyed());
        assert_eq!(calls.destroyed(), 1);
    }

    #[test]
    fn rejects_uppercase_slash_names() {
        let (handler, _) = RecordingHandler::new();
        let result = Command::new(
            CommandInfo::new("Ping", "Check latency"),
            CommandKind::slash("", vec![]),
            Box::new(handler),
        );
        assert!(matches!(result, Err(CommandError::Invalid(_))));
    }

    #[test]
    fn rejects_missing_slash_description() {
        let (handler, _) = RecordingHandler::new();
        let result = Command::new(
            CommandInfo::new("ping", ""),
            CommandKind::slash("", vec![]),
            Box::new(handler),
        );
        assert!(result.is_err());
    }

    #[test]
    fn context_menu_names_may_contain_spaces() {
        let (handler, _) = RecordingHandler::new();
        let command = Command::new(
            CommandInfo::new("Show Avatar", ""),
            CommandKind::UserContextMenu,
            Box::new(handler),
        )
        .unwrap();
        assert_eq!(command.command_type(), CommandType::UserContextMenu);
        assert!(command.options().is_empty());
    }

    #[tokio::test]
    async fn load_hands_previous_handler_over() {
        let (old_handler, _) = RecordingHandler::named("old");
        let (new_handler, calls) = RecordingHandler::named("new");
        let old = Command::new(
            CommandInfo::new("ping", "Check latency"),
            CommandKind::slash("", vec![]),
            Box::new(old_handler),
        )
        .unwrap();
        let new = Command::new(
            CommandInfo::new("ping", "Check latency"),
            CommandKind::slash("", vec![]),
            Box::new(new_handler),
        )
        .unwrap();

        new.load(Some(&old)).await.unwrap();
        new.load(None).await.unwrap();

        assert_eq!(calls.loads(), vec![Some("old".to_string()), None]);
    }
}
