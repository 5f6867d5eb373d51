// export.rs - Export/Upload Adapter
// Serializes the registry into Discord's application command declaration
// schema and publishes it, globally or to a single guild.
//
// Key Features:
// - Slash commands sharing a group become sub-commands of one parent declaration
// - Context menu commands are declared by name and type only
// - Upload failures are logged with Discord's structured error detail

use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::commands::model::{Command, CommandOption, CommandType, OptionType};
use crate::commands::registry::CommandRegistry;
use crate::error::CommandError;

// ============================================================================
// DECLARATION SCHEMA
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeclaredOption {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<DeclaredOption>>,
}

impl From<&CommandOption> for DeclaredOption {
    fn from(option: &CommandOption) -> Self {
        Self {
            name: option.name.clone(),
            description: option.description.clone(),
            kind: option.kind.code(),
            required: Some(option.required),
            options: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandDeclaration {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<DeclaredOption>>,
}

fn declared_options(command: &Command) -> Vec<DeclaredOption> {
    command.options().iter().map(DeclaredOption::from).collect()
}

/// Ungrouped slash commands first, then one parent per group in order of first
/// appearance, then user menus, then message menus.
pub fn build_declarations(
    slash: &[Arc<Command>],
    user_menus: &[Arc<Command>],
    chat_menus: &[Arc<Command>],
) -> Vec<CommandDeclaration> {
    let mut declarations = Vec::new();
    let mut groups: Vec<CommandDeclaration> = Vec::new();

    for command in slash {
        match command.group() {
            Some(group) => {
                let position = match groups.iter().position(|parent| parent.name == group) {
                    Some(position) => position,
                    None => {
                        groups.push(CommandDeclaration {
                            name: group.to_string(),
                            description: Some(format!("{} interface", group)),
                            kind: CommandType::Slash.code(),
                            options: Some(Vec::new()),
                        });
                        groups.len() - 1
                    }
                };

                if let Some(options) = groups[position].options.as_mut() {
                    options.push(DeclaredOption {
                        name: command.name().to_string(),
                        description: command.description().to_string(),
                        kind: OptionType::SubCommand.code(),
                        required: None,
                        options: Some(declared_options(command)),
                    });
                }
            }
            None => declarations.push(CommandDeclaration {
                name: command.name().to_string(),
                description: Some(command.description().to_string()),
                kind: command.command_type().code(),
                options: Some(declared_options(command)),
            }),
        }
    }

    declarations.extend(groups);
    declarations.extend(user_menus.iter().chain(chat_menus).map(|command| CommandDeclaration {
        name: command.name().to_string(),
        description: None,
        kind: command.command_type().code(),
        options: None,
    }));
    declarations
}

impl CommandRegistry {
    /// The full externally declarable command set
    pub async fn export(&self) -> Vec<CommandDeclaration> {
        build_declarations(
            &self.slash_commands().await,
            &self.user_context_menu_commands().await,
            &self.chat_context_menu_commands().await,
        )
    }
}

// ============================================================================
// UPLOAD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadTarget {
    Global,
    Guild(u64),
}

impl FromStr for UploadTarget {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("global") {
            return Ok(UploadTarget::Global);
        }
        s.parse::<u64>()
            .map(UploadTarget::Guild)
            .map_err(|_| CommandError::Invalid(format!("'{}' is not a guild id", s)))
    }
}

impl fmt::Display for UploadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadTarget::Global => f.write_str("global"),
            UploadTarget::Guild(id) => write!(f, "guild {}", id),
        }
    }
}

pub struct CommandUploader {
    http: reqwest::Client,
    api_base: String,
    token: String,
    application_id: OnceCell<u64>,
}

impl CommandUploader {
    pub fn new(api_base: &str, token: &str, application_id: Option<u64>) -> Self {
        let cell = OnceCell::new();
        if let Some(id) = application_id {
            let _ = cell.set(id);
        }
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            application_id: cell,
        }
    }

    /// First value wins; later calls are ignored
    pub fn set_application_id(&self, id: u64) {
        let _ = self.application_id.set(id);
    }

    pub fn application_id(&self) -> Option<u64> {
        self.application_id.get().copied()
    }

    pub fn endpoint(&self, application_id: u64, target: UploadTarget) -> String {
        match target {
            UploadTarget::Global => {
                format!("{}/applications/{}/commands", self.api_base, application_id)
            }
            UploadTarget::Guild(guild) => format!(
                "{}/applications/{}/guilds/{}/commands",
                self.api_base, application_id, guild
            ),
        }
    }

    /// Bulk-overwrite the declared commands. Returns how many Discord accepted.
    pub async fn upload(
        &self,
        declarations: &[CommandDeclaration],
        target: UploadTarget,
    ) -> Result<usize, CommandError> {
        let application_id = self
            .application_id()
            .ok_or_else(|| CommandError::Upload("application id is not known yet".to_string()))?;

        let response = self
            .http
            .put(self.endpoint(application_id, target))
            .header("Authorization", format!("Bot {}", self.token))
            .json(declarations)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(CommandError::Upload(describe_upload_error(status.as_u16(), &body)));
        }

        let accepted = serde_json::from_str::<Vec<Value>>(&body)
            .map(|commands| commands.len())
            .unwrap_or(declarations.len());
        Ok(accepted)
    }
}

/// Turn a failed upload response into the most detailed message available
pub fn describe_upload_error(status: u16, body: &str) -> String {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return format!("HTTP {}: {}", status, body.trim());
    };

    let message = json.get("message").and_then(Value::as_str).unwrap_or("unknown error");
    let code = json.get("code").and_then(Value::as_i64).unwrap_or_default();
    match json.get("errors") {
        Some(errors) => format!(
            "HTTP {} ({}): {}\n{}",
            status,
            code,
            message,
            serde_json::to_string_pretty(errors).unwrap_or_else(|_| errors.to_string())
        ),
        None => format!("HTTP {} ({}): {}", status, code, message),
    }
}
