// loader.rs - Command module loading
// A command module on disk is a JSON definition naming one of the compiled
// command bodies in the HandlerCatalog. Loading re-reads the file every time,
// so a hot reload always sees the current content.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use crate::commands::catalog::HandlerCatalog;
use crate::commands::model::{Command, CommandInfo, CommandKind, CommandOption, CommandType};
use crate::error::CommandError;

pub const COMMAND_FILE_EXTENSION: &str = "json";

/// Produces a fresh command instance each time it is called
pub type CommandFactory = Box<dyn Fn() -> Result<Command, CommandError> + Send + Sync>;

#[async_trait]
pub trait CommandLoader: Send + Sync {
    /// Whether `path` looks like a loadable command module at all
    fn accepts(&self, path: &Path) -> bool;

    async fn load_command_module(&self, path: &Path) -> Result<CommandFactory, CommandError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandDefinition {
    #[serde(rename = "type")]
    pub kind: CommandType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub options: Vec<CommandOption>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub handler: String,
    #[serde(default)]
    pub settings: Value,
}

impl CommandDefinition {
    pub fn build(&self, catalog: &HandlerCatalog) -> Result<Command, CommandError> {
        let kind = match self.kind {
            CommandType::Slash => CommandKind::slash(&self.group, self.options.clone()),
            menu => {
                if !self.options.is_empty() || !self.group.is_empty() {
                    return Err(CommandError::Invalid(format!(
                        "{} command '{}' cannot declare options or a group",
                        menu, self.name
                    )));
                }
                if menu == CommandType::UserContextMenu {
                    CommandKind::UserContextMenu
                } else {
                    CommandKind::ChatContextMenu
                }
            }
        };

        let handler = catalog.build(&self.handler, &self.settings)?;
        let info = CommandInfo::new(&self.name, &self.description)
            .with_dependencies(self.dependencies.clone());
        Command::new(info, kind, handler)
    }
}

/// Loads `*.json` command definitions
pub struct DefinitionLoader {
    catalog: Arc<HandlerCatalog>,
}

impl DefinitionLoader {
    pub fn new(catalog: Arc<HandlerCatalog>) -> Self {
        Self { catalog }
    }

    pub async fn read_definition(path: &Path) -> Result<CommandDefinition, CommandError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CommandError::io(path, e))?;
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(&raw);
        serde_json::from_str(raw).map_err(|source| CommandError::Definition {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[async_trait]
impl CommandLoader for DefinitionLoader {
    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext == COMMAND_FILE_EXTENSION)
            .unwrap_or(false)
    }

    async fn load_command_module(&self, path: &Path) -> Result<CommandFactory, CommandError> {
        let definition = Self::read_definition(path).await?;
        if !self.catalog.contains(&definition.handler) {
            return Err(CommandError::UnknownHandler(definition.handler));
        }

        let catalog = self.catalog.clone();
        let factory: CommandFactory = Box::new(move || definition.build(&catalog));
        Ok(factory)
    }
}
