// catalog.rs - Handler catalog
// Maps the `handler` name in a command definition to the compiled body that
// implements it. Settings from the definition are handed to the builder.

use serde_json::Value;
use std::collections::HashMap;

use crate::commands::model::CommandHandler;
use crate::commands::{echo, help, menu, ping};
use crate::error::CommandError;

pub type HandlerBuilder = fn(&Value) -> Result<Box<dyn CommandHandler>, CommandError>;

#[derive(Default)]
pub struct HandlerCatalog {
    builders: HashMap<String, HandlerBuilder>,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every body shipped with the bot
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register("ping", ping::build);
        catalog.register("echo", echo::build_echo);
        catalog.register("reply", echo::build_reply);
        catalog.register("help", help::build);
        catalog.register("avatar", menu::build_avatar);
        catalog.register("quote", menu::build_quote);
        catalog
    }

    pub fn register(&mut self, name: &str, builder: HandlerBuilder) {
        self.builders.insert(name.to_string(), builder);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    pub fn build(&self, name: &str, settings: &Value) -> Result<Box<dyn CommandHandler>, CommandError> {
        let builder = self
            .builders
            .get(name)
            .ok_or_else(|| CommandError::UnknownHandler(name.to_string()))?;
        builder(settings)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
