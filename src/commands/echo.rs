// echo.rs - Echo and Reply Command Module
// Small bodies that answer with text: /echo repeats an option back, and
// "reply" answers with fixed content taken from the command definition.
//
// Used by: catalog.rs (handlers "echo" and "reply")

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::any::Any;

use crate::commands::context::CommandContext;
use crate::commands::model::CommandHandler;
use crate::error::{CommandError, CommandResult};

fn default_option() -> String {
    "message".to_string()
}

#[derive(Debug, Deserialize)]
pub struct EchoCommand {
    #[serde(default = "default_option")]
    option: String,
}

pub fn build_echo(settings: &Value) -> Result<Box<dyn CommandHandler>, CommandError> {
    let echo = if settings.is_null() {
        EchoCommand {
            option: default_option(),
        }
    } else {
        EchoCommand::deserialize(settings)
            .map_err(|e| CommandError::Invalid(format!("echo settings: {}", e)))?
    };
    Ok(Box::new(echo))
}

#[async_trait]
impl CommandHandler for EchoCommand {
    async fn execute(&self, ctx: &CommandContext) -> CommandResult {
        let text = ctx.option_str(&self.option).unwrap_or("").trim();
        // If no text is provided, reply with usage guidance
        if text.is_empty() {
            ctx.reply("Please provide text to echo!").await
        } else {
            ctx.reply(text).await
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct ReplyCommand {
    content: String,
    #[serde(default)]
    ephemeral: bool,
}

pub fn build_reply(settings: &Value) -> Result<Box<dyn CommandHandler>, CommandError> {
    let reply = ReplyCommand::deserialize(settings)
        .map_err(|e| CommandError::Invalid(format!("reply settings: {}", e)))?;
    if reply.content.trim().is_empty() {
        return Err(CommandError::Invalid("reply content is empty".to_string()));
    }
    Ok(Box::new(reply))
}

#[async_trait]
impl CommandHandler for ReplyCommand {
    async fn execute(&self, ctx: &CommandContext) -> CommandResult {
        if self.ephemeral {
            ctx.defer_reply(true).await?;
            return ctx.edit_reply(&self.content).await;
        }
        ctx.reply(&self.content).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
