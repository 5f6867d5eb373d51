// menu.rs - Context menu commands
// "avatar" shows the selected user's avatar; "quote" re-posts the selected
// message as a quote.

use async_trait::async_trait;
use serde_json::Value;
use std::any::Any;

use crate::commands::context::{CommandContext, InvocationTarget};
use crate::commands::model::CommandHandler;
use crate::error::{CommandError, CommandResult};

pub struct AvatarCommand;

pub fn build_avatar(_settings: &Value) -> Result<Box<dyn CommandHandler>, CommandError> {
    Ok(Box::new(AvatarCommand))
}

#[async_trait]
impl CommandHandler for AvatarCommand {
    async fn execute(&self, ctx: &CommandContext) -> CommandResult {
        match &ctx.invocation.target {
            Some(InvocationTarget::User { name, avatar_url, .. }) => {
                ctx.reply(&format!("**{}**\n{}", name, avatar_url)).await
            }
            _ => ctx.reply("No user selected.").await,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct QuoteCommand;

pub fn build_quote(_settings: &Value) -> Result<Box<dyn CommandHandler>, CommandError> {
    Ok(Box::new(QuoteCommand))
}

#[async_trait]
impl CommandHandler for QuoteCommand {
    async fn execute(&self, ctx: &CommandContext) -> CommandResult {
        let Some(InvocationTarget::Message { author, content, .. }) = &ctx.invocation.target else {
            return ctx.reply("No message selected.").await;
        };

        if content.trim().is_empty() {
            return ctx.reply("That message has no text to quote.").await;
        }

        let quoted: Vec<String> = content.lines().map(|line| format!("> {}", line)).collect();
        ctx.reply(&format!("{}\n— {}", quoted.join("\n"), author)).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
