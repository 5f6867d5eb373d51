// help.rs - Help Command Module
// Lists the commands that are currently registered, so the text always
// matches what the registry would dispatch after the latest reload.

use async_trait::async_trait;
use serde_json::Value;
use std::any::Any;

use crate::commands::context::CommandContext;
use crate::commands::model::CommandHandler;
use crate::error::{CommandError, CommandResult};

pub struct HelpCommand {
    title: String,
}

pub fn build(settings: &Value) -> Result<Box<dyn CommandHandler>, CommandError> {
    let title = settings
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("Command Help")
        .to_string();
    Ok(Box::new(HelpCommand { title }))
}

#[async_trait]
impl CommandHandler for HelpCommand {
    async fn execute(&self, ctx: &CommandContext) -> CommandResult {
        let mut help_text = format!("**🤖 {}**\n", self.title);

        let slash = ctx.registry.slash_commands().await;
        if !slash.is_empty() {
            help_text.push_str("\n**📝 Slash Commands:**\n");
            for command in &slash {
                let invocation = match command.group() {
                    Some(group) => format!("/{} {}", group, command.name()),
                    None => format!("/{}", command.name()),
                };
                help_text.push_str(&format!("• `{}` - {}\n", invocation, command.description()));
            }
        }

        let mut menus: Vec<String> = ctx
            .registry
            .user_context_menu_commands()
            .await
            .iter()
            .map(|command| format!("• {} (user)\n", command.name()))
            .collect();
        menus.extend(
            ctx.registry
                .chat_context_menu_commands()
                .await
                .iter()
                .map(|command| format!("• {} (message)\n", command.name())),
        );
        if !menus.is_empty() {
            help_text.push_str("\n**📋 Context Menu Commands:**\n");
            help_text.push_str(&menus.concat());
        }

        ctx.reply(&help_text).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::model::CommandType;
    use crate::commands::test_support::{context_for, menu_command, slash_command, FakeResponder, Sent};
    use std::sync::Arc;

    #[tokio::test]
    async fn lists_registered_commands() {
        let responder = FakeResponder::new();
        let ctx = context_for(CommandType::Slash, "help", responder.clone());
        ctx.registry.add_command(Arc::new(slash_command("ping", "").0)).await;
        ctx.registry.add_command(Arc::new(slash_command("play", "music").0)).await;
        ctx.registry
            .add_command(Arc::new(menu_command(CommandType::ChatContextMenu, "Quote").0))
            .await;

        build(&Value::Null).unwrap().execute(&ctx).await.unwrap();

        let sent = responder.sent();
        let Sent::Replied(text) = &sent[0] else {
            panic!("expected a reply, got {:?}", sent);
        };
        assert!(text.contains("`/ping`"));
        assert!(text.contains("`/music play`"));
        assert!(text.contains("• Quote (message)"));
    }
}
