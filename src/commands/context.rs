// context.rs - Invocation context
// What a command body sees when it runs: the parsed invocation, a responder
// for replying to the interaction, and a handle on the command registry.
//
// The serenity adapter at the bottom converts ApplicationCommandInteraction
// into this shape so the router and the command bodies stay gateway-agnostic.

use async_trait::async_trait;
use serde_json::Value;
use serenity::{
    http::Http,
    model::application::{
        command::{CommandOptionType, CommandType as SerenityCommandType},
        interaction::{
            application_command::{ApplicationCommandInteraction, CommandDataOption},
            InteractionResponseType,
        },
    },
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::commands::model::CommandType;
use crate::commands::registry::CommandRegistry;
use crate::error::CommandResult;

// ============================================================================
// INVOCATION
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct InvocationOption {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvokingUser {
    pub id: u64,
    pub name: String,
}

/// Resolved target of a context menu invocation
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationTarget {
    User {
        id: u64,
        name: String,
        avatar_url: String,
    },
    Message {
        id: u64,
        author: String,
        content: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub kind: CommandType,
    pub command_name: String,
    pub subcommand: Option<String>,
    pub options: Vec<InvocationOption>,
    pub user: InvokingUser,
    pub target: Option<InvocationTarget>,
}

impl Invocation {
    pub fn new(kind: CommandType, command_name: &str, user: InvokingUser) -> Self {
        Self {
            kind,
            command_name: command_name.to_string(),
            subcommand: None,
            options: Vec::new(),
            user,
            target: None,
        }
    }

    pub fn with_subcommand(mut self, subcommand: &str) -> Self {
        self.subcommand = Some(subcommand.to_string());
        self
    }

    pub fn with_option(mut self, name: &str, value: Value) -> Self {
        self.options.push(InvocationOption {
            name: name.to_string(),
            value,
        });
        self
    }

    pub fn with_target(mut self, target: InvocationTarget) -> Self {
        self.target = Some(target);
        self
    }

    /// Name the registry is searched under: the subcommand when present
    pub fn resolved_name(&self) -> &str {
        match (&self.kind, &self.subcommand) {
            (CommandType::Slash, Some(subcommand)) => subcommand,
            _ => &self.command_name,
        }
    }

    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options
            .iter()
            .find(|option| option.name == name)
            .map(|option| &option.value)
    }

    /// Build from a serenity interaction. Unknown command types yield `None`.
    pub fn from_interaction(interaction: &ApplicationCommandInteraction) -> Option<Self> {
        let data = &interaction.data;
        let kind = match data.kind {
            SerenityCommandType::ChatInput => CommandType::Slash,
            SerenityCommandType::User => CommandType::UserContextMenu,
            SerenityCommandType::Message => CommandType::ChatContextMenu,
            _ => return None,
        };

        let (subcommand, options) = split_subcommand(&data.options);

        let target = data.target_id.and_then(|target_id| match kind {
            CommandType::UserContextMenu => data
                .resolved
                .users
                .get(&target_id.to_user_id())
                .map(|user| InvocationTarget::User {
                    id: user.id.0,
                    name: user.name.clone(),
                    avatar_url: user.face(),
                }),
            CommandType::ChatContextMenu => data
                .resolved
                .messages
                .get(&target_id.to_message_id())
                .map(|message| InvocationTarget::Message {
                    id: message.id.0,
                    author: message.author.name.clone(),
                    content: message.content.clone(),
                }),
            CommandType::Slash => None,
        });

        Some(Self {
            kind,
            command_name: data.name.clone(),
            subcommand,
            options,
            user: InvokingUser {
                id: interaction.user.id.0,
                name: interaction.user.name.clone(),
            },
            target,
        })
    }
}

/// Peel off `group -> subcommand` nesting and flatten the leaf options
fn split_subcommand(options: &[CommandDataOption]) -> (Option<String>, Vec<InvocationOption>) {
    match options.first() {
        Some(first) if first.kind == CommandOptionType::SubCommandGroup => {
            split_subcommand(&first.options)
        }
        Some(first) if first.kind == CommandOptionType::SubCommand => {
            (Some(first.name.clone()), flatten(&first.options))
        }
        _ => (None, flatten(options)),
    }
}

fn flatten(options: &[CommandDataOption]) -> Vec<InvocationOption> {
    options
        .iter()
        .filter_map(|option| {
            option.value.as_ref().map(|value| InvocationOption {
                name: option.name.clone(),
                value: value.clone(),
            })
        })
        .collect()
}

// ============================================================================
// RESPONDER
// ============================================================================

#[async_trait]
pub trait Responder: Send + Sync {
    async fn defer_reply(&self, ephemeral: bool) -> CommandResult;

    async fn reply(&self, content: &str) -> CommandResult;

    /// Edit the deferred reply, or post to the channel when nothing was deferred
    async fn edit_reply(&self, content: &str) -> CommandResult;

    fn deferred(&self) -> bool;
}

pub struct SerenityResponder {
    http: Arc<Http>,
    interaction: ApplicationCommandInteraction,
    deferred: AtomicBool,
}

impl SerenityResponder {
    pub fn new(http: Arc<Http>, interaction: ApplicationCommandInteraction) -> Self {
        Self {
            http,
            interaction,
            deferred: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Responder for SerenityResponder {
    async fn defer_reply(&self, ephemeral: bool) -> CommandResult {
        self.interaction
            .create_interaction_response(&self.http, |response| {
                response
                    .kind(InteractionResponseType::DeferredChannelMessageWithSource)
                    .interaction_response_data(|message| message.ephemeral(ephemeral))
            })
            .await?;
        self.deferred.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn reply(&self, content: &str) -> CommandResult {
        self.interaction
            .create_interaction_response(&self.http, |response| {
                response
                    .kind(InteractionResponseType::ChannelMessageWithSource)
                    .interaction_response_data(|message| message.content(content))
            })
            .await?;
        Ok(())
    }

    async fn edit_reply(&self, content: &str) -> CommandResult {
        if !self.deferred() {
            self.interaction.channel_id.say(&self.http, content).await?;
            return Ok(());
        }

        self.interaction
            .edit_original_interaction_response(&self.http, |response| response.content(content))
            .await?;
        Ok(())
    }

    fn deferred(&self) -> bool {
        self.deferred.load(Ordering::SeqCst)
    }
}

// ============================================================================
// COMMAND CONTEXT
// ============================================================================

#[derive(Clone)]
pub struct CommandContext {
    pub invocation: Invocation,
    pub responder: Arc<dyn Responder>,
    pub registry: Arc<CommandRegistry>,
}

impl CommandContext {
    pub fn new(
        invocation: Invocation,
        responder: Arc<dyn Responder>,
        registry: Arc<CommandRegistry>,
    ) -> Self {
        Self {
            invocation,
            responder,
            registry,
        }
    }

    pub fn option_str(&self, name: &str) -> Option<&str> {
        self.invocation.option(name).and_then(Value::as_str)
    }

    pub async fn defer_reply(&self, ephemeral: bool) -> CommandResult {
        self.responder.defer_reply(ephemeral).await
    }

    pub async fn reply(&self, content: &str) -> CommandResult {
        self.responder.reply(content).await
    }

    pub async fn edit_reply(&self, content: &str) -> CommandResult {
        self.responder.edit_reply(content).await
    }

    pub fn deferred(&self) -> bool {
        self.responder.deferred()
    }
}
