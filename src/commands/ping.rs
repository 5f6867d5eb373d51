// ping.rs - Ping Command Module
// This module implements /ping, which measures and displays the bot's response time.
//
// Key Features:
// - Measures round-trip latency for the interaction reply
// - Counts invocations and carries the count across hot reloads
//
// Used by: catalog.rs (handler "ping")

use async_trait::async_trait;
use serde_json::Value;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::commands::context::CommandContext;
use crate::commands::model::CommandHandler;
use crate::error::{CommandError, CommandResult};

#[derive(Default)]
pub struct PingCommand {
    invocations: AtomicU64,
}

impl PingCommand {
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }
}

pub fn build(_settings: &Value) -> Result<Box<dyn CommandHandler>, CommandError> {
    Ok(Box::new(PingCommand::default()))
}

#[async_trait]
impl CommandHandler for PingCommand {
    async fn execute(&self, ctx: &CommandContext) -> CommandResult {
        let start_time = std::time::Instant::now();
        let count = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;

        ctx.defer_reply(false).await?;
        let ping_ms = start_time.elapsed().as_millis();

        ctx.edit_reply(&format!("Pong! Response time: {}ms (ping #{})", ping_ms, count))
            .await
    }

    async fn load(&self, previous: Option<&dyn CommandHandler>) -> CommandResult {
        if let Some(previous) = previous.and_then(|p| p.as_any().downcast_ref::<PingCommand>()) {
            self.invocations
                .store(previous.invocations(), Ordering::SeqCst);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
