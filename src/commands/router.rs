// router.rs - Interaction Router
// Resolves an incoming interaction to its registered command and runs it
// inside a failure boundary: errors and panics from a command body are
// logged and swallowed so the dispatch loop keeps going.

use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::commands::context::{CommandContext, Invocation, Responder};
use crate::commands::registry::CommandRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Executed,
    Failed,
    Panicked,
    NotFound,
}

impl CommandRegistry {
    pub async fn on_interaction_create(
        self: &Arc<Self>,
        invocation: Invocation,
        responder: Arc<dyn Responder>,
    ) -> DispatchOutcome {
        let name = invocation.resolved_name().to_string();
        log::debug!(
            "[ROUTER] New {} interaction '{}' (resolved '{}') from {}",
            invocation.kind,
            invocation.command_name,
            name,
            invocation.user.name
        );

        // The Arc keeps this instance alive even if a reload replaces it mid-run.
        let Some(command) = self.get(invocation.kind, &name).await else {
            log::debug!("[ROUTER] No {} command registered as '{}'", invocation.kind, name);
            return DispatchOutcome::NotFound;
        };

        let ctx = CommandContext::new(invocation, responder, self.clone());
        match AssertUnwindSafe(command.execute(&ctx)).catch_unwind().await {
            Ok(Ok(())) => DispatchOutcome::Executed,
            Ok(Err(e)) => {
                log::error!(
                    "[ROUTER] {} command '{}' failed for user {} ({}): {}",
                    command.command_type(),
                    command.name(),
                    ctx.invocation.user.name,
                    ctx.invocation.user.id,
                    e
                );
                DispatchOutcome::Failed
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                log::error!(
                    "[ROUTER] {} command '{}' panicked: {}",
                    command.command_type(),
                    command.name(),
                    reason
                );
                DispatchOutcome::Panicked
            }
        }
    }
}
