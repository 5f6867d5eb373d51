// test_support.rs - Shared fixtures for the command runtime tests

use async_trait::async_trait;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::commands::context::{CommandContext, Invocation, InvokingUser, Responder};
use crate::commands::model::{Command, CommandHandler, CommandInfo, CommandKind, CommandType};
use crate::commands::registry::CommandRegistry;
use crate::error::CommandResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerMode {
    Succeed,
    Fail,
    Panic,
    WaitForRelease,
}

#[derive(Default)]
struct CallState {
    destroyed: AtomicUsize,
    executions: AtomicUsize,
    loads: Mutex<Vec<Option<String>>>,
    started: Notify,
    release: Notify,
}

/// Observes a RecordingHandler after it has been boxed into a Command
#[derive(Clone)]
pub struct Calls {
    state: Arc<CallState>,
}

impl Calls {
    pub fn destroyed(&self) -> usize {
        self.state.destroyed.load(Ordering::SeqCst)
    }

    pub fn executions(&self) -> usize {
        self.state.executions.load(Ordering::SeqCst)
    }

    /// Labels of the previous handlers passed to each `load` call
    pub fn loads(&self) -> Vec<Option<String>> {
        self.state.loads.lock().unwrap().clone()
    }

    pub async fn wait_until_started(&self) {
        self.state.started.notified().await;
    }

    pub fn release(&self) {
        self.state.release.notify_one();
    }
}

pub struct RecordingHandler {
    label: String,
    mode: HandlerMode,
    state: Arc<CallState>,
}

impl RecordingHandler {
    pub fn new() -> (Self, Calls) {
        Self::named("recording")
    }

    pub fn named(label: &str) -> (Self, Calls) {
        Self::with_mode(label, HandlerMode::Succeed)
    }

    pub fn with_mode(label: &str, mode: HandlerMode) -> (Self, Calls) {
        let state = Arc::new(CallState::default());
        let handler = Self {
            label: label.to_string(),
            mode,
            state: state.clone(),
        };
        (handler, Calls { state })
    }
}

#[async_trait]
impl CommandHandler for RecordingHandler {
    async fn execute(&self, _ctx: &CommandContext) -> CommandResult {
        match self.mode {
            HandlerMode::Succeed => {}
            HandlerMode::Fail => return Err("command failed".into()),
            HandlerMode::Panic => panic!("command panicked"),
            HandlerMode::WaitForRelease => {
                self.state.started.notify_one();
                self.state.release.notified().await;
            }
        }
        self.state.executions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self, previous: Option<&dyn CommandHandler>) -> CommandResult {
        let label = previous
            .and_then(|p| p.as_any().downcast_ref::<RecordingHandler>())
            .map(|p| p.label.clone());
        self.state.loads.lock().unwrap().push(label);
        Ok(())
    }

    fn destroy(&self) {
        self.state.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn slash_command(name: &str, group: &str) -> (Command, Calls) {
    slash_command_with(name, group, HandlerMode::Succeed)
}

pub fn slash_command_with(name: &str, group: &str, mode: HandlerMode) -> (Command, Calls) {
    let (handler, calls) = RecordingHandler::with_mode(name, mode);
    let command = Command::new(
        CommandInfo::new(name, &format!("{} command", name)),
        CommandKind::slash(group, vec![]),
        Box::new(handler),
    )
    .unwrap();
    (command, calls)
}

pub fn menu_command(kind: CommandType, name: &str) -> (Command, Calls) {
    let (handler, calls) = RecordingHandler::named(name);
    let kind = match kind {
        CommandType::UserContextMenu => CommandKind::UserContextMenu,
        CommandType::ChatContextMenu => CommandKind::ChatContextMenu,
        CommandType::Slash => panic!("menu_command needs a context menu kind"),
    };
    let command = Command::new(CommandInfo::new(name, ""), kind, Box::new(handler)).unwrap();
    (command, calls)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Deferred { ephemeral: bool },
    Replied(String),
    Edited(String),
    ChannelMessage(String),
}

#[derive(Default)]
pub struct FakeResponder {
    sent: Mutex<Vec<Sent>>,
    deferred: AtomicBool,
}

impl FakeResponder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Responder for FakeResponder {
    async fn defer_reply(&self, ephemeral: bool) -> CommandResult {
        self.deferred.store(true, Ordering::SeqCst);
        self.sent.lock().unwrap().push(Sent::Deferred { ephemeral });
        Ok(())
    }

    async fn reply(&self, content: &str) -> CommandResult {
        self.sent.lock().unwrap().push(Sent::Replied(content.to_string()));
        Ok(())
    }

    async fn edit_reply(&self, content: &str) -> CommandResult {
        let sent = if self.deferred() {
            Sent::Edited(content.to_string())
        } else {
            Sent::ChannelMessage(content.to_string())
        };
        self.sent.lock().unwrap().push(sent);
        Ok(())
    }

    fn deferred(&self) -> bool {
        self.deferred.load(Ordering::SeqCst)
    }
}

pub fn invocation(kind: CommandType, name: &str) -> Invocation {
    Invocation::new(
        kind,
        name,
        InvokingUser {
            id: 42,
            name: "tester".to_string(),
        },
    )
}

pub fn context_for(kind: CommandType, name: &str, responder: Arc<FakeResponder>) -> CommandContext {
    CommandContext::new(
        invocation(kind, name),
        responder,
        Arc::new(CommandRegistry::new()),
    )
}
