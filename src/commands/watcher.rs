// watcher.rs - File watcher bridge
// Subscribes to the command trees with notify and turns raw filesystem
// events into Added / Changed / Removed events on a tokio channel.

use notify::{
    event::{ModifyKind, RenameMode},
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, Mutex};

use crate::error::CommandError;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Added(PathBuf),
    Changed(PathBuf),
    Removed(PathBuf),
}


struct WatcherState {
    // None once stopped; dropping it closes the event channel.
    watcher: Option<RecommendedWatcher>,
    roots: Vec<PathBuf>,
    files: HashSet<PathBuf>,
}

pub struct CommandWatcher {
    state: Mutex<WatcherState>,
}

impl CommandWatcher {
    /// Start watching `roots` recursively. Events arrive on the returned receiver.
    pub fn start(roots: &[PathBuf]) -> Result<(Self, mpsc::Receiver<WatchEvent>), CommandError> {
        let (tx, rx) = mpsc::channel::<WatchEvent>(CHANNEL_CAPACITY);

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    for watch_event in classify(&event) {
                        if let Err(e) = tx.blocking_send(watch_event) {
                            log::error!("[WATCHER] Failed to forward file event: {}", e);
                        }
                    }
                }
                Err(e) => log::warn!("[WATCHER] Watch error: {}", e),
            },
            Config::default(),
        )?;

        let mut watched_roots = Vec::new();
        for root in roots {
            if !root.is_dir() {
                log::warn!("[WATCHER] Not watching missing directory {}", root.display());
                continue;
            }
            watcher.watch(root, RecursiveMode::Recursive)?;
            log::info!("[WATCHER] Watching {}", root.display());
            watched_roots.push(root.clone());
        }

        let state = WatcherState {
            watcher: Some(watcher),
            roots: watched_roots,
            files: HashSet::new(),
        };

        Ok((
            Self {
                state: Mutex::new(state),
            },
            rx,
        ))
    }

    /// Register a single file. Files inside a watched root are already covered.
    pub async fn watch(&self, path: &Path) -> Result<(), CommandError> {
        let mut state = self.state.lock().await;
        if state.files.contains(path) {
            return Ok(());
        }

        let inside_root = state.roots.iter().any(|root| path.starts_with(root));
        let Some(watcher) = state.watcher.as_mut() else {
            return Ok(());
        };
        if !inside_root {
            watcher.watch(path, RecursiveMode::NonRecursive)?;
        }
        state.files.insert(path.to_path_buf());
        Ok(())
    }

    /// Stop tracking `path` and every file below it
    pub async fn forget(&self, path: &Path) {
        let mut state = self.state.lock().await;
        let WatcherState {
            watcher,
            roots,
            files,
        } = &mut *state;

        files.retain(|file| {
            if !file.starts_with(path) {
                return true;
            }
            if let Some(watcher) = watcher.as_mut() {
                if !roots.iter().any(|root| file.starts_with(root)) {
                    let _ = watcher.unwatch(file);
                }
            }
            false
        });
    }

    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        state.roots.clear();
        state.files.clear();
        if state.watcher.take().is_some() {
            log::info!("[WATCHER] Stopped");
        }
    }
}

/// Map a notify event onto add / change / unlink
pub fn classify(event: &Event) -> Vec<WatchEvent> {
    match &event.kind {
        EventKind::Create(_) => event.paths.iter().cloned().map(WatchEvent::Added).collect(),
        EventKind::Remove(_) => event.paths.iter().cloned().map(WatchEvent::Removed).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.iter().cloned().map(WatchEvent::Removed).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.iter().cloned().map(WatchEvent::Added).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => vec![WatchEvent::Removed(from.clone()), WatchEvent::Added(to.clone())],
            _ => Vec::new(),
        },
        // Editors that save by rename report Name(Any) on the final path.
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|path| {
                if path.exists() {
                    WatchEvent::Changed(path.clone())
                } else {
                    WatchEvent::Removed(path.clone())
                }
            })
            .collect(),
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
            event.paths.iter().cloned().map(WatchEvent::Changed).collect()
        }
        _ => Vec::new(),
    }
}
