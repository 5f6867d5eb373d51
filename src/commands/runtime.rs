// runtime.rs - Command runtime
// Discovers command definitions on disk, imports them into the registry, and
// keeps them fresh: filesystem events pass through the hash gate and the
// per-path debouncer before a command is rebuilt and swapped in place.
//
// Key Features:
// - Startup walk over the core commands tree and every plugin's commands tree
// - Hot reload that never removes a working command when the new file is bad
// - Deleted files unregister their command immediately
// - Bulk upload of the exported declarations

use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use walkdir::WalkDir;

use crate::commands::debounce::{PendingUpdates, Scheduled};
use crate::commands::export::{CommandUploader, UploadTarget};
use crate::commands::hash::HashTracker;
use crate::commands::loader::CommandLoader;
use crate::commands::model::Command;
use crate::commands::plugin::BotPlugin;
use crate::commands::registry::CommandRegistry;
use crate::commands::watcher::{CommandWatcher, WatchEvent};
use crate::error::CommandError;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeStatus {
    pub commands: usize,
    pub slash: usize,
    pub user_menus: usize,
    pub chat_menus: usize,
    pub watched_files: usize,
    pub pending_updates: usize,
    pub reloads: u64,
    pub plugins: usize,
}

pub struct CommandRuntime {
    registry: Arc<CommandRegistry>,
    loader: Arc<dyn CommandLoader>,
    hashes: HashTracker,
    pending: PendingUpdates,
    plugins: RwLock<Vec<Arc<BotPlugin>>>,
    watcher: OnceCell<CommandWatcher>,
    watch_task: Mutex<Option<JoinHandle<()>>>,
    uploader: Option<CommandUploader>,
    // Serializes reloads, removals and tree walks against each other.
    updates: Mutex<()>,
    core_dir: PathBuf,
    debounce: Duration,
    reloads: AtomicU64,
}

impl CommandRuntime {
    pub fn new(
        registry: Arc<CommandRegistry>,
        loader: Arc<dyn CommandLoader>,
        core_dir: impl Into<PathBuf>,
        debounce: Duration,
    ) -> Self {
        Self {
            registry,
            loader,
            hashes: HashTracker::new(),
            pending: PendingUpdates::new(),
            plugins: RwLock::new(Vec::new()),
            watcher: OnceCell::new(),
            watch_task: Mutex::new(None),
            uploader: None,
            updates: Mutex::new(()),
            core_dir: resolve_path(&core_dir.into()),
            debounce,
            reloads: AtomicU64::new(0),
        }
    }

    pub fn with_uploader(mut self, uploader: CommandUploader) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn uploader(&self) -> Option<&CommandUploader> {
        self.uploader.as_ref()
    }

    // ========================================================================
    // PLUGINS AND STARTUP
    // ========================================================================

    pub async fn add_plugin(&self, mut plugin: BotPlugin) -> Arc<BotPlugin> {
        plugin.dir = resolve_path(&plugin.dir);
        let plugin = Arc::new(plugin);
        self.plugins.write().await.push(plugin.clone());
        plugin
    }

    /// Plugin whose commands tree contains `path`; `None` for core commands
    pub async fn plugin_for_path(&self, path: &Path) -> Option<Arc<BotPlugin>> {
        self.plugins
            .read()
            .await
            .iter()
            .find(|plugin| path.starts_with(plugin.commands_dir()))
            .cloned()
    }

    /// Every directory tree that holds command definitions, with its owner
    async fn command_trees(&self) -> Vec<(PathBuf, Option<Arc<BotPlugin>>)> {
        let mut trees = vec![(self.core_dir.clone(), None)];
        for plugin in self.plugins.read().await.iter() {
            trees.push((plugin.commands_dir(), Some(plugin.clone())));
        }
        trees
    }

    pub async fn command_roots(&self) -> Vec<PathBuf> {
        self.command_trees().await.into_iter().map(|(root, _)| root).collect()
    }

    /// Import every command under the core tree and each plugin's tree
    pub async fn load_all(&self) -> usize {
        log::info!("[COMMANDS] Preparing commands");
        let loaded = self.import_trees().await;
        log::info!("[COMMANDS] Commands ready ({} loaded)", loaded);
        loaded
    }

    async fn import_trees(&self) -> usize {
        let _updates = self.updates.lock().await;
        let mut imported = 0;
        for (root, plugin) in self.command_trees().await {
            for path in command_files(&root) {
                if self.import_command(&path, plugin.clone(), true).await.is_some() {
                    imported += 1;
                }
            }
        }
        imported
    }

    // ========================================================================
    // IMPORT
    // ========================================================================

    /// Load the command module at `path`, bind it to `plugin`, and install it.
    /// Wrong file types are ignored; failures are logged and leave any previous
    /// registration for the path untouched.
    pub async fn import_command(
        &self,
        path: &Path,
        plugin: Option<Arc<BotPlugin>>,
        should_watch: bool,
    ) -> Option<Arc<Command>> {
        if !self.loader.accepts(path) {
            return None;
        }
        let path = resolve_path(path);
        let path = path.as_path();

        let command = match self.build_command(path, plugin.as_ref()).await {
            Ok(command) => Arc::new(command),
            Err(e) => {
                log::error!("[COMMANDS] Error loading {}: {}", path.display(), e);
                return None;
            }
        };

        // A new definition may rename the command; the old slot must not linger.
        if let Some(previous) = self.registry.command_for_path(path).await {
            if previous.id() != command.id() {
                self.registry.retire(&previous).await;
            }
        }

        self.registry.add_command(command.clone()).await;
        self.registry.bind_path(path, command.clone()).await;

        if should_watch {
            if let Err(e) = self.hashes.analyze_and_hash(path).await {
                log::warn!("[COMMANDS] Could not hash {}: {}", path.display(), e);
            }
            if let Some(watcher) = self.watcher.get() {
                if let Err(e) = watcher.watch(path).await {
                    log::warn!("[WATCHER] Could not watch {}: {}", path.display(), e);
                }
            }
        }

        Some(command)
    }

    async fn build_command(
        &self,
        path: &Path,
        plugin: Option<&Arc<BotPlugin>>,
    ) -> Result<Command, CommandError> {
        let factory = self.loader.load_command_module(path).await?;
        let mut command = factory()?;

        if let Some(plugin) = plugin {
            if let Some(missing) = plugin.missing_dependency(command.dependencies()) {
                return Err(CommandError::MissingCapability {
                    command: command.name().to_string(),
                    capability: missing.to_string(),
                    plugin: plugin.id.clone(),
                });
            }
            command.set_plugin(plugin);
        }

        command.set_source_path(path);
        Ok(command)
    }

    // ========================================================================
    // HOT RELOAD
    // ========================================================================

    /// Hash gate + debounce for one add/change event. Returns `None` when the
    /// content is unchanged or unreadable.
    pub async fn try_update_file(self: &Arc<Self>, path: &Path) -> Option<Scheduled> {
        let path = resolve_path(path);
        let path = path.as_path();
        match self.hashes.analyze_and_hash(path).await {
            Ok(true) => {}
            Ok(false) => {
                log::debug!(
                    "[COMMANDS] Skipping {} as its contents have not changed",
                    path.display()
                );
                return None;
            }
            Err(e) => {
                log::warn!("[COMMANDS] Ignoring change to {}: {}", path.display(), e);
                return None;
            }
        }

        let runtime: Weak<Self> = Arc::downgrade(self);
        let target = path.to_path_buf();
        let scheduled = self
            .pending
            .schedule(path, self.debounce, move |id| async move {
                if let Some(runtime) = runtime.upgrade() {
                    runtime.apply_pending_update(&target, id).await;
                }
            })
            .await;

        match scheduled {
            Scheduled::Refreshed => {
                log::info!("[COMMANDS] Refreshing pending update for {}", path.display())
            }
            Scheduled::Created => log::info!("[COMMANDS] Pending update for {}", path.display()),
        }
        Some(scheduled)
    }

    async fn apply_pending_update(&self, path: &Path, id: u64) {
        let _updates = self.updates.lock().await;
        log::info!("[COMMANDS] Updating {}", path.display());

        let installed = match self.registry.command_for_path(path).await {
            Some(current) => {
                let plugin = current.plugin();
                self.import_command(path, plugin, false).await
            }
            None => {
                let plugin = self.plugin_for_path(path).await;
                self.import_command(path, plugin, true).await
            }
        };

        if installed.is_some() {
            self.reloads.fetch_add(1, Ordering::SeqCst);
        } else {
            log::warn!("[COMMANDS] Update of {} failed; keeping what was loaded", path.display());
        }

        // Cleared on every outcome so the next change can schedule again.
        self.pending.complete(path, id).await;
    }

    /// The file or directory at `path` is gone: stop pending updates below it
    /// and unregister every command it defined.
    pub async fn remove_command_at(&self, path: &Path) {
        let path = resolve_path(path);
        let _updates = self.updates.lock().await;

        self.pending.cancel(&path).await;
        self.hashes.forget(&path).await;
        if let Some(watcher) = self.watcher.get() {
            watcher.forget(&path).await;
        }

        let unlinked = self.registry.remove_path(&path).await;
        if unlinked.is_empty() {
            log::debug!("[COMMANDS] {} held no live command", path.display());
        }

        // A name defined by more than one file falls back to a surviving file.
        for command in unlinked {
            if let Some(other) = self.registry.path_defining(&command.id()).await {
                log::info!(
                    "[COMMANDS] {} also defines {} command '{}', restoring it",
                    other.display(),
                    command.command_type(),
                    command.name()
                );
                let plugin = self.plugin_for_path(&other).await;
                self.import_command(&other, plugin, false).await;
            }
        }
    }

    pub async fn handle_watch_event(self: &Arc<Self>, event: WatchEvent) {
        match event {
            WatchEvent::Added(path) | WatchEvent::Changed(path) => {
                let path = resolve_path(&path);
                if path.is_dir() {
                    for file in command_files(&path) {
                        if self.loader.accepts(&file) {
                            self.try_update_file(&file).await;
                        }
                    }
                } else if self.loader.accepts(&path) && path.is_file() {
                    self.try_update_file(&path).await;
                }
            }
            WatchEvent::Removed(path) => self.remove_command_at(&path).await,
        }
    }

    /// Start the file watcher bridge over every command root
    pub async fn start_watching(self: &Arc<Self>) -> Result<(), CommandError> {
        let roots = self.command_roots().await;
        let (watcher, mut events) = CommandWatcher::start(&roots)?;
        for path in self.registry.watched_paths().await {
            watcher.watch(&path).await?;
        }
        if self.watcher.set(watcher).is_err() {
            return Err(CommandError::Invalid("watcher already started".to_string()));
        }

        let runtime = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(runtime) = runtime.upgrade() else { break };
                runtime.handle_watch_event(event).await;
            }
        });
        *self.watch_task.lock().await = Some(task);
        Ok(())
    }

    /// Re-import everything on disk. Unchanged files still get fresh instances.
    pub async fn reload_all(&self) -> usize {
        let reloaded = self.import_trees().await;
        self.reloads.fetch_add(reloaded as u64, Ordering::SeqCst);
        log::info!("[COMMANDS] Reloaded {} commands", reloaded);
        reloaded
    }

    // ========================================================================
    // UPLOAD, STATUS, SHUTDOWN
    // ========================================================================

    /// Publish the exported declarations. Failures are logged, never retried.
    pub async fn upload_commands(&self, target: UploadTarget) -> Option<usize> {
        let Some(uploader) = &self.uploader else {
            log::error!("[UPLOAD] No uploader configured");
            return None;
        };

        let declarations = self.registry.export().await;
        match uploader.upload(&declarations, target).await {
            Ok(count) => {
                log::info!("[UPLOAD] Uploaded {} commands ({})", count, target);
                Some(count)
            }
            Err(CommandError::Upload(detail)) => {
                log::error!("[UPLOAD] Error uploading commands ({}): {}", target, detail);
                None
            }
            Err(e) => {
                log::error!("[UPLOAD] Error uploading slash commands ({}): {}", target, e);
                None
            }
        }
    }

    pub async fn status(&self) -> RuntimeStatus {
        RuntimeStatus {
            commands: self.registry.len().await,
            slash: self.registry.slash_commands().await.len(),
            user_menus: self.registry.user_context_menu_commands().await.len(),
            chat_menus: self.registry.chat_context_menu_commands().await.len(),
            watched_files: self.registry.watched_paths().await.len(),
            pending_updates: self.pending.len().await,
            reloads: self.reloads.load(Ordering::SeqCst),
            plugins: self.plugins.read().await.len(),
        }
    }

    pub async fn shutdown(&self) {
        if let Some(watcher) = self.watcher.get() {
            watcher.stop().await;
        }
        if let Some(task) = self.watch_task.lock().await.take() {
            task.abort();
        }
        self.pending.cancel_all().await;
        let _updates = self.updates.lock().await;
        let destroyed = self.registry.clear().await;
        log::info!("[COMMANDS] Destroyed {} commands", destroyed);
    }
}

/// Absolute, symlink-free form of `path`, so that startup walks, bindings,
/// digests and notify events share one key. Paths that no longer exist are
/// resolved through their nearest existing ancestor.
fn resolve_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => return path.to_path_buf(),
        }
    };

    let mut missing = Vec::new();
    let mut current = absolute.as_path();
    while let Some(parent) = current.parent() {
        if let Some(name) = current.file_name() {
            missing.push(name.to_os_string());
        }
        if let Ok(resolved) = std::fs::canonicalize(parent) {
            return missing.iter().rev().fold(resolved, |acc, name| acc.join(name));
        }
        current = parent;
    }
    absolute
}

/// Files under `root`, depth first, in a stable order
fn command_files(root: &Path) -> Vec<PathBuf> {
    if !root.is_dir() {
        log::warn!("[COMMANDS] Commands directory {} does not exist", root.display());
        return Vec::new();
    }

    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("[COMMANDS] Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}
