// registry.rs - Command Registry
// The central index of live commands: by unique id, by source path, and one
// map per invocation kind. At most one command lives in each (kind, name)
// slot; installing a new one destroys whatever it displaced.
//
// Maps are insertion-ordered so a replaced command keeps its position, which
// keeps export() output stable across reloads.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::commands::model::{Command, CommandId, CommandType};

#[derive(Default)]
struct RegistryState {
    commands: IndexMap<CommandId, Arc<Command>>,
    paths: HashMap<PathBuf, Arc<Command>>,
    slash: IndexMap<String, Arc<Command>>,
    user_menu: IndexMap<String, Arc<Command>>,
    chat_menu: IndexMap<String, Arc<Command>>,
}

impl RegistryState {
    fn kind_map(&self, kind: CommandType) -> &IndexMap<String, Arc<Command>> {
        match kind {
            CommandType::Slash => &self.slash,
            CommandType::UserContextMenu => &self.user_menu,
            CommandType::ChatContextMenu => &self.chat_menu,
        }
    }

    fn kind_map_mut(&mut self, kind: CommandType) -> &mut IndexMap<String, Arc<Command>> {
        match kind {
            CommandType::Slash => &mut self.slash,
            CommandType::UserContextMenu => &mut self.user_menu,
            CommandType::ChatContextMenu => &mut self.chat_menu,
        }
    }

    /// Drop `command` from the id and kind maps if it is still the live one
    fn unlink(&mut self, command: &Arc<Command>) -> bool {
        let id = command.id();
        let live = self
            .commands
            .get(&id)
            .map(|current| Arc::ptr_eq(current, command))
            .unwrap_or(false);
        if !live {
            return false;
        }

        self.commands.shift_remove(&id);
        self.kind_map_mut(id.kind).shift_remove(&id.name);
        true
    }
}

#[derive(Default)]
pub struct CommandRegistry {
    state: RwLock<RegistryState>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // MUTATION
    // ========================================================================

    /// Install `command` in its (kind, name) slot, destroy the command it
    /// displaced, then run `load` with that previous instance.
    ///
    /// Returns the displaced command, if any.
    pub async fn add_command(&self, command: Arc<Command>) -> Option<Arc<Command>> {
        let id = command.id();

        let displaced = {
            let mut state = self.state.write().await;
            let existing = state.commands.insert(id.clone(), command.clone());
            let slot = state.kind_map_mut(id.kind).insert(id.name.clone(), command.clone());
            existing.or(slot)
        };

        let displaced = displaced.filter(|old| !Arc::ptr_eq(old, &command));
        if let Some(old) = &displaced {
            if old.source_path().is_some() && old.source_path() != command.source_path() {
                log::warn!(
                    "[COMMANDS] {} command '{}' from {:?} replaces the one from {:?}",
                    id.kind,
                    id.name,
                    command.source_path(),
                    old.source_path()
                );
            }
            old.destroy();
        }

        if let Err(e) = command.load(displaced.as_deref()).await {
            log::error!("[COMMANDS] Failed to load {} command '{}': {}", id.kind, id.name, e);
        }

        log::info!(
            "[COMMANDS] {} {} command '{}'",
            if displaced.is_some() { "Replaced" } else { "Added" },
            id.kind,
            id.name
        );
        displaced
    }

    /// Remove `command` only if it still occupies its slot. Destroys it either way.
    pub async fn retire(&self, command: &Arc<Command>) -> bool {
        let unlinked = {
            let mut state = self.state.write().await;
            state.paths.retain(|_, bound| !Arc::ptr_eq(bound, command));
            state.unlink(command)
        };
        command.destroy();
        unlinked
    }

    /// Record that `path` is the source of `command`
    pub async fn bind_path(&self, path: &Path, command: Arc<Command>) -> Option<Arc<Command>> {
        self.state.write().await.paths.insert(path.to_path_buf(), command)
    }

    /// Files at or below `path` are gone: drop their bindings, unregister each
    /// command that is still live, and destroy them all. Returns the commands
    /// that were live.
    pub async fn remove_path(&self, path: &Path) -> Vec<Arc<Command>> {
        let (removed, unlinked) = {
            let mut state = self.state.write().await;
            let gone: Vec<PathBuf> = state
                .paths
                .keys()
                .filter(|bound| bound.starts_with(path))
                .cloned()
                .collect();

            let mut removed = Vec::new();
            let mut unlinked = Vec::new();
            for bound in gone {
                if let Some(command) = state.paths.remove(&bound) {
                    if state.unlink(&command) {
                        unlinked.push(command.clone());
                    }
                    removed.push((bound, command));
                }
            }
            (removed, unlinked)
        };

        for (bound, command) in &removed {
            command.destroy();
            if unlinked.iter().any(|live| Arc::ptr_eq(live, command)) {
                log::info!(
                    "[COMMANDS] Unregistered {} command '{}' ({} deleted)",
                    command.command_type(),
                    command.name(),
                    bound.display()
                );
            }
        }
        unlinked
    }

    /// Empty every map and destroy all commands
    pub async fn clear(&self) -> usize {
        let drained: Vec<Arc<Command>> = {
            let mut state = self.state.write().await;
            state.paths.clear();
            state.slash.clear();
            state.user_menu.clear();
            state.chat_menu.clear();
            state.commands.drain(..).map(|(_, command)| command).collect()
        };

        for command in &drained {
            command.destroy();
        }
        drained.len()
    }

    // ========================================================================
    // LOOKUP
    // ========================================================================

    pub async fn get(&self, kind: CommandType, name: &str) -> Option<Arc<Command>> {
        self.state.read().await.kind_map(kind).get(name).cloned()
    }

    pub async fn get_by_id(&self, id: &CommandId) -> Option<Arc<Command>> {
        self.state.read().await.commands.get(id).cloned()
    }

    pub async fn get_slash_command(&self, name: &str) -> Option<Arc<Command>> {
        self.get(CommandType::Slash, name).await
    }

    pub async fn get_user_context_menu_command(&self, name: &str) -> Option<Arc<Command>> {
        self.get(CommandType::UserContextMenu, name).await
    }

    pub async fn get_chat_context_menu_command(&self, name: &str) -> Option<Arc<Command>> {
        self.get(CommandType::ChatContextMenu, name).await
    }

    pub async fn command_for_path(&self, path: &Path) -> Option<Arc<Command>> {
        self.state.read().await.paths.get(path).cloned()
    }

    /// Another file that also defines `id`, if one is still bound
    pub async fn path_defining(&self, id: &CommandId) -> Option<PathBuf> {
        let state = self.state.read().await;
        let mut paths: Vec<&PathBuf> = state
            .paths
            .iter()
            .filter(|(_, command)| &command.id() == id)
            .map(|(path, _)| path)
            .collect();
        paths.sort();
        paths.first().map(|path| path.to_path_buf())
    }

    pub async fn commands_of(&self, kind: CommandType) -> Vec<Arc<Command>> {
        self.state.read().await.kind_map(kind).values().cloned().collect()
    }

    pub async fn slash_commands(&self) -> Vec<Arc<Command>> {
        self.commands_of(CommandType::Slash).await
    }

    pub async fn user_context_menu_commands(&self) -> Vec<Arc<Command>> {
        self.commands_of(CommandType::UserContextMenu).await
    }

    pub async fn chat_context_menu_commands(&self) -> Vec<Arc<Command>> {
        self.commands_of(CommandType::ChatContextMenu).await
    }

    pub async fn all(&self) -> Vec<Arc<Command>> {
        self.state.read().await.commands.values().cloned().collect()
    }

    pub async fn watched_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.state.read().await.paths.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.commands.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{menu_command, slash_command};

    #[tokio::test]
    async fn every_kind_resolves_after_add() {
        let registry = CommandRegistry::new();
        let (slash, _) = slash_command("ping", "");
        let (user, _) = menu_command(CommandType::UserContextMenu, "Show Avatar");
        let (chat, _) = menu_command(CommandType::ChatContextMenu, "Quote");
        let slash = Arc::new(slash);
        let user = Arc::new(user);
        let chat = Arc::new(chat);

        registry.add_command(slash.clone()).await;
        registry.add_command(user.clone()).await;
        registry.add_command(chat.clone()).await;

        assert!(Arc::ptr_eq(&registry.get_slash_command("ping").await.unwrap(), &slash));
        assert!(Arc::ptr_eq(
            &registry.get_user_context_menu_command("Show Avatar").await.unwrap(),
            &user
        ));
        assert!(Arc::ptr_eq(
            &registry.get_chat_context_menu_command("Quote").await.unwrap(),
            &chat
        ));
        assert!(registry.get_chat_context_menu_command("Show Avatar").await.is_none());
        assert_eq!(registry.len().await, 3);
    }

    #[tokio::test]
    async fn replacing_destroys_previous_exactly_once_and_loads_with_it() {
        let registry = CommandRegistry::new();
        let (first, first_calls) = slash_command("ping", "");
        let (second, second_calls) = slash_command("ping", "");
        let first = Arc::new(first);
        let second = Arc::new(second);

        assert!(registry.add_command(first.clone()).await.is_none());
        let displaced = registry.add_command(second.clone()).await.unwrap();

        assert!(Arc::ptr_eq(&displaced, &first));
        assert!(Arc::ptr_eq(&registry.get_slash_command("ping").await.unwrap(), &second));
        assert_eq!(first_calls.destroyed(), 1);
        assert_eq!(second_calls.destroyed(), 0);
        assert_eq!(first_calls.loads(), vec![None]);
        assert_eq!(second_calls.loads(), vec![Some("ping".to_string())]);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn same_name_in_different_kinds_coexists() {
        let registry = CommandRegistry::new();
        let (slash, slash_calls) = slash_command("info", "");
        let (menu, _) = menu_command(CommandType::UserContextMenu, "info");

        registry.add_command(Arc::new(slash)).await;
        registry.add_command(Arc::new(menu)).await;

        assert_eq!(registry.len().await, 2);
        assert_eq!(slash_calls.destroyed(), 0);
    }

    #[tokio::test]
    async fn removing_a_path_unregisters_its_command() {
        let registry = CommandRegistry::new();
        let (command, calls) = slash_command("ping", "");
        let command = Arc::new(command);
        let path = Path::new("commands/ping.json");

        registry.add_command(command.clone()).await;
        registry.bind_path(path, command.clone()).await;
        let unlinked = registry.remove_path(path).await;

        assert_eq!(unlinked.len(), 1);
        assert!(registry.get_slash_command("ping").await.is_none());
        assert!(registry.get_by_id(&command.id()).await.is_none());
        assert!(registry.command_for_path(path).await.is_none());
        assert_eq!(calls.destroyed(), 1);
        assert!(registry.remove_path(path).await.is_empty());
    }

    #[tokio::test]
    async fn removing_a_stale_path_leaves_the_live_command() {
        let registry = CommandRegistry::new();
        let (old, _) = slash_command("ping", "");
        let (new, new_calls) = slash_command("ping", "");
        let old = Arc::new(old);
        let new = Arc::new(new);
        let old_path = Path::new("commands/old_ping.json");

        registry.add_command(old.clone()).await;
        registry.bind_path(old_path, old.clone()).await;
        registry.add_command(new.clone()).await;
        assert!(registry.remove_path(old_path).await.is_empty());

        assert!(Arc::ptr_eq(&registry.get_slash_command("ping").await.unwrap(), &new));
        assert_eq!(new_calls.destroyed(), 0);
    }

    #[tokio::test]
    async fn removing_a_directory_unregisters_everything_below_it() {
        let registry = CommandRegistry::new();
        let (play, play_calls) = slash_command("play", "music");
        let (skip, skip_calls) = slash_command("skip", "music");
        let (ping, ping_calls) = slash_command("ping", "");
        let play = Arc::new(play);
        let skip = Arc::new(skip);
        let ping = Arc::new(ping);

        for (path, command) in [
            ("commands/music/play.json", &play),
            ("commands/music/skip.json", &skip),
            ("commands/musicbox.json", &ping),
        ] {
            registry.add_command(command.clone()).await;
            registry.bind_path(Path::new(path), command.clone()).await;
        }

        let unlinked = registry.remove_path(Path::new("commands/music")).await;

        assert_eq!(unlinked.len(), 2);
        assert!(registry.get_slash_command("play").await.is_none());
        assert!(registry.get_slash_command("skip").await.is_none());
        assert!(registry.get_slash_command("ping").await.is_some());
        assert_eq!(play_calls.destroyed() + skip_calls.destroyed(), 2);
        assert_eq!(ping_calls.destroyed(), 0);
        assert_eq!(
            registry.watched_paths().await,
            vec![PathBuf::from("commands/musicbox.json")]
        );
    }

    #[tokio::test]
    async fn other_definitions_of_an_id_are_found_by_path() {
        let registry = CommandRegistry::new();
        let (first, _) = slash_command("ping", "");
        let (second, _) = slash_command("ping", "");
        let first = Arc::new(first);
        let second = Arc::new(second);
        registry.add_command(first.clone()).await;
        registry.bind_path(Path::new("commands/a.json"), first.clone()).await;
        registry.add_command(second.clone()).await;
        registry.bind_path(Path::new("commands/b.json"), second.clone()).await;

        registry.remove_path(Path::new("commands/b.json")).await;

        assert_eq!(
            registry.path_defining(&first.id()).await,
            Some(PathBuf::from("commands/a.json"))
        );
    }

    #[tokio::test]
    async fn replacement_keeps_insertion_position() {
        let registry = CommandRegistry::new();
        for name in ["a", "b", "c"] {
            registry.add_command(Arc::new(slash_command(name, "").0)).await;
        }
        registry.add_command(Arc::new(slash_command("a", "").0)).await;

        let names: Vec<String> = registry
            .slash_commands()
            .await
            .iter()
            .map(|command| command.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn clear_destroys_everything() {
        let registry = CommandRegistry::new();
        let (ping, ping_calls) = slash_command("ping", "");
        let (quote, quote_calls) = menu_command(CommandType::ChatContextMenu, "Quote");
        registry.add_command(Arc::new(ping)).await;
        registry.add_command(Arc::new(quote)).await;

        assert_eq!(registry.clear().await, 2);
        assert!(registry.is_empty().await);
        assert_eq!(ping_calls.destroyed(), 1);
        assert_eq!(quote_calls.destroyed(), 1);
    }
}
