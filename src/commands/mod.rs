// commands/mod.rs - Command Runtime Modules
// Declares the command model, the registry and router, the hot-reload
// machinery, and the built-in handlers that command definitions can name.

pub mod catalog;        // Handler names available to command definitions
pub mod context;        // Invocation data and the reply surface handed to handlers
pub mod debounce;       // Per-path delayed updates
pub mod export;         // Declaration export and upload to Discord
pub mod hash;           // Content digests for the change gate
pub mod loader;         // JSON command definitions
pub mod model;          // Command, CommandType, CommandHandler
pub mod plugin;         // Plugin discovery and capabilities
pub mod registry;       // Lookup maps and replacement semantics
pub mod router;         // Interaction dispatch
pub mod runtime;        // Import, watch, reload, upload, shutdown
pub mod watcher;        // notify bridge

pub mod echo;           // echo / reply handlers
pub mod help;           // Command listing
pub mod menu;           // Context menu handlers
pub mod ping;           // Latency check

#[cfg(test)]
mod test_support;
