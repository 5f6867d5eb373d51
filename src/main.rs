// main.rs - Command Deck entry point
// Loads botconfig.txt, builds the command runtime (plugins, startup walk,
// file watcher), connects to Discord and routes application command
// interactions into the registry. A small stdin console drives reload,
// upload and shutdown.

mod commands;
mod config;
mod error;

use serenity::{
    async_trait,
    client::{Client, Context, EventHandler},
    model::{application::interaction::Interaction, gateway::Ready},
    prelude::GatewayIntents,
};
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;

use crate::commands::catalog::HandlerCatalog;
use crate::commands::context::{Invocation, SerenityResponder};
use crate::commands::export::{CommandUploader, UploadTarget};
use crate::commands::loader::DefinitionLoader;
use crate::commands::plugin::discover_plugins;
use crate::commands::registry::CommandRegistry;
use crate::commands::runtime::CommandRuntime;
use crate::config::{load_bot_config, BotConfig};

// Event handler implementation
struct Handler {
    runtime: Arc<CommandRuntime>,
    upload_on_ready: Option<UploadTarget>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _: Context, ready: Ready) {
        println!("✅ Bot connected as {}!", ready.user.name);
        log::info!("📊 Connected to {} guilds", ready.guilds.len());

        if let Some(uploader) = self.runtime.uploader() {
            uploader.set_application_id(ready.application.id.0);
        }
        if let Some(target) = self.upload_on_ready {
            self.runtime.upload_commands(target).await;
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::ApplicationCommand(command) = interaction else {
            return;
        };

        let Some(invocation) = Invocation::from_interaction(&command) else {
            log::debug!("[ROUTER] Ignoring unsupported command type {:?}", command.data.kind);
            return;
        };

        let responder = Arc::new(SerenityResponder::new(ctx.http.clone(), command));
        self.runtime
            .registry()
            .on_interaction_create(invocation, responder)
            .await;
    }
}

async fn handle_command_line(shutdown_tx: mpsc::Sender<String>, runtime: Arc<CommandRuntime>) {
    use tokio::io::AsyncWriteExt;
    use tokio::time::{sleep, Duration};

    println!("📝 Command line interface active. Type 'help' for available commands.");

    // Wait for the connection banner before showing the prompt
    sleep(Duration::from_millis(1500)).await;

    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin).lines();
    let mut stdout = io::stdout();

    loop {
        if stdout.write_all(b"> ").await.is_err() || stdout.flush().await.is_err() {
            eprintln!("❌ Failed to write prompt");
            break;
        }

        let line = match reader.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                eprintln!("❌ Error reading command line: {}", e);
                break;
            }
        };

        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default().to_lowercase();

        match command.as_str() {
            "quit" | "q" | "exit" => {
                println!("⏹️  Shutting down bot...");
                if shutdown_tx.send("quit".to_string()).await.is_err() {
                    eprintln!("❌ Failed to send shutdown signal");
                }
                break;
            }
            "help" | "h" => {
                println!("🤖 Available commands:");
                println!("  quit, q, exit       - Stop the bot gracefully");
                println!("  help, h             - Show this help message");
                println!("  status              - Show runtime status");
                println!("  commands            - List registered commands");
                println!("  reload              - Re-import every command file");
                println!("  upload [guild_id]   - Upload commands globally or to one guild");
            }
            "status" => {
                let status = runtime.status().await;
                println!("🤖 Bot Status: Running");
                println!(
                    "📦 Commands: {} ({} slash, {} user menus, {} message menus)",
                    status.commands, status.slash, status.user_menus, status.chat_menus
                );
                println!(
                    "👀 Watching {} files, {} pending updates, {} reloads, {} plugins",
                    status.watched_files, status.pending_updates, status.reloads, status.plugins
                );
            }
            "commands" => {
                for command in runtime.registry().all().await {
                    let source = command
                        .source_path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "-".to_string());
                    let name = match command.group() {
                        Some(group) => format!("{} {}", group, command.name()),
                        None => command.name().to_string(),
                    };
                    println!(
                        "  [{}] {} ({}, loaded {})",
                        command.command_type(),
                        name,
                        source,
                        command.loaded_at().format("%H:%M:%S")
                    );
                }
            }
            "reload" => {
                let reloaded = runtime.reload_all().await;
                println!("🔄 Reloaded {} commands", reloaded);
            }
            "upload" => {
                let target = words.next().unwrap_or("global");
                match target.parse::<UploadTarget>() {
                    Ok(target) => match runtime.upload_commands(target).await {
                        Some(count) => println!("📤 Uploaded {} commands ({})", count, target),
                        None => println!("❌ Upload failed, see log"),
                    },
                    Err(e) => println!("❓ {}", e),
                }
            }
            "" => {}
            _ => {
                println!("❓ Unknown command: '{}'. Type 'help' for available commands.", command);
            }
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let config = match load_bot_config().and_then(|(path, values)| {
        println!("✅ Configuration loaded from {}", path.display());
        BotConfig::from_map(&values)
    }) {
        Ok(config) => config,
        Err(error) => {
            log::error!("❌ Failed to load configuration: {}", error);
            eprintln!("❌ {}", error);
            eprintln!("Create a botconfig.txt file in the project root with: DISCORD_TOKEN=your_token_here");
            return;
        }
    };

    // Command runtime
    let catalog = Arc::new(HandlerCatalog::builtin());
    log::info!("[COMMANDS] Handlers available: {}", catalog.names().join(", "));
    let uploader = CommandUploader::new(&config.api_base, &config.token, config.application_id);
    let runtime = Arc::new(
        CommandRuntime::new(
            Arc::new(CommandRegistry::new()),
            Arc::new(DefinitionLoader::new(catalog)),
            &config.commands_dir,
            config.reload_debounce,
        )
        .with_uploader(uploader),
    );

    for plugin in discover_plugins(&config.plugins_dir).await {
        runtime.add_plugin(plugin).await;
    }
    runtime.load_all().await;
    if let Err(e) = runtime.start_watching().await {
        log::error!("[WATCHER] Hot reload disabled: {}", e);
    }

    let intents = GatewayIntents::non_privileged();
    let handler = Handler {
        runtime: runtime.clone(),
        upload_on_ready: config.upload_on_ready,
    };
    let mut client = match Client::builder(&config.token, intents)
        .event_handler(handler)
        .await
    {
        Ok(client) => client,
        Err(e) => {
            log::error!("❌ Error creating Discord client: {:?}", e);
            eprintln!("Check your token in botconfig.txt file");
            runtime.shutdown().await;
            return;
        }
    };

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<String>(1);
    let cmd_task = tokio::spawn(handle_command_line(shutdown_tx, runtime.clone()));

    println!("🚀 Bot is running...");
    println!("💡 Use 'quit' command to stop gracefully, or press Ctrl+C");
    tokio::select! {
        _ = signal::ctrl_c() => {
            println!("\n⏹️ Stopping bot gracefully...");
        }
        shutdown_signal = shutdown_rx.recv() => {
            if let Some(signal) = shutdown_signal {
                println!("📡 Received '{}' command, stopping bot gracefully...", signal);
            }
        }
        result = client.start() => {
            if let Err(why) = result {
                log::error!("❌ Client error: {:?}", why);
            }
        }
    }

    client.shard_manager.lock().await.shutdown_all().await;
    runtime.shutdown().await;
    cmd_task.abort();

    println!("✅ Bot stopped");
}
