// config.rs - Bot configuration
// Reads botconfig.txt (KEY=VALUE, `#` comments) from the first location that
// has one and turns it into typed settings for the command runtime.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::commands::export::UploadTarget;

pub const CONFIG_FILE: &str = "botconfig.txt";
pub const TOKEN_PLACEHOLDER: &str = "YOUR_BOT_TOKEN_HERE";
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

const CONFIG_PATHS: [&str; 4] = [
    "botconfig.txt",
    "../botconfig.txt",
    "../../botconfig.txt",
    "src/botconfig.txt",
];

#[derive(Debug, Clone, PartialEq)]
pub struct BotConfig {
    pub token: String,
    pub application_id: Option<u64>,
    pub commands_dir: PathBuf,
    pub plugins_dir: PathBuf,
    pub reload_debounce: Duration,
    pub upload_on_ready: Option<UploadTarget>,
    pub api_base: String,
}

impl BotConfig {
    pub fn from_map(config: &HashMap<String, String>) -> Result<Self, String> {
        let token = match config.get("DISCORD_TOKEN") {
            Some(token) if token.is_empty() || token == TOKEN_PLACEHOLDER => {
                return Err(format!(
                    "DISCORD_TOKEN in {} is set to placeholder! Replace with your actual Discord bot token.",
                    CONFIG_FILE
                ))
            }
            Some(token) => token.clone(),
            None => return Err(format!("DISCORD_TOKEN not found in {}", CONFIG_FILE)),
        };

        let application_id = match non_empty(config, "APPLICATION_ID") {
            Some(id) => Some(
                id.parse::<u64>()
                    .map_err(|_| format!("APPLICATION_ID '{}' is not a number", id))?,
            ),
            None => None,
        };

        let reload_debounce = match non_empty(config, "COMMAND_RELOAD_DEBOUNCE_MS") {
            Some(ms) => Duration::from_millis(
                ms.parse::<u64>()
                    .map_err(|_| format!("COMMAND_RELOAD_DEBOUNCE_MS '{}' is not a number", ms))?,
            ),
            None => Duration::from_millis(4000),
        };

        let upload_on_ready = match non_empty(config, "UPLOAD_COMMANDS_ON_READY") {
            Some(target) => Some(target.parse::<UploadTarget>().map_err(|e| e.to_string())?),
            None => None,
        };

        Ok(Self {
            token,
            application_id,
            commands_dir: PathBuf::from(non_empty(config, "COMMANDS_DIR").unwrap_or("commands")),
            plugins_dir: PathBuf::from(non_empty(config, "PLUGINS_DIR").unwrap_or("plugins")),
            reload_debounce,
            upload_on_ready,
            api_base: non_empty(config, "DISCORD_API_BASE")
                .unwrap_or(DEFAULT_API_BASE)
                .to_string(),
        })
    }
}

fn non_empty<'a>(config: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    config.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

/// Parse the KEY=VALUE body of a config file
pub fn parse_config(content: &str) -> HashMap<String, String> {
    // Remove BOM if present
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut config = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            config.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    config
}

/// Read configuration from botconfig.txt with multi-path fallback
pub fn load_bot_config() -> Result<(PathBuf, HashMap<String, String>), String> {
    for config_path in &CONFIG_PATHS {
        if let Ok(content) = fs::read_to_string(config_path) {
            return Ok((PathBuf::from(config_path), parse_config(&content)));
        }
    }

    Err(format!(
        "No {} file found in any expected location (., .., ../.., src/)",
        CONFIG_FILE
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comments_bom_and_spacing() {
        let config = parse_config("\u{feff}# bot\nDISCORD_TOKEN = abc\n\nCOMMANDS_DIR=cmds\nnot a pair\n");

        assert_eq!(config.get("DISCORD_TOKEN").map(String::as_str), Some("abc"));
        assert_eq!(config.get("COMMANDS_DIR").map(String::as_str), Some("cmds"));
        assert_eq!(config.len(), 2);
    }

    #[test]
    fn values_may_contain_equals_signs() {
        let config = parse_config("DISCORD_TOKEN=abc==");
        assert_eq!(config.get("DISCORD_TOKEN").map(String::as_str), Some("abc=="));
    }

    #[test]
    fn defaults_fill_missing_keys() {
        let config = BotConfig::from_map(&parse_config("DISCORD_TOKEN=abc")).unwrap();

        assert_eq!(config.application_id, None);
        assert_eq!(config.commands_dir, PathBuf::from("commands"));
        assert_eq!(config.plugins_dir, PathBuf::from("plugins"));
        assert_eq!(config.reload_debounce, Duration::from_secs(4));
        assert_eq!(config.upload_on_ready, None);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn explicit_values_are_typed() {
        let config = BotConfig::from_map(&parse_config(
            "DISCORD_TOKEN=abc\nAPPLICATION_ID=123\nCOMMAND_RELOAD_DEBOUNCE_MS=250\nUPLOAD_COMMANDS_ON_READY=987",
        ))
        .unwrap();

        assert_eq!(config.application_id, Some(123));
        assert_eq!(config.reload_debounce, Duration::from_millis(250));
        assert_eq!(config.upload_on_ready, Some(UploadTarget::Guild(987)));
    }

    #[test]
    fn token_is_required_and_not_a_placeholder() {
        assert!(BotConfig::from_map(&HashMap::new()).is_err());
        assert!(BotConfig::from_map(&parse_config("DISCORD_TOKEN=YOUR_BOT_TOKEN_HERE")).is_err());
        assert!(BotConfig::from_map(&parse_config("DISCORD_TOKEN=")).is_err());
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        assert!(BotConfig::from_map(&parse_config("DISCORD_TOKEN=a\nAPPLICATION_ID=abc")).is_err());
        assert!(
            BotConfig::from_map(&parse_config("DISCORD_TOKEN=a\nUPLOAD_COMMANDS_ON_READY=lobby")).is_err()
        );
    }
}
