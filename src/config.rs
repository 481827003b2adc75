//! Configuration types.
//!
//! Everything is read from environment variables at startup. Missing
//! required values fail fast with a [`ConfigError`] before any connection
//! is made.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

pub const DEFAULT_ORDER_PREFIX: &str = "!sendorder";
pub const DEFAULT_TURN_PREFIX: &str = "!turn";
pub const DEFAULT_AFFIL_PREFIX: &str = "!faction";
pub const DEFAULT_HELP_PREFIX: &str = "!plshelp";

/// The four top-level command prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPrefixes {
    pub order: String,
    pub turn: String,
    pub affil: String,
    pub help: String,
}

impl Default for CommandPrefixes {
    fn default() -> Self {
        Self {
            order: DEFAULT_ORDER_PREFIX.to_string(),
            turn: DEFAULT_TURN_PREFIX.to_string(),
            affil: DEFAULT_AFFIL_PREFIX.to_string(),
            help: DEFAULT_HELP_PREFIX.to_string(),
        }
    }
}

impl CommandPrefixes {
    /// Reject empty prefixes, prefixes containing whitespace, and any pair
    /// where one is a leading substring of the other.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let all = [
            ("ORDERSBOT_ORDER_PREFIX", &self.order),
            ("ORDERSBOT_TURN_PREFIX", &self.turn),
            ("ORDERSBOT_AFFIL_PREFIX", &self.affil),
            ("ORDERSBOT_HELP_PREFIX", &self.help),
        ];

        for (key, prefix) in &all {
            if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "prefix must be non-empty and contain no whitespace".into(),
                });
            }
        }

        for (i, (key_a, a)) in all.iter().enumerate() {
            for (key_b, b) in all.iter().skip(i + 1) {
                let a = a.to_ascii_lowercase();
                let b = b.to_ascii_lowercase();
                if a.starts_with(&b) || b.starts_with(&a) {
                    return Err(ConfigError::InvalidValue {
                        key: key_a.to_string(),
                        message: format!("prefix overlaps with {key_b}"),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Which platform adapter to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Discord,
    Cli,
}

/// Discord connection settings.
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub token: SecretString,
    pub orders_channel_id: String,
    pub home_guild_id: String,
}

/// Google Sheets log sink settings.
#[derive(Debug, Clone)]
pub struct SheetConfig {
    pub sheet_id: String,
    pub access_token: SecretString,
    pub range: String,
}

/// Full bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub mode: ChannelMode,
    /// Present whenever `mode` is [`ChannelMode::Discord`].
    pub discord: Option<DiscordConfig>,
    /// `None` when sheet logging is disabled.
    pub sheet: Option<SheetConfig>,
    pub prefixes: CommandPrefixes,
    pub db_path: PathBuf,
    pub log_dir: Option<PathBuf>,
}

impl BotConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let required = |key: &str, hint: &str| {
            get(key).ok_or_else(|| ConfigError::MissingRequired {
                key: key.to_string(),
                hint: hint.to_string(),
            })
        };

        let mode = match get("ORDERSBOT_CHANNEL").as_deref() {
            None | Some("discord") => ChannelMode::Discord,
            Some("cli") => ChannelMode::Cli,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "ORDERSBOT_CHANNEL".into(),
                    message: format!("expected `discord` or `cli`, got `{other}`"),
                });
            }
        };

        let discord = match mode {
            ChannelMode::Discord => Some(DiscordConfig {
                token: SecretString::from(required(
                    "DISCORD_TOKEN",
                    "Set the bot token from the Discord developer portal.",
                )?),
                orders_channel_id: required(
                    "ORDERS_CHANNEL_ID",
                    "Set the id of the channel orders are relayed to.",
                )?,
                home_guild_id: required(
                    "HOME_GUILD_ID",
                    "Set the id of the server whose members may send orders.",
                )?,
            }),
            ChannelMode::Cli => None,
        };

        let sheet_disabled = get("SHEET_LOGGING")
            .map(|v| v.eq_ignore_ascii_case("disabled") || v.eq_ignore_ascii_case("off"))
            .unwrap_or(false);

        let sheet = if sheet_disabled {
            None
        } else {
            Some(SheetConfig {
                sheet_id: required(
                    "SHEET_ID",
                    "Set the spreadsheet id, or SHEET_LOGGING=disabled to turn logging off.",
                )?,
                access_token: SecretString::from(required(
                    "SHEETS_ACCESS_TOKEN",
                    "Set an OAuth access token with the spreadsheets scope.",
                )?),
                range: get("SHEET_RANGE").unwrap_or_else(|| "Sheet1!A1".to_string()),
            })
        };

        let defaults = CommandPrefixes::default();
        let prefixes = CommandPrefixes {
            order: get("ORDERSBOT_ORDER_PREFIX").unwrap_or(defaults.order),
            turn: get("ORDERSBOT_TURN_PREFIX").unwrap_or(defaults.turn),
            affil: get("ORDERSBOT_AFFIL_PREFIX").unwrap_or(defaults.affil),
            help: get("ORDERSBOT_HELP_PREFIX").unwrap_or(defaults.help),
        };
        prefixes.validate()?;

        Ok(Self {
            mode,
            discord,
            sheet,
            prefixes,
            db_path: get("ORDERSBOT_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/ordersbot.db")),
            log_dir: get("ORDERSBOT_LOG_DIR").map(PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DISCORD_TOKEN", "tok"),
            ("ORDERS_CHANNEL_ID", "111"),
            ("HOME_GUILD_ID", "222"),
            ("SHEET_ID", "sheet-abc"),
            ("SHEETS_ACCESS_TOKEN", "ya29.x"),
        ]
    }

    #[test]
    fn loads_full_discord_config() {
        let config = BotConfig::from_lookup(lookup(&full_env())).unwrap();
        assert_eq!(config.mode, ChannelMode::Discord);
        let discord = config.discord.unwrap();
        assert_eq!(discord.token.expose_secret(), "tok");
        assert_eq!(discord.orders_channel_id, "111");
        assert_eq!(discord.home_guild_id, "222");
        let sheet = config.sheet.unwrap();
        assert_eq!(sheet.sheet_id, "sheet-abc");
        assert_eq!(sheet.range, "Sheet1!A1");
        assert_eq!(config.prefixes, CommandPrefixes::default());
        assert_eq!(config.db_path, PathBuf::from("./data/ordersbot.db"));
    }

    #[test]
    fn missing_token_fails_fast() {
        let env: Vec<_> = full_env()
            .into_iter()
            .filter(|(k, _)| *k != "DISCORD_TOKEN")
            .collect();
        let err = BotConfig::from_lookup(lookup(&env)).unwrap_err();
        assert!(
            matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "DISCORD_TOKEN")
        );
    }

    #[test]
    fn blank_value_counts_as_missing() {
        let env: Vec<_> = full_env()
            .into_iter()
            .map(|(k, v)| if k == "HOME_GUILD_ID" { (k, "   ") } else { (k, v) })
            .collect();
        let err = BotConfig::from_lookup(lookup(&env)).unwrap_err();
        assert!(
            matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "HOME_GUILD_ID")
        );
    }

    #[test]
    fn sheet_required_unless_disabled() {
        let env: Vec<_> = full_env()
            .into_iter()
            .filter(|(k, _)| *k != "SHEET_ID")
            .collect();
        let err = BotConfig::from_lookup(lookup(&env)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "SHEET_ID"));

        let mut env = env;
        env.push(("SHEET_LOGGING", "disabled"));
        let config = BotConfig::from_lookup(lookup(&env)).unwrap();
        assert!(config.sheet.is_none());
    }

    #[test]
    fn cli_mode_needs_no_discord_credentials() {
        let config = BotConfig::from_lookup(lookup(&[
            ("ORDERSBOT_CHANNEL", "cli"),
            ("SHEET_LOGGING", "disabled"),
        ]))
        .unwrap();
        assert_eq!(config.mode, ChannelMode::Cli);
        assert!(config.discord.is_none());
    }

    #[test]
    fn unknown_channel_mode_rejected() {
        let err = BotConfig::from_lookup(lookup(&[("ORDERSBOT_CHANNEL", "irc")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn custom_prefixes_are_used() {
        let mut env = full_env();
        env.push(("ORDERSBOT_ORDER_PREFIX", "!order"));
        env.push(("ORDERSBOT_HELP_PREFIX", "!help"));
        let config = BotConfig::from_lookup(lookup(&env)).unwrap();
        assert_eq!(config.prefixes.order, "!order");
        assert_eq!(config.prefixes.help, "!help");
        assert_eq!(config.prefixes.turn, DEFAULT_TURN_PREFIX);
    }

    #[test]
    fn overlapping_prefixes_rejected() {
        let prefixes = CommandPrefixes {
            order: "!t".into(),
            ..CommandPrefixes::default()
        };
        assert!(matches!(
            prefixes.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        let prefixes = CommandPrefixes {
            help: "!TURNHELP".into(),
            ..CommandPrefixes::default()
        };
        assert!(prefixes.validate().is_err());
    }

    #[test]
    fn whitespace_in_prefix_rejected() {
        let prefixes = CommandPrefixes {
            order: "!send order".into(),
            ..CommandPrefixes::default()
        };
        assert!(prefixes.validate().is_err());
    }

    #[test]
    fn default_prefixes_are_valid() {
        CommandPrefixes::default().validate().unwrap();
    }
}
