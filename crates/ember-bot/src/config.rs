use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use ember_types::ExtensionKind;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub listen: SocketAddr,
    /// Public HTTPS URL Telegram posts updates to.
    pub url: String,
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub api_base: String,
    pub timezone: Tz,
    pub superadmin_id: Option<i64>,
    pub default_ttl_seconds: i64,
    /// Upper bound for a TTL picked with `/ttl`.
    pub max_ttl_seconds: i64,
    pub delayed_send_seconds: i64,
    pub db_path: PathBuf,
    pub lock_path: PathBuf,
    pub backup_dir: PathBuf,
    pub backup_keep: usize,
    pub tick: Duration,
    pub poll_timeout: Duration,
    pub extension_buttons: Vec<ExtensionKind>,
    pub webhook: Option<WebhookConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bot_token = get("BOT_TOKEN").ok_or(ConfigError::Missing("BOT_TOKEN"))?;
        let timezone = parse_or(&get, "TIMEZONE", chrono_tz::Europe::Moscow)?;
        let superadmin_id = get("SUPERADMIN_ID")
            .map(|v| parse_value("SUPERADMIN_ID", &v))
            .transpose()?;

        let extension_buttons = match get("EXTENSION_BUTTONS") {
            None => vec![ExtensionKind::H1, ExtensionKind::H12],
            Some(raw) => ExtensionKind::parse_list(&raw).map_err(|e| ConfigError::Invalid {
                var: "EXTENSION_BUTTONS",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
        };

        let webhook = match get("WEBHOOK_URL") {
            None => None,
            Some(url) => Some(WebhookConfig {
                listen: parse_or(&get, "WEBHOOK_LISTEN", SocketAddr::from(([0, 0, 0, 0], 8443)))?,
                secret: get("WEBHOOK_SECRET").ok_or(ConfigError::Missing("WEBHOOK_SECRET"))?,
                url,
            }),
        };

        let config = Self {
            bot_token,
            api_base: get("EMBER_API_BASE").unwrap_or_else(|| "https://api.telegram.org".into()),
            timezone,
            superadmin_id,
            default_ttl_seconds: parse_or(&get, "DEFAULT_TTL_SECONDS", 900)?,
            max_ttl_seconds: parse_or(&get, "MAX_TTL_SECONDS", 48 * 3600)?,
            delayed_send_seconds: parse_or(&get, "DELAYED_SEND_SECONDS", 120)?,
            db_path: get("DB_PATH").unwrap_or_else(|| "ember.db".into()).into(),
            lock_path: get("LOCK_PATH").unwrap_or_else(|| "ember.lock".into()).into(),
            backup_dir: get("BACKUP_DIR").unwrap_or_else(|| "backups".into()).into(),
            backup_keep: parse_or(&get, "BACKUP_KEEP", 7)?,
            tick: Duration::from_secs(parse_or(&get, "TICK_SECONDS", 5)?),
            poll_timeout: Duration::from_secs(parse_or(&get, "POLL_TIMEOUT_SECONDS", 30)?),
            extension_buttons,
            webhook,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |var: &'static str, value: String, reason: &str| ConfigError::Invalid {
            var,
            value,
            reason: reason.to_string(),
        };
        if self.default_ttl_seconds <= 0 {
            return Err(invalid("DEFAULT_TTL_SECONDS", self.default_ttl_seconds.to_string(), "must be positive"));
        }
        if self.max_ttl_seconds < self.default_ttl_seconds {
            return Err(invalid(
                "MAX_TTL_SECONDS",
                self.max_ttl_seconds.to_string(),
                "must not be below DEFAULT_TTL_SECONDS",
            ));
        }
        if self.delayed_send_seconds < 0 {
            return Err(invalid("DELAYED_SEND_SECONDS", self.delayed_send_seconds.to_string(), "must not be negative"));
        }
        if self.tick.is_zero() {
            return Err(invalid("TICK_SECONDS", "0".into(), "must be at least 1"));
        }
        if self.backup_keep == 0 {
            return Err(invalid("BACKUP_KEEP", "0".into(), "must keep at least one backup"));
        }
        if self.extension_buttons.is_empty() {
            return Err(invalid("EXTENSION_BUTTONS", String::new(), "needs at least one kind"));
        }
        if let Some(wh) = &self.webhook {
            if !wh.url.starts_with("https://") {
                return Err(invalid("WEBHOOK_URL", wh.url.clone(), "must be https"));
            }
        }
        Ok(())
    }
}

fn parse_value<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        Some(raw) => parse_value(var, &raw),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[("BOT_TOKEN", "1:x")]).unwrap();
        assert_eq!(c.timezone, chrono_tz::Europe::Moscow);
        assert_eq!(c.default_ttl_seconds, 900);
        assert_eq!(c.max_ttl_seconds, 172_800);
        assert_eq!(c.delayed_send_seconds, 120);
        assert_eq!(c.tick, Duration::from_secs(5));
        assert_eq!(c.poll_timeout, Duration::from_secs(30));
        assert_eq!(c.backup_keep, 7);
        assert_eq!(c.extension_buttons, vec![ExtensionKind::H1, ExtensionKind::H12]);
        assert_eq!(c.api_base, "https://api.telegram.org");
        assert!(c.webhook.is_none());
        assert!(c.superadmin_id.is_none());
    }

    #[test]
    fn token_is_required() {
        assert_eq!(config(&[]).unwrap_err(), ConfigError::Missing("BOT_TOKEN"));
        assert_eq!(config(&[("BOT_TOKEN", "  ")]).unwrap_err(), ConfigError::Missing("BOT_TOKEN"));
    }

    #[test]
    fn overrides_and_bad_values() {
        let c = config(&[
            ("BOT_TOKEN", "1:x"),
            ("TIMEZONE", "UTC"),
            ("SUPERADMIN_ID", "77"),
            ("EXTENSION_BUTTONS", "15m, 3h ,24h"),
        ])
        .unwrap();
        assert_eq!(c.timezone, Tz::UTC);
        assert_eq!(c.superadmin_id, Some(77));
        assert_eq!(
            c.extension_buttons,
            vec![ExtensionKind::M15, ExtensionKind::H3, ExtensionKind::H24]
        );

        assert!(matches!(
            config(&[("BOT_TOKEN", "1:x"), ("TIMEZONE", "Mars/Olympus")]),
            Err(ConfigError::Invalid { var: "TIMEZONE", .. })
        ));
        assert!(matches!(
            config(&[("BOT_TOKEN", "1:x"), ("EXTENSION_BUTTONS", "1h,5h")]),
            Err(ConfigError::Invalid { var: "EXTENSION_BUTTONS", .. })
        ));
        assert!(matches!(
            config(&[("BOT_TOKEN", "1:x"), ("TICK_SECONDS", "0")]),
            Err(ConfigError::Invalid { var: "TICK_SECONDS", .. })
        ));
        assert!(matches!(
            config(&[("BOT_TOKEN", "1:x"), ("DEFAULT_TTL_SECONDS", "-5")]),
            Err(ConfigError::Invalid { var: "DEFAULT_TTL_SECONDS", .. })
        ));
        assert!(matches!(
            config(&[("BOT_TOKEN", "1:x"), ("DEFAULT_TTL_SECONDS", "7200"), ("MAX_TTL_SECONDS", "3600")]),
            Err(ConfigError::Invalid { var: "MAX_TTL_SECONDS", .. })
        ));
    }

    #[test]
    fn webhook_needs_a_secret() {
        assert_eq!(
            config(&[("BOT_TOKEN", "1:x"), ("WEBHOOK_URL", "https://bot.example/telegram")]).unwrap_err(),
            ConfigError::Missing("WEBHOOK_SECRET")
        );
        let c = config(&[
            ("BOT_TOKEN", "1:x"),
            ("WEBHOOK_URL", "https://bot.example/telegram"),
            ("WEBHOOK_SECRET", "s3cret"),
            ("WEBHOOK_LISTEN", "127.0.0.1:9000"),
        ])
        .unwrap();
        let wh = c.webhook.unwrap();
        assert_eq!(wh.listen, "127.0.0.1:9000".parse().unwrap());
    }
}
