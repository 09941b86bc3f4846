//! Configuration module for upwatch.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Everything is read once at startup and never re-read.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Shortest interval or timeout accepted from configuration.
pub const MIN_DURATION: Duration = Duration::from_millis(1);

/// Telegram Bot API credentials for the chat transport.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: String,
    /// Base URL of the Bot API (default: "https://api.telegram.org")
    pub api_url: String,
}

/// SMTP settings for the mail transport.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub email_to: String,
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the dashboard (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "upwatch.db")
    pub db_path: String,
    /// Path to the YAML target list (default: "targets.yml")
    pub targets_file: String,
    /// Interval used by targets that do not set their own (default: 30s)
    pub check_interval: Duration,
    /// Per-probe request timeout (default: 10s)
    pub request_timeout: Duration,
    /// Chat transport, present only when both token and chat id are set
    pub telegram: Option<TelegramConfig>,
    /// Mail transport, present only when both host and recipient are set
    pub smtp: Option<SmtpConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "upwatch.db".to_string(),
            targets_file: "targets.yml".to_string(),
            check_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
            telegram: None,
            smtp: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `UPWATCH_HTTP_PORT`: HTTP port (default: 8080)
    /// - `UPWATCH_DB_PATH`: Database file path (default: "upwatch.db")
    /// - `UPWATCH_TARGETS_FILE`: Target list path (default: "targets.yml")
    /// - `UPWATCH_CHECK_INTERVAL`: Default check interval in seconds (default: 30)
    /// - `UPWATCH_REQUEST_TIMEOUT`: Probe timeout in seconds (default: 10)
    /// - `UPWATCH_TELEGRAM_TOKEN`, `UPWATCH_TELEGRAM_CHAT_ID`, `UPWATCH_TELEGRAM_API_URL`
    /// - `UPWATCH_SMTP_HOST`, `UPWATCH_SMTP_PORT`, `UPWATCH_SMTP_USER`, `UPWATCH_SMTP_PASS`,
    ///   `UPWATCH_EMAIL_TO`
    ///
    /// Deployments of the older monitor map over by adding the prefix:
    /// `PORT` -> `UPWATCH_HTTP_PORT`, `DB_FILE` -> `UPWATCH_DB_PATH`,
    /// `TARGETS_FILE`, `CHECK_INTERVAL`, `REQUEST_TIMEOUT`, `TELEGRAM_*`,
    /// `SMTP_*` and `EMAIL_TO` keep their names behind `UPWATCH_`.
    ///
    /// Durations outside what `duration_from_secs` accepts keep the default.
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = var("UPWATCH_HTTP_PORT").and_then(|v| parse(&v)) {
            cfg.http_port = port;
        }

        if let Some(db_path) = var("UPWATCH_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(targets_file) = var("UPWATCH_TARGETS_FILE") {
            cfg.targets_file = targets_file;
        }

        if let Some(secs) = var("UPWATCH_CHECK_INTERVAL").and_then(|v| parse_secs(&v)) {
            cfg.check_interval = secs;
        }

        if let Some(secs) = var("UPWATCH_REQUEST_TIMEOUT").and_then(|v| parse_secs(&v)) {
            cfg.request_timeout = secs;
        }

        if let (Some(token), Some(chat_id)) =
            (var("UPWATCH_TELEGRAM_TOKEN"), var("UPWATCH_TELEGRAM_CHAT_ID"))
        {
            cfg.telegram = Some(TelegramConfig {
                token,
                chat_id,
                api_url: var("UPWATCH_TELEGRAM_API_URL")
                    .unwrap_or_else(|| "https://api.telegram.org".to_string()),
            });
        }

        if let (Some(host), Some(email_to)) = (var("UPWATCH_SMTP_HOST"), var("UPWATCH_EMAIL_TO")) {
            cfg.smtp = Some(SmtpConfig {
                host,
                port: var("UPWATCH_SMTP_PORT").and_then(|v| parse(&v)).unwrap_or(587),
                user: var("UPWATCH_SMTP_USER"),
                password: var("UPWATCH_SMTP_PASS"),
                email_to,
            });
        }

        cfg
    }
}

fn parse<T: FromStr>(value: &str) -> Option<T> {
    value.trim().parse().ok()
}

fn parse_secs(value: &str) -> Option<Duration> {
    parse::<f64>(value).and_then(duration_from_secs)
}

/// Convert a number of seconds into a usable interval or timeout.
///
/// `None` for non-finite, negative, overflowing, or sub-millisecond values.
pub fn duration_from_secs(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| *d >= MIN_DURATION)
}
