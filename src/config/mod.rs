//! Configuration management
//!
//! This module handles loading and parsing configuration for the Folio service.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Public site information
    #[serde(default)]
    pub site: SiteConfig,
    /// Admin access
    #[serde(default)]
    pub admin: AdminConfig,
    /// Live chat tuning
    #[serde(default)]
    pub chat: ChatConfig,
    /// New-chat notification delivery
    #[serde(default)]
    pub notification: NotificationConfig,
    /// Generative API used by the content assistant
    #[serde(default)]
    pub ai: AiConfig,
    /// Scheduling API used by the booking proxy
    #[serde(default)]
    pub booking: BookingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Take the client address from `X-Forwarded-For`. Only enable behind a
    /// reverse proxy that overwrites the header.
    #[serde(default)]
    pub trust_proxy: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            trust_proxy: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path or URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/folio.db".to_string()
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Maximum number of cached entries
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            max_capacity: default_max_capacity(),
        }
    }
}

fn default_ttl() -> u64 {
    3600
}

fn default_max_capacity() -> u64 {
    10_000
}

/// Public site information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site display name
    #[serde(default = "default_site_name")]
    pub name: String,
    /// Public base URL, without trailing slash
    #[serde(default = "default_site_url")]
    pub url: String,
    /// Extra path regexes that answer 410 Gone
    #[serde(default)]
    pub gone_patterns: Vec<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: default_site_name(),
            url: default_site_url(),
            gone_patterns: Vec::new(),
        }
    }
}

fn default_site_name() -> String {
    "Solve with Software".to_string()
}

fn default_site_url() -> String {
    "https://www.solvewithsoftware.com".to_string()
}

impl SiteConfig {
    /// Base URL with any trailing slash removed
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

/// Admin access configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Static bearer token for admin routes. Admin routes are closed when unset.
    #[serde(default)]
    pub api_token: Option<String>,
}

/// Live chat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Typing indicators expire after this many milliseconds without refresh
    #[serde(default = "default_typing_ttl_ms")]
    pub typing_ttl_ms: u64,
    /// Favicon flash interval for the admin alert
    #[serde(default = "default_favicon_interval_ms")]
    pub favicon_interval_ms: u64,
    /// Maximum message length in characters
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    /// Visitor requests allowed per minute (per visitor and per IP)
    #[serde(default = "default_visitor_rate_limit")]
    pub visitor_rate_limit_per_minute: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            typing_ttl_ms: default_typing_ttl_ms(),
            favicon_interval_ms: default_favicon_interval_ms(),
            max_message_length: default_max_message_length(),
            visitor_rate_limit_per_minute: default_visitor_rate_limit(),
        }
    }
}

fn default_typing_ttl_ms() -> u64 {
    3000
}

fn default_favicon_interval_ms() -> u64 {
    500
}

fn default_max_message_length() -> usize {
    2000
}

fn default_visitor_rate_limit() -> usize {
    30
}

/// Notification provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationProvider {
    /// Notifications are logged and dropped
    #[default]
    None,
    /// SendGrid v3 mail API
    Sendgrid,
    /// Plain SMTP relay
    Smtp,
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub provider: NotificationProvider,
    /// Recipient of new-chat notifications
    #[serde(default)]
    pub to_email: Option<String>,
    #[serde(default = "default_from_email")]
    pub from_email: String,
    #[serde(default = "default_site_name")]
    pub from_name: String,
    #[serde(default)]
    pub sendgrid_api_key: Option<String>,
    #[serde(default = "default_sendgrid_api_url")]
    pub sendgrid_api_url: String,
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            provider: NotificationProvider::default(),
            to_email: None,
            from_email: default_from_email(),
            from_name: default_site_name(),
            sendgrid_api_key: None,
            sendgrid_api_url: default_sendgrid_api_url(),
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
        }
    }
}

fn default_from_email() -> String {
    "marc@solvewithsoftware.com".to_string()
}

fn default_sendgrid_api_url() -> String {
    "https://api.sendgrid.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

/// Generative API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// OpenAI-compatible base URL
    #[serde(default = "default_ai_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_ai_model")]
    pub model: String,
    #[serde(default = "default_ai_image_model")]
    pub image_model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_url: default_ai_api_url(),
            api_key: None,
            model: default_ai_model(),
            image_model: default_ai_image_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_ai_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_ai_image_model() -> String {
    "dall-e-3".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Scheduling API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfig {
    #[serde(default = "default_booking_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_token: Option<String>,
    /// Used when a booking is not tied to a post with its own scheduling link
    #[serde(default)]
    pub default_scheduling_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            api_url: default_booking_api_url(),
            api_token: None,
            default_scheduling_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_booking_api_url() -> String {
    "https://api.calendly.com".to_string()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern `FOLIO_<SECTION>_<KEY>`, e.g.
    /// `FOLIO_SERVER_PORT` or `FOLIO_ADMIN_API_TOKEN`. `SENDGRID_API_KEY` and
    /// `LIVECHAT_NOTIFICATION_EMAIL` are honoured as well.
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be greater than 0".to_string(),
            ));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database.url cannot be empty".to_string(),
            ));
        }
        if self.chat.favicon_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "chat.favicon_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server
        if let Ok(host) = std::env::var("FOLIO_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse::<u16>("FOLIO_SERVER_PORT") {
            self.server.port = port;
        }
        if let Ok(cors_origin) = std::env::var("FOLIO_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }
        if let Some(trust_proxy) = env_parse::<bool>("FOLIO_SERVER_TRUST_PROXY") {
            self.server.trust_proxy = trust_proxy;
        }

        // Database and cache
        if let Ok(url) = std::env::var("FOLIO_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(ttl) = env_parse::<u64>("FOLIO_CACHE_TTL_SECONDS") {
            self.cache.ttl_seconds = ttl;
        }

        // Site and admin
        if let Ok(url) = std::env::var("FOLIO_SITE_URL") {
            self.site.url = url;
        }
        if let Ok(name) = std::env::var("FOLIO_SITE_NAME") {
            self.site.name = name;
        }
        if let Ok(token) = std::env::var("FOLIO_ADMIN_API_TOKEN") {
            self.admin.api_token = Some(token);
        }

        // Chat
        if let Some(ms) = env_parse::<u64>("FOLIO_CHAT_TYPING_TTL_MS") {
            self.chat.typing_ttl_ms = ms;
        }
        if let Some(ms) = env_parse::<u64>("FOLIO_CHAT_FAVICON_INTERVAL_MS") {
            self.chat.favicon_interval_ms = ms;
        }

        // Notification
        if let Ok(provider) = std::env::var("FOLIO_NOTIFICATION_PROVIDER") {
            match provider.to_lowercase().as_str() {
                "none" => self.notification.provider = NotificationProvider::None,
                "sendgrid" => self.notification.provider = NotificationProvider::Sendgrid,
                "smtp" => self.notification.provider = NotificationProvider::Smtp,
                _ => {}
            }
        }
        if let Ok(key) = std::env::var("SENDGRID_API_KEY") {
            self.notification.sendgrid_api_key = Some(key);
            if self.notification.provider == NotificationProvider::None {
                self.notification.provider = NotificationProvider::Sendgrid;
            }
        }
        if let Ok(to) = std::env::var("LIVECHAT_NOTIFICATION_EMAIL") {
            self.notification.to_email = Some(to);
        }
        if let Ok(to) = std::env::var("FOLIO_NOTIFICATION_TO_EMAIL") {
            self.notification.to_email = Some(to);
        }
        if let Ok(password) = std::env::var("FOLIO_NOTIFICATION_SMTP_PASSWORD") {
            self.notification.smtp_password = Some(password);
        }

        // External APIs
        if let Ok(key) = std::env::var("FOLIO_AI_API_KEY") {
            self.ai.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("FOLIO_AI_API_URL") {
            self.ai.api_url = url;
        }
        if let Ok(token) = std::env::var("FOLIO_BOOKING_API_TOKEN") {
            self.booking.api_token = Some(token);
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        super::CONFIG_ENV_MUTEX
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn clear_env() {
        for name in [
            "FOLIO_SERVER_HOST",
            "FOLIO_SERVER_PORT",
            "FOLIO_SERVER_TRUST_PROXY",
            "FOLIO_DATABASE_URL",
            "FOLIO_SITE_URL",
            "FOLIO_ADMIN_API_TOKEN",
            "FOLIO_NOTIFICATION_PROVIDER",
            "SENDGRID_API_KEY",
            "LIVECHAT_NOTIFICATION_EMAIL",
            "FOLIO_NOTIFICATION_TO_EMAIL",
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let config = Config::load(std::path::Path::new("nonexistent_config.yml")).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.url, "data/folio.db");
        assert_eq!(config.chat.typing_ttl_ms, 3000);
        assert_eq!(config.chat.favicon_interval_ms, 500);
        assert_eq!(config.notification.provider, NotificationProvider::None);
        assert!(config.admin.api_token.is_none());
    }

    #[test]
    fn test_load_empty_file_returns_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "chat:\n  typing_ttl_ms: 1500\n").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.chat.typing_ttl_ms, 1500);
        assert_eq!(config.chat.max_message_length, 2000);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
server:
  host: "127.0.0.1"
  port: 9000
database:
  url: "sqlite:/var/lib/folio/folio.db"
site:
  url: "https://example.com/"
  gone_patterns:
    - "^/old-section/.*"
admin:
  api_token: "secret"
notification:
  provider: smtp
  to_email: "alerts@example.com"
  smtp_host: "smtp.example.com"
booking:
  default_scheduling_url: "https://calendly.com/example/30min"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.url, "sqlite:/var/lib/folio/folio.db");
        assert_eq!(config.site.base_url(), "https://example.com");
        assert_eq!(config.site.gone_patterns.len(), 1);
        assert_eq!(config.admin.api_token.as_deref(), Some("secret"));
        assert_eq!(config.notification.provider, NotificationProvider::Smtp);
        assert_eq!(config.notification.smtp_port, 587);
        assert_eq!(
            config.booking.default_scheduling_url.as_deref(),
            Some("https://calendly.com/example/30min")
        );
    }

    #[test]
    fn test_load_invalid_yaml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: not_a_number\n").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("parse"));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.chat.favicon_interval_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_env_override_server_and_admin() {
        let _guard = lock_env();
        clear_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 8080\n").unwrap();

        std::env::set_var("FOLIO_SERVER_PORT", "4000");
        std::env::set_var("FOLIO_SERVER_TRUST_PROXY", "true");
        std::env::set_var("FOLIO_ADMIN_API_TOKEN", "from-env");

        let config = Config::load_with_env(file.path()).unwrap();
        assert_eq!(config.server.port, 4000);
        assert!(config.server.trust_proxy);
        assert_eq!(config.admin.api_token.as_deref(), Some("from-env"));

        clear_env();
    }

    #[test]
    fn test_env_override_invalid_port_ignored() {
        let _guard = lock_env();
        clear_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 8081\n").unwrap();

        std::env::set_var("FOLIO_SERVER_PORT", "not_a_number");

        let config = Config::load_with_env(file.path()).unwrap();
        assert_eq!(config.server.port, 8081);

        clear_env();
    }

    #[test]
    fn test_legacy_sendgrid_variables() {
        let _guard = lock_env();
        clear_env();

        let file = NamedTempFile::new().unwrap();
        std::env::set_var("SENDGRID_API_KEY", "SG.key");
        std::env::set_var("LIVECHAT_NOTIFICATION_EMAIL", "owner@example.com");

        let config = Config::load_with_env(file.path()).unwrap();
        assert_eq!(config.notification.provider, NotificationProvider::Sendgrid);
        assert_eq!(config.notification.sendgrid_api_key.as_deref(), Some("SG.key"));
        assert_eq!(
            config.notification.to_email.as_deref(),
            Some("owner@example.com")
        );

        clear_env();
    }
}

/// Property-based tests for configuration parsing
#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(30))]

        #[test]
        fn property_port_round_trips_through_yaml(port in 1u16..=65535u16) {
            let yaml = format!("server:\n  port: {}\n", port);
            let config: Config = serde_yaml::from_str(&yaml).unwrap();
            prop_assert_eq!(config.server.port, port);
            prop_assert!(config.validate().is_ok());
        }

        #[test]
        fn property_base_url_has_no_trailing_slash(host in "[a-z]{3,12}", slashes in 0usize..4) {
            let site = SiteConfig {
                url: format!("https://{}.com{}", host, "/".repeat(slashes)),
                ..SiteConfig::default()
            };
            prop_assert!(!site.base_url().ends_with('/'));
        }
    }
}
