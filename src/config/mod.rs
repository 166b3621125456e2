//! Configuration management
//!
//! This module handles loading and parsing configuration for Gatherly.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults. Missing
//! provider credentials are not an error: the corresponding integration
//! runs in its disabled or fallback mode.

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
    /// Language-model provider configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// SMS provider configuration
    #[serde(default)]
    pub sms: SmsConfig,
    /// Outbound email configuration
    #[serde(default)]
    pub email: EmailConfig,
    /// Planner behaviour
    #[serde(default)]
    pub planner: PlannerConfig,
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
    /// Public base URL used in invitation links
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            public_url: default_public_url(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_public_url() -> String {
    "http://localhost:5000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/gatherly.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Language-model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Messages endpoint
    #[serde(default = "default_llm_api_url")]
    pub api_url: String,
    /// API key; when absent the keyword assistant answers instead
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model identifier
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Maximum tokens per completion
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: default_llm_api_url(),
            api_key: None,
            model: default_llm_model(),
            max_tokens: default_llm_max_tokens(),
            timeout_seconds: default_llm_timeout(),
        }
    }
}

impl LlmConfig {
    /// Whether a usable API key is present
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

fn default_llm_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_llm_model() -> String {
    "claude-3-sonnet-20240229".to_string()
}

fn default_llm_max_tokens() -> u32 {
    1000
}

fn default_llm_timeout() -> u64 {
    30
}

/// SMS provider configuration (Twilio-compatible REST API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    #[serde(default)]
    pub account_sid: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Sender phone number
    #[serde(default)]
    pub from_number: Option<String>,
    #[serde(default = "default_sms_api_base")]
    pub api_base: String,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            from_number: None,
            api_base: default_sms_api_base(),
        }
    }
}

impl SmsConfig {
    pub fn is_configured(&self) -> bool {
        [&self.account_sid, &self.auth_token, &self.from_number]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

fn default_sms_api_base() -> String {
    "https://api.twilio.com".to_string()
}

/// SMTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            from_address: default_from_address(),
            from_name: default_from_name(),
        }
    }
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        self.smtp_host.as_deref().is_some_and(|h| !h.trim().is_empty())
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "noreply@example.com".to_string()
}

fn default_from_name() -> String {
    "Group Activity Planner".to_string()
}

/// Planner behaviour configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Conversational calls allowed per participant within the window
    #[serde(default = "default_conversation_limit")]
    pub conversation_limit: usize,
    /// Sliding window length in minutes
    #[serde(default = "default_conversation_window")]
    pub conversation_window_minutes: i64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            conversation_limit: default_conversation_limit(),
            conversation_window_minutes: default_conversation_window(),
        }
    }
}

fn default_conversation_limit() -> usize {
    20
}

fn default_conversation_window() -> i64 {
    10
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
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns default configuration.
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
    /// Environment variables follow the pattern `GATHERLY_<SECTION>_<FIELD>`:
    /// - GATHERLY_SERVER_HOST, GATHERLY_SERVER_PORT, GATHERLY_SERVER_PUBLIC_URL
    /// - GATHERLY_DATABASE_DRIVER, GATHERLY_DATABASE_URL
    /// - GATHERLY_LLM_API_KEY, GATHERLY_LLM_MODEL, GATHERLY_LLM_API_URL
    /// - GATHERLY_SMS_ACCOUNT_SID, GATHERLY_SMS_AUTH_TOKEN, GATHERLY_SMS_FROM_NUMBER
    /// - GATHERLY_EMAIL_SMTP_HOST, GATHERLY_EMAIL_SMTP_PORT, ...
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        let var = |name: &str| std::env::var(format!("GATHERLY_{}", name)).ok();

        // Server
        if let Some(host) = var("SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("SERVER_PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Some(origin) = var("SERVER_CORS_ORIGIN") {
            self.server.cors_origin = origin;
        }
        if let Some(url) = var("SERVER_PUBLIC_URL") {
            self.server.public_url = url;
        }

        // Database
        if let Some(driver) = var("DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Some(url) = var("DATABASE_URL") {
            self.database.url = url;
        }

        // LLM
        if let Some(key) = var("LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = var("LLM_API_URL") {
            self.llm.api_url = url;
        }
        if let Some(tokens) = var("LLM_MAX_TOKENS").and_then(|t| t.parse::<u32>().ok()) {
            self.llm.max_tokens = tokens;
        }

        // SMS
        if let Some(sid) = var("SMS_ACCOUNT_SID") {
            self.sms.account_sid = Some(sid);
        }
        if let Some(token) = var("SMS_AUTH_TOKEN") {
            self.sms.auth_token = Some(token);
        }
        if let Some(from) = var("SMS_FROM_NUMBER") {
            self.sms.from_number = Some(from);
        }

        // Email
        if let Some(host) = var("EMAIL_SMTP_HOST") {
            self.email.smtp_host = Some(host);
        }
        if let Some(port) = var("EMAIL_SMTP_PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.email.smtp_port = port;
        }
        if let Some(user) = var("EMAIL_SMTP_USERNAME") {
            self.email.smtp_username = Some(user);
        }
        if let Some(password) = var("EMAIL_SMTP_PASSWORD") {
            self.email.smtp_password = Some(password);
        }
        if let Some(from) = var("EMAIL_FROM_ADDRESS") {
            self.email.from_address = from;
        }
    }

    /// Log which integrations are configured without revealing secrets
    pub fn log_integrations(&self) {
        let state = |ok: bool| if ok { "CONFIGURED" } else { "MISSING" };
        tracing::info!(
            llm = state(self.llm.is_configured()),
            sms = state(self.sms.is_configured()),
            email = state(self.email.is_configured()),
            "Integration status"
        );
        if !self.llm.is_configured() {
            tracing::warn!("LLM API key not set, conversational replies use keyword matching");
        }
    }
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

// Config tests that modify environment variables share this lock.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
