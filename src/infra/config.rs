//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// How the session summary is encoded in the submit request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitEncoding {
    /// `application/x-www-form-urlencoded` fields
    Form,
    /// JSON request body
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: String,
    #[serde(default = "default_store_namespace")]
    pub namespace: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { dir: default_store_dir(), namespace: default_store_namespace() }
    }
}

fn default_store_dir() -> String {
    "data".to_string()
}

fn default_store_namespace() -> String {
    "io.checkin.session".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_submit_path")]
    pub path: String,
    #[serde(default = "default_submit_encoding")]
    pub encoding: SubmitEncoding,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Upper bound for the request once connected (read and write)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            path: default_submit_path(),
            encoding: default_submit_encoding(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://en478jh796m7w.x.pipedream.net/".to_string()
}

fn default_submit_path() -> String {
    "submit-session".to_string()
}

fn default_submit_encoding() -> SubmitEncoding {
    SubmitEncoding::Form
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Ticks buffered per observer before further ticks are dropped for it
    #[serde(default = "default_observer_buffer")]
    pub observer_buffer: usize,
    /// Persistent status file updated on every tick (empty to disable)
    #[serde(default = "default_status_file")]
    pub status_file: String,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            observer_buffer: default_observer_buffer(),
            status_file: default_status_file(),
        }
    }
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_observer_buffer() -> usize {
    16
}

fn default_status_file() -> String {
    "session-status.txt".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_broadcast_host")]
    pub host: String,
    #[serde(default = "default_broadcast_port")]
    pub port: u16,
    #[serde(default = "default_broadcast_topic")]
    pub topic: String,
    #[serde(default = "default_broadcast_key")]
    pub key: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_broadcast_host(),
            port: default_broadcast_port(),
            topic: default_broadcast_topic(),
            key: default_broadcast_key(),
            username: None,
            password: None,
        }
    }
}

fn default_broadcast_host() -> String {
    "localhost".to_string()
}

fn default_broadcast_port() -> u16 {
    1883
}

fn default_broadcast_topic() -> String {
    "checkin/timer".to_string()
}

fn default_broadcast_key() -> String {
    "elapsed".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// Status/metrics HTTP port (0 to disable)
    #[serde(default)]
    pub http_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval(), http_port: 0 }
    }
}

fn default_metrics_interval() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub submission: SubmissionConfig,
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    store_dir: String,
    store_namespace: String,
    submit_base_url: String,
    submit_path: String,
    submit_encoding: SubmitEncoding,
    connect_timeout_secs: u64,
    request_timeout_secs: u64,
    tick_interval_ms: u64,
    observer_buffer: usize,
    status_file: String,
    broadcast_enabled: bool,
    broadcast_host: String,
    broadcast_port: u16,
    broadcast_topic: String,
    broadcast_key: String,
    broadcast_username: Option<String>,
    broadcast_password: Option<String>,
    metrics_interval_secs: u64,
    http_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            store_dir: toml_config.store.dir,
            store_namespace: toml_config.store.namespace,
            submit_base_url: toml_config.submission.base_url,
            submit_path: toml_config.submission.path,
            submit_encoding: toml_config.submission.encoding,
            connect_timeout_secs: toml_config.submission.connect_timeout_secs,
            request_timeout_secs: toml_config.submission.request_timeout_secs,
            tick_interval_ms: toml_config.timer.tick_interval_ms,
            observer_buffer: toml_config.timer.observer_buffer,
            status_file: toml_config.timer.status_file,
            broadcast_enabled: toml_config.broadcast.enabled,
            broadcast_host: toml_config.broadcast.host,
            broadcast_port: toml_config.broadcast.port,
            broadcast_topic: toml_config.broadcast.topic,
            broadcast_key: toml_config.broadcast.key,
            broadcast_username: toml_config.broadcast.username,
            broadcast_password: toml_config.broadcast.password,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            http_port: toml_config.metrics.http_port,
            config_file,
        }
    }

    /// Determine config file path from an explicit argument or the environment
    pub fn resolve_config_path(arg: Option<&str>) -> String {
        if let Some(path) = arg {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Path of the key/value file backing the session store
    pub fn store_path(&self) -> PathBuf {
        Path::new(&self.store_dir).join(format!("{}.json", self.store_namespace))
    }

    /// Full submit endpoint (base url joined with path)
    pub fn submit_url(&self) -> String {
        format!(
            "{}/{}",
            self.submit_base_url.trim_end_matches('/'),
            self.submit_path.trim_start_matches('/')
        )
    }

    // Getters for all config fields
    pub fn store_dir(&self) -> &str {
        &self.store_dir
    }

    pub fn store_namespace(&self) -> &str {
        &self.store_namespace
    }

    pub fn submit_base_url(&self) -> &str {
        &self.submit_base_url
    }

    pub fn submit_encoding(&self) -> SubmitEncoding {
        self.submit_encoding
    }

    pub fn connect_timeout_secs(&self) -> u64 {
        self.connect_timeout_secs
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs
    }

    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
    }

    pub fn observer_buffer(&self) -> usize {
        self.observer_buffer
    }

    pub fn status_file(&self) -> Option<&str> {
        if self.status_file.is_empty() {
            None
        } else {
            Some(&self.status_file)
        }
    }

    pub fn broadcast_enabled(&self) -> bool {
        self.broadcast_enabled
    }

    pub fn broadcast_host(&self) -> &str {
        &self.broadcast_host
    }

    pub fn broadcast_port(&self) -> u16 {
        self.broadcast_port
    }

    pub fn broadcast_topic(&self) -> &str {
        &self.broadcast_topic
    }

    pub fn broadcast_key(&self) -> &str {
        &self.broadcast_key
    }

    pub fn broadcast_username(&self) -> Option<&str> {
        self.broadcast_username.as_deref()
    }

    pub fn broadcast_password(&self) -> Option<&str> {
        self.broadcast_password.as_deref()
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to point submissions at a local server
    pub fn with_submit_base_url(mut self, url: &str) -> Self {
        self.submit_base_url = url.to_string();
        self
    }

    /// Builder method for tests to select the request encoding
    pub fn with_submit_encoding(mut self, encoding: SubmitEncoding) -> Self {
        self.submit_encoding = encoding;
        self
    }

    /// Builder method for tests to shorten the response read timeout
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Builder method for tests to place the store and status file
    pub fn with_store_dir(mut self, dir: &str) -> Self {
        self.store_dir = dir.to_string();
        self
    }

    /// Builder method for tests to set the status file path
    pub fn with_status_file(mut self, path: &str) -> Self {
        self.status_file = path.to_string();
        self
    }
}
