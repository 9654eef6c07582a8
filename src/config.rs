use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub aggregator: AggregatorSettings,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorSettings {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Bound on each metric-family read; defaults to the tick interval.
    pub source_timeout_ms: Option<u64>,
}

fn default_tick_interval_ms() -> u64 {
    1000
}

impl AggregatorSettings {
    pub fn source_timeout_ms(&self) -> u64 {
        self.source_timeout_ms.unwrap_or(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    /// Undelivered snapshots a subscriber may hold before it is dropped as slow.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
    /// Interval between SSE keep-alive comments.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

fn default_subscriber_buffer() -> usize {
    8
}

fn default_keep_alive_secs() -> u64 {
    15
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: default_subscriber_buffer(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// How often to log app stats (subscribers, snapshots published, skipped ticks) at INFO level.
    pub stats_log_interval_secs: u64,
}

/// Settings for the stream consumer (`vpsmonit-watch`).
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_client_url")]
    pub url: String,
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_client_url() -> String {
    "http://127.0.0.1:3000/realtime".into()
}

fn default_reconnect_initial_ms() -> u64 {
    250
}

fn default_reconnect_max_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_client_url(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Only the `[client]` table; other sections are ignored.
#[derive(Deserialize)]
struct ClientFile {
    #[serde(default)]
    client: ClientConfig,
}

impl ClientConfig {
    /// Reads `[client]` from the config file, so a viewer-only file needs no server sections.
    pub fn load() -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(config_path())?;
        Self::load_from_str(&s)
    }

    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let file: ClientFile = toml::from_str(s)?;
        file.client.validate()?;
        Ok(file.client)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.url.starts_with("http://") || self.url.starts_with("https://"),
            "client.url must be an http(s) URL, got {}",
            self.url
        );
        anyhow::ensure!(
            self.reconnect_initial_ms > 0,
            "client.reconnect_initial_ms must be > 0, got {}",
            self.reconnect_initial_ms
        );
        anyhow::ensure!(
            self.reconnect_max_ms >= self.reconnect_initial_ms,
            "client.reconnect_max_ms must be >= reconnect_initial_ms, got {}",
            self.reconnect_max_ms
        );
        anyhow::ensure!(
            self.connect_timeout_ms > 0,
            "client.connect_timeout_ms must be > 0, got {}",
            self.connect_timeout_ms
        );
        Ok(())
    }
}

fn config_path() -> String {
    std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into())
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(config_path())?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(!self.server.host.is_empty(), "server.host must be non-empty");
        anyhow::ensure!(
            self.aggregator.tick_interval_ms > 0,
            "aggregator.tick_interval_ms must be > 0, got {}",
            self.aggregator.tick_interval_ms
        );
        anyhow::ensure!(
            self.aggregator.source_timeout_ms() > 0,
            "aggregator.source_timeout_ms must be > 0, got {}",
            self.aggregator.source_timeout_ms()
        );
        anyhow::ensure!(
            self.broadcast.subscriber_buffer > 0,
            "broadcast.subscriber_buffer must be > 0, got {}",
            self.broadcast.subscriber_buffer
        );
        anyhow::ensure!(
            self.broadcast.keep_alive_secs > 0,
            "broadcast.keep_alive_secs must be > 0, got {}",
            self.broadcast.keep_alive_secs
        );
        anyhow::ensure!(
            self.monitoring.stats_log_interval_secs > 0,
            "monitoring.stats_log_interval_secs must be > 0, got {}",
            self.monitoring.stats_log_interval_secs
        );
        self.client.validate()?;
        Ok(())
    }
}
