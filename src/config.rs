use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    pub elasticsearch: ElasticsearchConfig,
    pub signals: SignalConfig,
    pub pipeline: PipelineConfig,
    pub alerts: AlertListConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

#[derive(Deserialize, Clone, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

// Keep credentials out of the startup config dump.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub seed_default_rules: bool,
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct ElasticsearchConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub index: String,
    pub ca_cert: Option<String>,
    pub request_timeout_ms: u64,
}

impl std::fmt::Debug for ElasticsearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("index", &self.index)
            .field("ca_cert", &self.ca_cert)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SignalConfig {
    /// Final score at or above which an alert is raised.
    pub alert_threshold: f64,
    /// `large_amount` fires strictly above this amount.
    pub large_amount_threshold: f64,
    pub blacklist: Vec<String>,
}

/// Bounds on each call into an external collaborator.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    pub anomaly_timeout_ms: u64,
    pub rule_store_timeout_ms: u64,
    pub alert_store_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AlertListConfig {
    pub default_limit: usize,
    pub max_limit: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// When set, JSON logs are also appended to `<dir>/backend.log`.
    pub dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            allowed_origins: vec![
                "http://localhost".into(),
                "http://localhost:80".into(),
                "http://frontend".into(),
                "http://frontend:80".into(),
            ],
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/detection_rules.db".into(),
            seed_default_rules: true,
        }
    }
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9200".into(),
            username: None,
            password: None,
            index: "alerts".into(),
            ca_cert: None,
            request_timeout_ms: 5_000,
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            alert_threshold: 0.70,
            large_amount_threshold: 10_000.0,
            blacklist: vec!["BLCKLST001".into(), "BLCKLST002".into()],
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            anomaly_timeout_ms: 2_000,
            rule_store_timeout_ms: 2_000,
            alert_store_timeout_ms: 5_000,
        }
    }
}

impl Default for AlertListConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

impl PipelineConfig {
    pub fn anomaly_timeout(&self) -> Duration {
        Duration::from_millis(self.anomaly_timeout_ms)
    }

    pub fn rule_store_timeout(&self) -> Duration {
        Duration::from_millis(self.rule_store_timeout_ms)
    }

    pub fn alert_store_timeout(&self) -> Duration {
        Duration::from_millis(self.alert_store_timeout_ms)
    }
}

impl AlertListConfig {
    /// Requested limit, or the default, clamped to `1..=max_limit`.
    pub fn resolve(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }
}

impl Config {
    /// Load config from a TOML file. Falls back to defaults if file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("Config file {} not found, using defaults", path.display());
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Config loaded from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Override file settings from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Override settings from `lookup`. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(port) = get("PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(e) => tracing::warn!("Ignoring invalid PORT {port:?}: {e}"),
            }
        }
        if let Some(user) = get("API_USER") {
            self.auth.username = user;
        }
        if let Some(password) = get("API_PASSWORD") {
            self.auth.password = password;
        }
        if let Some(path) = get("DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(url) = get("ELASTICSEARCH_URL") {
            self.elasticsearch.url = url;
        }
        if let Some(user) = get("ELASTICSEARCH_USER") {
            self.elasticsearch.username = Some(user);
        }
        if let Some(password) = get("ELASTICSEARCH_PASSWORD") {
            self.elasticsearch.password = Some(password);
        }
        if let Some(ca) = get("ELASTIC_CA_CERT") {
            self.elasticsearch.ca_cert = Some(ca);
        }
        if let Some(dir) = get("LOG_DIR") {
            self.logging.dir = Some(dir);
        }
    }
}
