use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the functions service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Outbound HTTP configuration
    #[serde(default)]
    pub http: HttpConfig,
    /// Instagram extraction configuration
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// S3 configuration
    pub s3: S3Config,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Auth endpoint configuration
    pub auth: AuthConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// API configuration for the function endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
}

/// Outbound HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// User agent sent when scraping arbitrary pages for metadata
    #[serde(default = "default_scraper_user_agent")]
    pub scraper_user_agent: String,
    /// Browser-like user agent sent to Instagram
    #[serde(default = "default_browser_user_agent")]
    pub browser_user_agent: String,
    /// Instagram oEmbed endpoint
    #[serde(default = "default_oembed_endpoint")]
    pub oembed_endpoint: String,
}

/// Instagram image extraction configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// Pause between consecutive image downloads in milliseconds
    #[serde(default = "default_download_delay_ms")]
    pub download_delay_ms: u64,
}

/// S3 storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// S3 bucket name for gallery images
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Public base URL objects are served from.
    /// Defaults to the virtual-hosted S3 URL of the bucket.
    pub public_base_url: Option<String>,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Auth endpoint used to resolve bearer credentials to users
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the auth API, e.g. `https://project.supabase.co/auth/v1`
    pub url: String,
    /// Public API key sent alongside the user credential
    pub api_key: Option<String>,
}

// Default value functions
fn default_service_name() -> String {
    "linkkeeper-functions".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_scraper_user_agent() -> String {
    "Mozilla/5.0 (compatible; LinkKeeper/1.0; +https://linkkeeper.app)".to_string()
}

fn default_browser_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_oembed_endpoint() -> String {
    "https://api.instagram.com/oembed/".to_string()
}

fn default_download_delay_ms() -> u64 {
    3000
}

fn default_bucket() -> String {
    "gallery-images".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .set_default("service.name", default_service_name())?
            .set_default("service.log_level", default_log_level())?
            .add_source(config::File::with_name("config/functions").required(false))
            .add_source(config::File::with_name("/etc/linkkeeper/functions").required(false))
            // FUNCTIONS__S3__BUCKET -> s3.bucket
            .add_source(
                config::Environment::with_prefix("FUNCTIONS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Get outbound HTTP timeout as Duration
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    /// Get the pause between image downloads as Duration
    pub fn download_delay(&self) -> Duration {
        Duration::from_millis(self.extraction.download_delay_ms)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            scraper_user_agent: default_scraper_user_agent(),
            browser_user_agent: default_browser_user_agent(),
            oembed_endpoint: default_oembed_endpoint(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            download_delay_ms: default_download_delay_ms(),
        }
    }
}

impl S3Config {
    /// Base URL that object keys are appended to for public access
    pub fn public_base(&self) -> String {
        match &self.public_base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!(
                "https://{}.s3.{}.amazonaws.com",
                self.bucket, self.region
            ),
        }
    }
}
