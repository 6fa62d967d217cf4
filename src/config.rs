// src/config.rs
use crate::domain::errors::{AppError, AppResult};
use dotenv::dotenv;
use std::env;
use std::fs::File;
use std::str::FromStr;
use std::time::Duration;

/// Money flow service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Data, cache and metrics configuration
    pub data: DataConfig,

    /// Background job configuration
    pub schedule: ScheduleConfig,

    /// External data provider configuration
    pub providers: ProviderConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Prefix of the data routes (e.g., "/api")
    pub api_prefix: String,

    /// Origins allowed to call the API from a browser
    pub cors_origins: Vec<String>,
}

/// Data, cache and metrics configuration
#[derive(Debug, Clone)]
pub struct DataConfig {
    /// Directory holding the database and refresh bookkeeping files
    pub data_dir: String,

    /// Default cache TTL in seconds
    pub cache_ttl_secs: u64,

    /// TTL of cached global flow responses in seconds
    pub global_flow_cache_ttl_secs: u64,

    /// Days of history fetched on each refresh
    pub historical_days: usize,

    /// Trailing window for rolling correlation and volatility
    pub correlation_window: usize,

    /// Seed of the mock data generator
    pub pipeline_seed: u64,
}

/// Background job configuration
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Local hour of the daily refresh
    pub refresh_hour: u32,

    /// Seconds between expired cache sweeps
    pub cache_sweep_secs: u64,

    /// Run a refresh at startup when nothing has been persisted yet
    pub refresh_on_startup: bool,
}

/// External data provider configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Alpha Vantage key; prices are simulated without it
    pub alpha_vantage_api_key: Option<String>,

    /// FRED key; US yields are simulated without it
    pub fred_api_key: Option<String>,

    pub request_timeout_secs: u64,
    pub max_retries: u32,

    /// Pause between consecutive provider calls in milliseconds
    pub call_delay_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,

    /// Log to file
    pub to_file: bool,

    /// Log file path
    pub file_path: Option<String>,
}

/// Parse an environment variable, keeping `default` when absent or invalid
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Invalid value '{}' for {}, using default", raw, key);
            default
        }),
        Err(_) => default,
    }
}

/// Non-empty environment variable
fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn default_cors_origins() -> Vec<String> {
    [
        "http://localhost:5173",
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:5173",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        // Load .env file if it exists
        dotenv().ok();
        let defaults = Config::default();

        let cors_origins = env_opt("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.server.cors_origins);

        let server_config = ServerConfig {
            host: env_opt("SERVER_HOST").unwrap_or(defaults.server.host),
            port: env_or("SERVER_PORT", defaults.server.port),
            api_prefix: env_opt("API_PREFIX").unwrap_or(defaults.server.api_prefix),
            cors_origins,
        };

        let data_config = DataConfig {
            data_dir: env_opt("DATA_DIR").unwrap_or(defaults.data.data_dir),
            cache_ttl_secs: env_or("CACHE_TTL_SECS", defaults.data.cache_ttl_secs),
            global_flow_cache_ttl_secs: env_or("GLOBAL_FLOW_CACHE_TTL_SECS", defaults.data.global_flow_cache_ttl_secs),
            historical_days: env_or("HISTORICAL_DAYS", defaults.data.historical_days),
            correlation_window: env_or("CORRELATION_WINDOW", defaults.data.correlation_window),
            pipeline_seed: env_or("PIPELINE_SEED", defaults.data.pipeline_seed),
        };

        let schedule_config = ScheduleConfig {
            refresh_hour: env_or("REFRESH_HOUR", defaults.schedule.refresh_hour).min(23),
            cache_sweep_secs: env_or("CACHE_SWEEP_SECS", defaults.schedule.cache_sweep_secs).max(1),
            refresh_on_startup: env_or("REFRESH_ON_STARTUP", defaults.schedule.refresh_on_startup),
        };

        let provider_config = ProviderConfig {
            alpha_vantage_api_key: env_opt("ALPHA_VANTAGE_API_KEY"),
            fred_api_key: env_opt("FRED_API_KEY"),
            request_timeout_secs: env_or("API_REQUEST_TIMEOUT_SECS", defaults.providers.request_timeout_secs),
            max_retries: env_or("API_MAX_RETRIES", defaults.providers.max_retries),
            call_delay_ms: env_or("API_CALL_DELAY_MS", defaults.providers.call_delay_ms),
        };

        let logging_config = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            to_file: env::var("LOG_TO_FILE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            file_path: env::var("LOG_FILE_PATH").ok(),
        };

        Ok(Config {
            server: server_config,
            data: data_config,
            schedule: schedule_config,
            providers: provider_config,
            logging: logging_config,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.data.cache_ttl_secs)
    }

    pub fn global_flow_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.data.global_flow_cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.providers.request_timeout_secs)
    }

    pub fn call_delay(&self) -> Duration {
        Duration::from_millis(self.providers.call_delay_ms)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.cache_sweep_secs)
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> AppResult<()> {
        let mut builder = env_logger::Builder::new();

        // Set log level
        let log_level = match self.logging.level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            _ => log::LevelFilter::Info,
        };

        builder.filter_level(log_level);

        // Configure output
        if self.logging.to_file {
            if let Some(file_path) = &self.logging.file_path {
                let file = File::create(file_path).map_err(|e| {
                    AppError::Config(format!("Failed to create log file: {}", e))
                })?;

                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
        }

        // Initialize the logger
        builder.try_init().map_err(|e| {
            AppError::Config(format!("Failed to initialize logger: {}", e))
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8001,
                api_prefix: "/api".to_string(),
                cors_origins: default_cors_origins(),
            },
            data: DataConfig {
                data_dir: "data".to_string(),
                cache_ttl_secs: 300,
                global_flow_cache_ttl_secs: 86_400,
                historical_days: 90,
                correlation_window: 30,
                pipeline_seed: 42,
            },
            schedule: ScheduleConfig {
                refresh_hour: 17,
                cache_sweep_secs: 3600,
                refresh_on_startup: false,
            },
            providers: ProviderConfig {
                alpha_vantage_api_key: None,
                fred_api_key: None,
                request_timeout_secs: 30,
                max_retries: 3,
                call_delay_ms: 200,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                to_file: false,
                file_path: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.bind_address(), "127.0.0.1:8001");
        assert_eq!(config.global_flow_cache_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.schedule.refresh_hour, 17);
        assert_eq!(config.call_delay(), Duration::from_millis(200));
        assert!(config.server.cors_origins.contains(&"http://localhost:5173".to_string()));
    }

    #[test]
    fn invalid_numbers_fall_back_to_default() {
        env::set_var("MONEY_FLOW_TEST_PORT", "not-a-port");
        assert_eq!(env_or("MONEY_FLOW_TEST_PORT", 8001u16), 8001);
        env::set_var("MONEY_FLOW_TEST_PORT", " 9000 ");
        assert_eq!(env_or("MONEY_FLOW_TEST_PORT", 8001u16), 9000);
        env::remove_var("MONEY_FLOW_TEST_PORT");
    }
}
