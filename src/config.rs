use std::time::Duration;

use crate::db::PoolSettings;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub pool: PoolSettings,
    /// Upper bound on every database call made on behalf of a request.
    pub request_timeout: Duration,
    pub health_check_interval: Duration,
    pub cors_allowed_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let defaults = PoolSettings::default();

        let pool = PoolSettings {
            max_connections: env_or("DB_MAX_CONNECTIONS", defaults.max_connections),
            max_idle: env_or("DB_MAX_IDLE", defaults.max_idle),
            max_lifetime: Duration::from_secs(env_or(
                "DB_MAX_LIFETIME_SECS",
                defaults.max_lifetime.as_secs(),
            )),
            connect_timeout: Duration::from_secs(env_or(
                "DB_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout.as_secs(),
            )),
        };

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://localhost:4000".into())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            database_url,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_or("APP_PORT", 8080),
            pool,
            request_timeout: Duration::from_secs(env_or("REQUEST_TIMEOUT_SECS", 5)),
            health_check_interval: Duration::from_secs(env_or("HEALTH_CHECK_INTERVAL_SECS", 10)),
            cors_allowed_origins,
        })
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
