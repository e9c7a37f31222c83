use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_QUEUE_MAX: usize = 2000;
const DEFAULT_BATCH_SIZE: usize = 50;
const DEFAULT_FLUSH_MS: u64 = 500;
const DEFAULT_MAX_SEQ_CACHE: usize = 5000;

// The flush interval is also the consumer's wait timeout; keep it sane.
const MIN_FLUSH_MS: u64 = 50;

/// Service configuration, loaded from environment variables (a `.env` file
/// is honored). `DATABASE_URL` is required; everything else has defaults.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub database_url: String,
    pub queue_max: usize,
    pub batch_size: usize,
    pub flush_ms: u64,
    pub max_seq_cache: usize,
    pub debug: bool,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load environment variables
        dotenv::dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").map_err(|_| "DATABASE_URL environment variable not set")?;

        let config = ServiceConfig {
            database_url,
            queue_max: parse_env("QUEUE_MAX", DEFAULT_QUEUE_MAX)?,
            batch_size: parse_env("BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            flush_ms: parse_env("FLUSH_MS", DEFAULT_FLUSH_MS)?,
            max_seq_cache: parse_env("MAX_SEQ_CACHE", DEFAULT_MAX_SEQ_CACHE)?,
            debug: env::var("DEBUG")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        };

        config.validate()?;
        Ok(config)
    }

    /// All scalar values must be positive; the flush interval additionally
    /// has a floor so the consumer's wait loop never spins.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.database_url.is_empty() {
            return Err("DATABASE_URL must not be empty".into());
        }
        if self.queue_max == 0 {
            return Err("QUEUE_MAX must be greater than 0".into());
        }
        if self.batch_size == 0 {
            return Err("BATCH_SIZE must be greater than 0".into());
        }
        if self.flush_ms == 0 {
            return Err("FLUSH_MS must be greater than 0".into());
        }
        if self.max_seq_cache == 0 {
            return Err("MAX_SEQ_CACHE must be greater than 0".into());
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_ms.max(MIN_FLUSH_MS))
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T, Box<dyn std::error::Error>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("{} is not a valid value for {}", raw, key).into()),
        Err(_) => Ok(default),
    }
}
