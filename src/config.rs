use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::{info, warn};

const DEFAULT_JWT_SECRET: &str = "change-me-recipe-api-secret";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub data_dir: String,
    pub media_root: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Read `RECIPE_*` variables; call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Self {
        let jwt_secret = env::var("RECIPE_JWT_SECRET").unwrap_or_else(|_| {
            warn!("RECIPE_JWT_SECRET not set, using the built-in development secret");
            DEFAULT_JWT_SECRET.to_string()
        });
        Self {
            bind_addr: try_load("RECIPE_BIND_ADDR", "0.0.0.0:8000".to_string()),
            data_dir: try_load("RECIPE_DATA_DIR", "recipe_data".to_string()),
            media_root: try_load("RECIPE_MEDIA_ROOT", "media".to_string()).into(),
            jwt_secret,
            token_ttl_secs: try_load("RECIPE_TOKEN_TTL_SECS", 86_400),
            max_upload_bytes: try_load("RECIPE_MAX_UPLOAD_BYTES", 5 * 1024 * 1024),
        }
    }

    /// Settings for tests: temp media root, short-lived tokens.
    pub fn for_tests(media_root: PathBuf) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            data_dir: String::new(),
            media_root,
            jwt_secret: "test-secret".to_string(),
            token_ttl_secs: 600,
            max_upload_bytes: 1024 * 1024,
        }
    }
}

/// Log directory, read before the subscriber exists so nothing is logged here.
pub fn log_dir() -> String {
    env::var("RECIPE_LOG_DIR").unwrap_or_else(|_| "logs".to_string())
}

fn try_load<T: FromStr + Display>(key: &str, default: T) -> T
where
    T::Err: Display,
{
    let Ok(raw) = env::var(key) else {
        info!("{key} not set, using default: {default}");
        return default;
    };
    match raw.parse() {
        Ok(value) => value,
        Err(e) => {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_load_falls_back_on_invalid_value() {
        env::set_var("RECIPE_TEST_BAD_NUMBER", "not-a-number");
        let value: u64 = try_load("RECIPE_TEST_BAD_NUMBER", 12);
        assert_eq!(value, 12);
        env::remove_var("RECIPE_TEST_BAD_NUMBER");
    }

    #[test]
    fn test_try_load_reads_value() {
        env::set_var("RECIPE_TEST_GOOD_NUMBER", "34");
        let value: u64 = try_load("RECIPE_TEST_GOOD_NUMBER", 12);
        assert_eq!(value, 34);
        env::remove_var("RECIPE_TEST_GOOD_NUMBER");
    }
}
