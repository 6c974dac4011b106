use rand::RngCore;
use std::{env, fmt::Display, path::PathBuf, str::FromStr};
use tracing::{info, warn};

pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 1440;

pub struct Config {
    pub workspace: Option<PathBuf>,
    pub token_secret: Vec<u8>,
    pub token_ttl_minutes: i64,
    pub log_filter: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            workspace: var("ACADEMATE_WORKSPACE").ok().map(PathBuf::from),
            token_secret: load_secret("ACADEMATE_TOKEN_SECRET"),
            token_ttl_minutes: try_load(
                "ACADEMATE_TOKEN_TTL_MINUTES",
                DEFAULT_TOKEN_TTL_MINUTES,
            )
            .max(1),
            log_filter: var("ACADEMATE_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key)
        .map(|v| v.trim().to_string())
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(())
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Ok(raw) = var(key) else {
        info!("{key} not set, using default: {default}");
        return default;
    };
    match raw.parse() {
        Ok(v) => v,
        Err(e) => {
            warn!("Invalid {key} value ({e}), using default: {default}");
            default
        }
    }
}

fn load_secret(key: &str) -> Vec<u8> {
    match var(key) {
        Ok(s) => s.into_bytes(),
        Err(()) => {
            // Tokens will not survive a restart without a configured secret.
            warn!("{key} not set, generating an ephemeral signing secret");
            let mut buf = vec![0u8; 32];
            rand::thread_rng().fill_bytes(&mut buf);
            buf
        }
    }
}
