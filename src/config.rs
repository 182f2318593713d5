use anyhow::{anyhow, Context};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub store_timeout: Duration,
    pub max_body_bytes: usize,
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind = lookup("ATTENDANCED_BIND").unwrap_or_else(|| "0.0.0.0:5000".to_string());
        let bind_addr = bind
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid ATTENDANCED_BIND {bind}"))?;
        let db_path = PathBuf::from(
            lookup("ATTENDANCED_DB_PATH").unwrap_or_else(|| "attendance.sqlite3".to_string()),
        );
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow!("JWT_SECRET must be set"))?;

        Ok(Self {
            bind_addr,
            db_path,
            jwt_secret,
            store_timeout: Duration::from_millis(env_u64(
                &lookup,
                "ATTENDANCED_STORE_TIMEOUT_MS",
                2000,
            )),
            max_body_bytes: env_u64(&lookup, "ATTENDANCED_MAX_BODY_BYTES", 64 * 1024) as usize,
            log_json: env_bool(&lookup, "ATTENDANCED_LOG_JSON", false),
        })
    }
}

fn env_bool<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str, default: bool) -> bool {
    lookup(name)
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_u64<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str, default: u64) -> u64 {
    lookup(name)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
