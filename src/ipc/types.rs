use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Bearer token from `auth.login`; absent for the public methods.
    #[serde(default)]
    pub token: Option<String>,
}

pub struct TokenSettings {
    pub secret: Vec<u8>,
    pub ttl_minutes: i64,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub tokens: TokenSettings,
}
