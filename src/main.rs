mod auth;
mod calc;
mod config;
mod db;
mod ipc;
mod membership;

use std::io::{self, BufRead, Write};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(default_filter: &str) {
    // stdout carries the protocol; logs go to stderr.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let config = config::Config::load();
    init_logging(&config.log_filter);

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
        tokens: ipc::TokenSettings {
            secret: config.token_secret,
            ttl_minutes: config.token_ttl_minutes,
        },
    };

    if let Some(path) = config.workspace {
        match db::open_db(&path) {
            Ok(conn) => {
                info!(workspace = %path.to_string_lossy(), "workspace opened from environment");
                state.workspace = Some(path);
                state.db = Some(conn);
            }
            Err(e) => error!(
                workspace = %path.to_string_lossy(),
                error = %format!("{e:#}"),
                "failed to open workspace"
            ),
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "academated ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    info!("stdin closed, shutting down");
}
