use crate::db;
use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn handle_health(state: &mut AppState, _req: &Request) -> ApiResult {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
    }))
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> ApiResult {
    let Some(path) = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
    else {
        return Err(ApiError::bad_params("missing params.path"));
    };

    let conn = db::open_db(&path)?;
    info!(workspace = %path.to_string_lossy(), "workspace opened");
    state.workspace = Some(path.clone());
    state.db = Some(conn);
    Ok(json!({ "workspacePath": path.to_string_lossy() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state, req),
        "workspace.select" => handle_workspace_select(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
