use crate::auth::{self, Claims};
use crate::db;
use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::helpers::{authenticate, db_conn, find_user_by_id, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use chrono::{Duration, Utc};
use rusqlite::OptionalExtension;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

fn valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .map(|(host, tld)| !host.is_empty() && !tld.is_empty())
            .unwrap_or(false)
}

fn handle_signup(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let username = required_str(&req.params, "username")?;
    let full_name = required_str(&req.params, "fullName")?;
    let email = required_str(&req.params, "email")?.to_ascii_lowercase();
    let institution = optional_str(&req.params, "institution")?;
    let password = req
        .params
        .get("password")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_params("missing password"))?;
    if !valid_email(&email) {
        return Err(ApiError::bad_params("email is not a valid address"));
    }

    let email_taken: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE email = ?", [&email], |r| r.get(0))
        .optional()?;
    if email_taken.is_some() {
        return Err(ApiError::Conflict("Email already registered.".into()));
    }
    let username_taken: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE username = ?", [&username], |r| {
            r.get(0)
        })
        .optional()?;
    if username_taken.is_some() {
        return Err(ApiError::Conflict("Username already taken.".into()));
    }

    let user_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users(id, username, email, full_name, institution, password_hash, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &user_id,
            &username,
            &email,
            &full_name,
            &institution,
            auth::hash_password(password),
            db::now_rfc3339(),
        ),
    )?;
    info!(user_id = %user_id, "account created");

    let user = find_user_by_id(conn, &user_id)?
        .ok_or_else(|| ApiError::not_found("User not found."))?;
    Ok(user.to_json())
}

fn handle_login(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let email = required_str(&req.params, "email")?.to_ascii_lowercase();
    let password = req
        .params
        .get("password")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiError::bad_params("missing password"))?;

    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT id, password_hash FROM users WHERE email = ?",
            [&email],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let invalid = || ApiError::Unauthorized("Invalid email or password.".into());
    let Some((user_id, password_hash)) = row else {
        warn!("login rejected: unknown email");
        return Err(invalid());
    };
    if !auth::verify_password(password, &password_hash) {
        warn!(user_id = %user_id, "login rejected: bad password");
        return Err(invalid());
    }

    let user = find_user_by_id(conn, &user_id)?
        .ok_or_else(|| ApiError::not_found("User not found."))?;
    let expires_at = Utc::now() + Duration::minutes(state.tokens.ttl_minutes);
    let claims = Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        exp: expires_at.timestamp(),
    };
    let access_token = auth::issue_token(&claims, &state.tokens.secret)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;

    Ok(json!({
        "accessToken": access_token,
        "tokenType": "bearer",
        "expiresAt": expires_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        "user": user.to_json(),
    }))
}

fn handle_me(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    Ok(user.to_json())
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "auth.signup" => handle_signup(state, req),
        "auth.login" => handle_login(state, req),
        "auth.me" => handle_me(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
