use crate::auth;
use crate::db;
use crate::ipc::error::ApiError;
use crate::ipc::types::{AppState, Request};
use crate::membership::{Denial, GroupAccess};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};
use tracing::warn;

pub fn db_conn(state: &AppState) -> Result<&Connection, ApiError> {
    state.db.as_ref().ok_or(ApiError::NoWorkspace)
}

pub fn required_str(params: &JsonValue, key: &str) -> Result<String, ApiError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_params(format!("missing {}", key)))
}

/// Absent, null and blank strings all read as `None`.
pub fn optional_str(params: &JsonValue, key: &str) -> Result<Option<String>, ApiError> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let s = v
                .as_str()
                .ok_or_else(|| ApiError::bad_params(format!("{} must be string or null", key)))?
                .trim()
                .to_string();
            Ok((!s.is_empty()).then_some(s))
        }
    }
}

pub fn required_i64(params: &JsonValue, key: &str) -> Result<i64, ApiError> {
    match params.get(key) {
        None => Err(ApiError::bad_params(format!("missing {}", key))),
        Some(v) => v
            .as_i64()
            .ok_or_else(|| ApiError::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn optional_i64(params: &JsonValue, key: &str) -> Result<Option<i64>, ApiError> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| ApiError::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn parse_bool(params: &JsonValue, key: &str, default: bool) -> Result<bool, ApiError> {
    match params.get(key) {
        None => Ok(default),
        Some(v) if v.is_null() => Ok(default),
        Some(v) => v
            .as_bool()
            .ok_or_else(|| ApiError::bad_params(format!("{} must be boolean", key))),
    }
}

#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub institution: Option<String>,
}

impl CurrentUser {
    /// Name shown next to messages, uploads and events.
    pub fn display_name(&self) -> &str {
        if self.full_name.trim().is_empty() {
            &self.username
        } else {
            &self.full_name
        }
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "id": self.id,
            "username": self.username,
            "email": self.email,
            "fullName": self.full_name,
            "institution": self.institution,
        })
    }
}

pub fn find_user_by_id(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<CurrentUser>> {
    conn.query_row(
        "SELECT id, username, email, full_name, institution FROM users WHERE id = ?",
        [user_id],
        |r| {
            Ok(CurrentUser {
                id: r.get(0)?,
                username: r.get(1)?,
                email: r.get(2)?,
                full_name: r.get(3)?,
                institution: r.get(4)?,
            })
        },
    )
    .optional()
}

/// Resolves the bearer token on the request to a stored user.
pub fn authenticate(state: &AppState, req: &Request) -> Result<CurrentUser, ApiError> {
    let conn = db_conn(state)?;
    let Some(token) = req.token.as_deref() else {
        return Err(ApiError::Unauthorized("Not authenticated.".into()));
    };
    let now = chrono::Utc::now().timestamp();
    let claims = auth::verify_token(token, &state.tokens.secret, now).map_err(|e| {
        warn!(method = %req.method, reason = ?e.code, "rejected access token");
        ApiError::Unauthorized("Invalid or expired token.".into())
    })?;
    find_user_by_id(conn, &claims.sub)?.ok_or_else(|| ApiError::not_found("User not found."))
}

impl From<Denial> for ApiError {
    fn from(d: Denial) -> Self {
        let message = d.message().to_string();
        match d {
            Denial::InvalidAccessCode | Denial::NotCreator => ApiError::Forbidden(message),
            Denial::AlreadyMember
            | Denial::Full
            | Denial::NotMember
            | Denial::CreatorWithMembers => ApiError::BadRequest(message),
        }
    }
}

pub fn load_group_access(conn: &Connection, group_id: &str) -> Result<GroupAccess, ApiError> {
    let row: Option<(String, bool, i64, Option<String>)> = conn
        .query_row(
            "SELECT creator_id, is_private, max_members, access_code
             FROM study_groups
             WHERE id = ?",
            [group_id],
            |r| Ok((r.get(0)?, r.get::<_, i64>(1)? != 0, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    let Some((creator_id, is_private, max_members, access_code)) = row else {
        return Err(ApiError::not_found("Study group not found"));
    };
    Ok(GroupAccess {
        creator_id,
        is_private,
        max_members,
        access_code,
        members: group_member_ids(conn, group_id)?,
    })
}

pub fn group_member_ids(conn: &Connection, group_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM group_members WHERE group_id = ? ORDER BY joined_at, rowid",
    )?;
    let ids = stmt
        .query_map([group_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Rejects callers who may not read a private group.
pub fn require_view(group: &GroupAccess, user: &CurrentUser) -> Result<(), ApiError> {
    if group.can_view(&user.id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Access denied to private group".into()))
    }
}

pub fn touch_group(conn: &Connection, group_id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE study_groups SET last_activity = ? WHERE id = ?",
        (db::now_rfc3339(), group_id),
    )?;
    Ok(())
}

/// Removes a group and everything hanging off it, children first.
pub fn delete_group_cascade(conn: &Connection, group_id: &str) -> Result<(), ApiError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM group_event_attendees
         WHERE event_id IN (SELECT id FROM group_events WHERE group_id = ?)",
        [group_id],
    )?;
    tx.execute("DELETE FROM group_events WHERE group_id = ?", [group_id])?;
    tx.execute("DELETE FROM group_resources WHERE group_id = ?", [group_id])?;
    tx.execute(
        "DELETE FROM discussion_messages WHERE group_id = ?",
        [group_id],
    )?;
    tx.execute("DELETE FROM group_members WHERE group_id = ?", [group_id])?;
    tx.execute("DELETE FROM study_groups WHERE id = ?", [group_id])?;
    tx.commit()?;
    Ok(())
}
