use crate::auth::user_initials;
use crate::db;
use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::helpers::{
    authenticate, db_conn, load_group_access, optional_i64, require_view, required_str,
    touch_group,
};
use crate::ipc::types::{AppState, Request};
use crate::membership::check_contribute;
use serde_json::json;
use uuid::Uuid;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

fn handle_discussions_create(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let group_id = required_str(&req.params, "groupId")?;
    let content = required_str(&req.params, "content")?;

    let group = load_group_access(conn, &group_id)?;
    check_contribute(&group, &user.id)
        .map_err(|_| ApiError::Forbidden("Must be a group member to post messages".into()))?;

    let tx = conn.unchecked_transaction()?;
    // seq gives a total order even when two messages share a timestamp.
    let seq: i64 = tx.query_row(
        "SELECT COALESCE(MAX(seq), 0) + 1 FROM discussion_messages WHERE group_id = ?",
        [&group_id],
        |r| r.get(0),
    )?;
    let message_id = Uuid::new_v4().to_string();
    let user_name = user.display_name().to_string();
    let initials = user_initials(&user.full_name);
    let created_at = db::now_rfc3339();
    tx.execute(
        "INSERT INTO discussion_messages(
            id, group_id, user_id, user_name, user_initials, content, created_at, seq
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &message_id,
            &group_id,
            &user.id,
            &user_name,
            &initials,
            &content,
            &created_at,
            seq,
        ),
    )?;
    touch_group(&tx, &group_id)?;
    tx.commit()?;

    Ok(json!({
        "id": message_id,
        "groupId": group_id,
        "userId": user.id,
        "userName": user_name,
        "userInitials": initials,
        "content": content,
        "createdAt": created_at,
    }))
}

fn handle_discussions_list(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let group_id = required_str(&req.params, "groupId")?;
    let limit = optional_i64(&req.params, "limit")?
        .unwrap_or(DEFAULT_LIMIT)
        .clamp(1, MAX_LIMIT);

    let group = load_group_access(conn, &group_id)?;
    require_view(&group, &user)?;

    // Newest `limit` messages, handed back oldest first.
    let mut stmt = conn.prepare(
        "SELECT id, user_id, user_name, user_initials, content, created_at
         FROM discussion_messages
         WHERE group_id = ?
         ORDER BY seq DESC
         LIMIT ?",
    )?;
    let mut messages = stmt
        .query_map((&group_id, limit), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "groupId": group_id,
                "userId": r.get::<_, String>(1)?,
                "userName": r.get::<_, String>(2)?,
                "userInitials": r.get::<_, String>(3)?,
                "content": r.get::<_, String>(4)?,
                "createdAt": r.get::<_, String>(5)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    messages.reverse();
    Ok(json!({ "messages": messages }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "discussions.create" => handle_discussions_create(state, req),
        "discussions.list" => handle_discussions_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
