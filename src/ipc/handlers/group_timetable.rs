use crate::db;
use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::helpers::{
    authenticate, db_conn, load_group_access, optional_str, require_view, required_str,
    touch_group,
};
use crate::ipc::types::{AppState, Request};
use crate::membership::check_contribute;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use uuid::Uuid;

/// RFC 3339, or a naive ISO datetime/date taken as UTC.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Stored form; fixed width so text ordering matches time ordering.
fn storage_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn required_datetime(params: &JsonValue, key: &str) -> Result<DateTime<Utc>, ApiError> {
    let raw = required_str(params, key)?;
    parse_datetime(&raw)
        .ok_or_else(|| ApiError::bad_params(format!("{key} is not a valid ISO datetime")))
}

fn optional_datetime(params: &JsonValue, key: &str) -> Result<Option<DateTime<Utc>>, ApiError> {
    match optional_str(params, key)? {
        None => Ok(None),
        Some(raw) => parse_datetime(&raw)
            .map(Some)
            .ok_or_else(|| ApiError::bad_params(format!("{key} is not a valid ISO datetime"))),
    }
}

fn event_attendees(conn: &Connection, event_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM group_event_attendees WHERE event_id = ? ORDER BY joined_at, rowid",
    )?;
    let ids = stmt
        .query_map([event_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn handle_events_create(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let group_id = required_str(&req.params, "groupId")?;
    let title = required_str(&req.params, "title")?;
    let description = optional_str(&req.params, "description")?;
    let location = optional_str(&req.params, "location")?;
    let start = required_datetime(&req.params, "startTime")?;
    let end = required_datetime(&req.params, "endTime")?;
    if end <= start {
        return Err(ApiError::bad_params("endTime must be after startTime"));
    }

    let group = load_group_access(conn, &group_id)?;
    check_contribute(&group, &user.id)
        .map_err(|_| ApiError::Forbidden("Must be a group member to create events".into()))?;

    let event_id = Uuid::new_v4().to_string();
    let created_at = db::now_rfc3339();
    let creator_name = user.display_name().to_string();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO group_events(
            id, group_id, title, description, location, start_time, end_time,
            created_by, creator_name, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &event_id,
            &group_id,
            &title,
            &description,
            &location,
            storage_ts(&start),
            storage_ts(&end),
            &user.id,
            &creator_name,
            &created_at,
        ),
    )?;
    // The creator attends by default.
    tx.execute(
        "INSERT INTO group_event_attendees(event_id, user_id, joined_at) VALUES(?, ?, ?)",
        (&event_id, &user.id, &created_at),
    )?;
    touch_group(&tx, &group_id)?;
    tx.commit()?;

    Ok(json!({
        "id": event_id,
        "groupId": group_id,
        "title": title,
        "description": description,
        "location": location,
        "startTime": storage_ts(&start),
        "endTime": storage_ts(&end),
        "createdBy": user.id,
        "creatorName": creator_name,
        "createdAt": created_at,
        "attendees": [user.id],
        "attendeeCount": 1,
    }))
}

fn handle_events_list(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let group_id = required_str(&req.params, "groupId")?;
    let start_date = optional_datetime(&req.params, "startDate")?;
    let end_date = optional_datetime(&req.params, "endDate")?;

    let group = load_group_access(conn, &group_id)?;
    require_view(&group, &user)?;

    let mut where_parts = vec!["group_id = ?".to_string()];
    let mut bind_values: Vec<Value> = vec![Value::Text(group_id.clone())];
    if let Some(s) = &start_date {
        where_parts.push("start_time >= ?".into());
        bind_values.push(Value::Text(storage_ts(s)));
    }
    if let Some(e) = &end_date {
        where_parts.push("start_time <= ?".into());
        bind_values.push(Value::Text(storage_ts(e)));
    }
    let sql = format!(
        "SELECT id, title, description, location, start_time, end_time,
                created_by, creator_name, created_at
         FROM group_events
         WHERE {}
         ORDER BY start_time, rowid",
        where_parts.join(" AND ")
    );

    let mut attendees_by_event: HashMap<String, Vec<String>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT a.event_id, a.user_id
             FROM group_event_attendees a
             JOIN group_events e ON e.id = a.event_id
             WHERE e.group_id = ?
             ORDER BY a.joined_at, a.rowid",
        )?;
        let rows = stmt.query_map([&group_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (event_id, user_id) = row?;
            attendees_by_event.entry(event_id).or_default().push(user_id);
        }
    }

    let mut stmt = conn.prepare(&sql)?;
    let events = stmt
        .query_map(params_from_iter(bind_values.iter()), |r| {
            let id: String = r.get(0)?;
            let attendees = attendees_by_event.get(&id).cloned().unwrap_or_default();
            Ok(json!({
                "id": id,
                "groupId": group_id,
                "title": r.get::<_, String>(1)?,
                "description": r.get::<_, Option<String>>(2)?,
                "location": r.get::<_, Option<String>>(3)?,
                "startTime": r.get::<_, String>(4)?,
                "endTime": r.get::<_, String>(5)?,
                "createdBy": r.get::<_, String>(6)?,
                "creatorName": r.get::<_, String>(7)?,
                "createdAt": r.get::<_, String>(8)?,
                "attendeeCount": attendees.len(),
                "attendees": attendees,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "events": events }))
}

fn handle_events_attend(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let group_id = required_str(&req.params, "groupId")?;
    let event_id = required_str(&req.params, "eventId")?;

    let group = load_group_access(conn, &group_id)?;
    check_contribute(&group, &user.id)
        .map_err(|_| ApiError::Forbidden("Must be a group member to attend events".into()))?;

    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM group_events WHERE id = ? AND group_id = ?",
            (&event_id, &group_id),
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Err(ApiError::not_found("Event not found"));
    }

    let tx = conn.unchecked_transaction()?;
    let inserted = tx.execute(
        "INSERT OR IGNORE INTO group_event_attendees(event_id, user_id, joined_at) VALUES(?, ?, ?)",
        (&event_id, &user.id, db::now_rfc3339()),
    )?;
    if inserted == 1 {
        touch_group(&tx, &group_id)?;
    }
    tx.commit()?;
    let attendee_count = event_attendees(conn, &event_id)?.len();
    if inserted == 0 {
        return Ok(json!({
            "message": "Already marked as attending",
            "alreadyAttending": true,
            "attendeeCount": attendee_count,
        }));
    }
    Ok(json!({
        "message": "Successfully marked as attending",
        "alreadyAttending": false,
        "attendeeCount": attendee_count,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "groupTimetable.create" => handle_events_create(state, req),
        "groupTimetable.list" => handle_events_list(state, req),
        "groupTimetable.attend" => handle_events_attend(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
