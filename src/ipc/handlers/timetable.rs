use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::helpers::{authenticate, db_conn, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveTime;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};
use tracing::info;
use uuid::Uuid;

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

#[derive(Debug, Clone, PartialEq)]
struct StudyBlock {
    title: String,
    course_code: Option<String>,
    day: &'static str,
    day_index: i64,
    start_time: String,
    end_time: String,
    location: Option<String>,
    color: Option<String>,
    notes: Option<String>,
}

impl StudyBlock {
    fn to_json(&self, id: &str) -> JsonValue {
        json!({
            "id": id,
            "title": self.title,
            "courseCode": self.course_code,
            "day": self.day,
            "startTime": self.start_time,
            "endTime": self.end_time,
            "location": self.location,
            "color": self.color,
            "notes": self.notes,
        })
    }
}

fn parse_day(raw: &str) -> Option<(&'static str, i64)> {
    WEEKDAYS
        .iter()
        .position(|d| d.eq_ignore_ascii_case(raw.trim()))
        .map(|i| (WEEKDAYS[i], i as i64))
}

/// `HH:MM` (seconds tolerated and dropped).
fn parse_clock(raw: &str) -> Option<String> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
        .map(|t| t.format("%H:%M").to_string())
}

fn parse_block(v: &JsonValue) -> Result<StudyBlock, ApiError> {
    if !v.is_object() {
        return Err(ApiError::bad_params("study block must be an object"));
    }
    let title = required_str(v, "title")?;
    let day_raw = required_str(v, "day")?;
    let Some((day, day_index)) = parse_day(&day_raw) else {
        return Err(ApiError::bad_params(format!(
            "day must be a weekday name, got {day_raw:?}"
        )));
    };
    let start_time = parse_clock(&required_str(v, "startTime")?)
        .ok_or_else(|| ApiError::bad_params("startTime must be HH:MM"))?;
    let end_time = parse_clock(&required_str(v, "endTime")?)
        .ok_or_else(|| ApiError::bad_params("endTime must be HH:MM"))?;
    // Zero-padded HH:MM compares correctly as text.
    if start_time >= end_time {
        return Err(ApiError::bad_params("startTime must be before endTime"));
    }
    Ok(StudyBlock {
        title,
        course_code: optional_str(v, "courseCode")?,
        day,
        day_index,
        start_time,
        end_time,
        location: optional_str(v, "location")?,
        color: optional_str(v, "color")?,
        notes: optional_str(v, "notes")?,
    })
}

fn insert_block(conn: &Connection, user_id: &str, block: &StudyBlock) -> rusqlite::Result<String> {
    let block_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO study_blocks(
            id, user_id, title, course_code, day, day_index, start_time, end_time,
            location, color, notes
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &block_id,
            user_id,
            &block.title,
            &block.course_code,
            block.day,
            block.day_index,
            &block.start_time,
            &block.end_time,
            &block.location,
            &block.color,
            &block.notes,
        ),
    )?;
    Ok(block_id)
}

fn handle_blocks_create(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let block = parse_block(&req.params)?;
    let block_id = insert_block(conn, &user.id, &block)?;
    Ok(block.to_json(&block_id))
}

fn handle_blocks_list(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let mut stmt = conn.prepare(
        "SELECT id, title, course_code, day, start_time, end_time, location, color, notes
         FROM study_blocks
         WHERE user_id = ?
         ORDER BY day_index, start_time, rowid",
    )?;
    let blocks = stmt
        .query_map([&user.id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "title": r.get::<_, String>(1)?,
                "courseCode": r.get::<_, Option<String>>(2)?,
                "day": r.get::<_, String>(3)?,
                "startTime": r.get::<_, String>(4)?,
                "endTime": r.get::<_, String>(5)?,
                "location": r.get::<_, Option<String>>(6)?,
                "color": r.get::<_, Option<String>>(7)?,
                "notes": r.get::<_, Option<String>>(8)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "blocks": blocks }))
}

fn handle_blocks_update(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let block_id = required_str(&req.params, "blockId")?;
    let block = parse_block(&req.params)?;

    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM study_blocks WHERE id = ? AND user_id = ?",
            (&block_id, &user.id),
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Err(ApiError::not_found("Study block not found"));
    }

    conn.execute(
        "UPDATE study_blocks
         SET title = ?, course_code = ?, day = ?, day_index = ?, start_time = ?, end_time = ?,
             location = ?, color = ?, notes = ?
         WHERE id = ? AND user_id = ?",
        (
            &block.title,
            &block.course_code,
            block.day,
            block.day_index,
            &block.start_time,
            &block.end_time,
            &block.location,
            &block.color,
            &block.notes,
            &block_id,
            &user.id,
        ),
    )?;
    Ok(block.to_json(&block_id))
}

fn handle_blocks_delete(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let block_id = required_str(&req.params, "blockId")?;
    let deleted = conn.execute(
        "DELETE FROM study_blocks WHERE id = ? AND user_id = ?",
        (&block_id, &user.id),
    )?;
    if deleted == 0 {
        return Err(ApiError::not_found("Study block not found"));
    }
    Ok(json!({ "message": "Study block deleted successfully" }))
}

fn handle_blocks_clear(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let deleted = conn.execute("DELETE FROM study_blocks WHERE user_id = ?", [&user.id])?;
    Ok(json!({
        "message": format!("Deleted {deleted} study blocks"),
        "deleted": deleted,
    }))
}

fn handle_blocks_bulk(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let Some(items) = req.params.get("blocks").and_then(|v| v.as_array()) else {
        return Err(ApiError::bad_params("blocks must be an array"));
    };
    if items.is_empty() {
        return Err(ApiError::bad_params("No blocks provided"));
    }
    // Validate everything before touching the existing schedule.
    let blocks = items
        .iter()
        .enumerate()
        .map(|(i, v)| {
            parse_block(v).map_err(|e| match e {
                ApiError::BadParams(m) => ApiError::BadParams(format!("blocks[{i}]: {m}")),
                other => other,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let tx = conn.unchecked_transaction()?;
    let replaced = tx.execute("DELETE FROM study_blocks WHERE user_id = ?", [&user.id])?;
    let mut created = Vec::with_capacity(blocks.len());
    for block in &blocks {
        let block_id = insert_block(&tx, &user.id, block)?;
        created.push(block.to_json(&block_id));
    }
    tx.commit()?;
    info!(user_id = %user.id, replaced, created = created.len(), "study blocks replaced");
    Ok(json!({ "blocks": created }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "timetable.blocks.create" => handle_blocks_create(state, req),
        "timetable.blocks.list" => handle_blocks_list(state, req),
        "timetable.blocks.update" => handle_blocks_update(state, req),
        "timetable.blocks.delete" => handle_blocks_delete(state, req),
        "timetable.blocks.clear" => handle_blocks_clear(state, req),
        "timetable.blocks.bulk" => handle_blocks_bulk(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_validation() {
        let ok = parse_block(&json!({
            "title": "Calculus",
            "day": "tuesday",
            "startTime": "9:00",
            "endTime": "10:30:00",
        }))
        .expect("valid block");
        assert_eq!(ok.day, "Tuesday");
        assert_eq!(ok.day_index, 1);
        assert_eq!(ok.start_time, "09:00");
        assert_eq!(ok.end_time, "10:30");

        let backwards = parse_block(&json!({
            "title": "Calculus",
            "day": "Monday",
            "startTime": "11:00",
            "endTime": "10:00",
        }));
        assert!(matches!(backwards, Err(ApiError::BadParams(_))));

        let bad_day = parse_block(&json!({
            "title": "Calculus",
            "day": "Funday",
            "startTime": "09:00",
            "endTime": "10:00",
        }));
        assert!(matches!(bad_day, Err(ApiError::BadParams(_))));
    }
}
