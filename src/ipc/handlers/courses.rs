use crate::db;
use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::helpers::{authenticate, db_conn, optional_str, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn course_json(
    id: &str,
    name: &str,
    code: &str,
    credits: i64,
    difficulty: &str,
    instructor: Option<&str>,
) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "code": code,
        "credits": credits,
        "difficulty": difficulty,
        "instructor": instructor,
    })
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;

    let name = required_str(&req.params, "name")?;
    let code = required_str(&req.params, "code")?;
    let credits = required_i64(&req.params, "credits")?;
    if credits < 0 {
        return Err(ApiError::bad_params("credits must not be negative"));
    }
    let difficulty = required_str(&req.params, "difficulty")?;
    let instructor = optional_str(&req.params, "instructor")?;

    let course_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO courses(id, user_id, name, code, credits, difficulty, instructor, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &course_id,
            &user.id,
            &name,
            &code,
            credits,
            &difficulty,
            &instructor,
            db::now_rfc3339(),
        ),
    )?;

    Ok(course_json(
        &course_id,
        &name,
        &code,
        credits,
        &difficulty,
        instructor.as_deref(),
    ))
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;

    let mut stmt = conn.prepare(
        "SELECT id, name, code, credits, difficulty, instructor
         FROM courses
         WHERE user_id = ?
         ORDER BY created_at, rowid",
    )?;
    let courses = stmt
        .query_map([&user.id], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let code: String = r.get(2)?;
            let credits: i64 = r.get(3)?;
            let difficulty: String = r.get(4)?;
            let instructor: Option<String> = r.get(5)?;
            Ok(course_json(
                &id,
                &name,
                &code,
                credits,
                &difficulty,
                instructor.as_deref(),
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "courses": courses }))
}

fn handle_courses_delete(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let course_id = required_str(&req.params, "courseId")?;

    let deleted = conn.execute(
        "DELETE FROM courses WHERE id = ? AND user_id = ?",
        (&course_id, &user.id),
    )?;
    if deleted == 0 {
        return Err(ApiError::not_found("Course not found"));
    }
    Ok(json!({ "message": "Course deleted" }))
}

fn handle_courses_count(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM courses WHERE user_id = ?",
        [&user.id],
        |r| r.get(0),
    )?;
    Ok(json!({ "total": total }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "courses.create" => handle_courses_create(state, req),
        "courses.list" => handle_courses_list(state, req),
        "courses.delete" => handle_courses_delete(state, req),
        "courses.count" => handle_courses_count(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
