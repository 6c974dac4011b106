use crate::calc::{self, GradedCourse};
use crate::db;
use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::helpers::{authenticate, db_conn, optional_str, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use uuid::Uuid;

const MAX_COURSE_UNIT: i64 = 1000;

struct CourseInput {
    name: String,
    code: String,
    grade: String,
    unit: i64,
    difficulty: Option<String>,
    instructor: Option<String>,
}

fn parse_course_input(v: &JsonValue) -> Result<CourseInput, ApiError> {
    if !v.is_object() {
        return Err(ApiError::bad_params("course must be an object"));
    }
    let unit = required_i64(v, "unit")?;
    if !(1..=MAX_COURSE_UNIT).contains(&unit) {
        return Err(ApiError::bad_params(format!(
            "unit must be between 1 and {MAX_COURSE_UNIT}"
        )));
    }
    Ok(CourseInput {
        name: required_str(v, "name")?,
        code: required_str(v, "code")?,
        grade: required_str(v, "grade")?.to_ascii_uppercase(),
        unit,
        difficulty: optional_str(v, "difficulty")?,
        instructor: optional_str(v, "instructor")?,
    })
}

fn insert_course(
    conn: &Connection,
    semester_id: &str,
    user_id: &str,
    course: &CourseInput,
) -> rusqlite::Result<JsonValue> {
    let sort_order: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM semester_courses WHERE semester_id = ?",
        [semester_id],
        |r| r.get(0),
    )?;
    let course_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO semester_courses(
            id, semester_id, user_id, name, code, grade, unit, difficulty, instructor, sort_order
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &course_id,
            semester_id,
            user_id,
            &course.name,
            &course.code,
            &course.grade,
            course.unit,
            &course.difficulty,
            &course.instructor,
            sort_order,
        ),
    )?;
    Ok(json!({
        "id": course_id,
        "semesterId": semester_id,
        "name": course.name,
        "code": course.code,
        "grade": course.grade,
        "unit": course.unit,
        "difficulty": course.difficulty,
        "instructor": course.instructor,
    }))
}

fn course_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<(String, JsonValue)> {
    let semester_id: String = r.get(1)?;
    let json = json!({
        "id": r.get::<_, String>(0)?,
        "semesterId": semester_id,
        "name": r.get::<_, String>(2)?,
        "code": r.get::<_, String>(3)?,
        "grade": r.get::<_, String>(4)?,
        "unit": r.get::<_, i64>(5)?,
        "difficulty": r.get::<_, Option<String>>(6)?,
        "instructor": r.get::<_, Option<String>>(7)?,
    });
    Ok((semester_id, json))
}

/// Semesters with their courses, in creation order. GPA figures come from
/// the same loader `semesters.cgpa` uses.
fn load_semesters(conn: &Connection, user_id: &str) -> rusqlite::Result<Vec<JsonValue>> {
    let graded = calc::load_user_semesters(conn, user_id)?;

    let mut course_stmt = conn.prepare(
        "SELECT id, semester_id, name, code, grade, unit, difficulty, instructor
         FROM semester_courses
         WHERE user_id = ?
         ORDER BY sort_order",
    )?;
    let mut courses_by_semester: HashMap<String, Vec<JsonValue>> = HashMap::new();
    for row in course_stmt.query_map([user_id], course_json)? {
        let (semester_id, json) = row?;
        courses_by_semester.entry(semester_id).or_default().push(json);
    }

    let mut created_stmt =
        conn.prepare("SELECT id, created_at FROM semesters WHERE user_id = ?")?;
    let mut created_at = created_stmt
        .query_map([user_id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<Result<HashMap<_, _>, _>>()?;

    Ok(graded
        .into_iter()
        .map(|s| {
            let totals = calc::totals(&s.courses);
            let courses = courses_by_semester
                .remove(&s.semester_id)
                .unwrap_or_default();
            json!({
                "id": s.semester_id,
                "name": s.name,
                "createdAt": created_at.remove(&s.semester_id),
                "courses": courses,
                "gpa": calc::round_2_decimals(totals.average()),
                "totalUnits": totals.units,
            })
        })
        .collect())
}

fn owned_semester_exists(
    conn: &Connection,
    semester_id: &str,
    user_id: &str,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM semesters WHERE id = ? AND user_id = ?",
        (semester_id, user_id),
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
}

fn handle_semesters_create(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let name = required_str(&req.params, "name")?;
    let courses = match req.params.get("courses") {
        None => Vec::new(),
        Some(v) if v.is_null() => Vec::new(),
        Some(JsonValue::Array(items)) => items
            .iter()
            .map(parse_course_input)
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(ApiError::bad_params("courses must be an array")),
    };

    let tx = conn.unchecked_transaction()?;
    let sort_order: i64 = tx.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM semesters WHERE user_id = ?",
        [&user.id],
        |r| r.get(0),
    )?;
    let semester_id = Uuid::new_v4().to_string();
    let created_at = db::now_rfc3339();
    tx.execute(
        "INSERT INTO semesters(id, user_id, name, sort_order, created_at) VALUES(?, ?, ?, ?, ?)",
        (&semester_id, &user.id, &name, sort_order, &created_at),
    )?;
    let mut created = Vec::with_capacity(courses.len());
    for c in &courses {
        created.push(insert_course(&tx, &semester_id, &user.id, c)?);
    }
    tx.commit()?;

    let graded: Vec<GradedCourse> = courses
        .iter()
        .map(|c| GradedCourse {
            grade: c.grade.clone(),
            unit: c.unit,
        })
        .collect();
    let totals = calc::totals(&graded);
    Ok(json!({
        "id": semester_id,
        "name": name,
        "createdAt": created_at,
        "courses": created,
        "gpa": calc::round_2_decimals(totals.average()),
        "totalUnits": totals.units,
    }))
}

fn handle_semesters_list(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    Ok(json!({ "semesters": load_semesters(conn, &user.id)? }))
}

fn handle_semesters_delete(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let semester_id = required_str(&req.params, "semesterId")?;
    if !owned_semester_exists(conn, &semester_id, &user.id)? {
        return Err(ApiError::not_found("Semester not found."));
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM semester_courses WHERE semester_id = ?",
        [&semester_id],
    )?;
    tx.execute("DELETE FROM semesters WHERE id = ?", [&semester_id])?;
    tx.commit()?;
    Ok(json!({ "message": "Semester deleted successfully" }))
}

fn handle_semesters_add_course(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let semester_id = required_str(&req.params, "semesterId")?;
    let course = parse_course_input(&req.params)?;
    if !owned_semester_exists(conn, &semester_id, &user.id)? {
        return Err(ApiError::not_found("Semester not found."));
    }
    Ok(insert_course(conn, &semester_id, &user.id, &course)?)
}

fn handle_semesters_delete_course(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let course_id = required_str(&req.params, "courseId")?;

    // Ownership goes through the semester, not the course row.
    let deleted = conn.execute(
        "DELETE FROM semester_courses
         WHERE id = ?
           AND semester_id IN (SELECT id FROM semesters WHERE user_id = ?)",
        (&course_id, &user.id),
    )?;
    if deleted == 0 {
        return Err(ApiError::not_found("Course not found."));
    }
    Ok(json!({ "message": "Course deleted successfully" }))
}

fn handle_semesters_cgpa(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let semesters = calc::load_user_semesters(conn, &user.id)?;
    let summary = calc::cgpa_summary(&semesters);
    serde_json::to_value(summary).map_err(|e| ApiError::Internal(e.into()))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "semesters.create" => handle_semesters_create(state, req),
        "semesters.list" => handle_semesters_list(state, req),
        "semesters.delete" => handle_semesters_delete(state, req),
        "semesters.addCourse" => handle_semesters_add_course(state, req),
        "semesters.deleteCourse" => handle_semesters_delete_course(state, req),
        "semesters.cgpa" => handle_semesters_cgpa(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
