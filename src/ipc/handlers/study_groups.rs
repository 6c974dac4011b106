use crate::auth::user_initials;
use crate::db;
use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::helpers::{
    authenticate, db_conn, delete_group_cascade, group_member_ids, load_group_access,
    optional_i64, optional_str, parse_bool, require_view, required_str, touch_group, CurrentUser,
};
use crate::ipc::types::{AppState, Request};
use crate::membership::{
    self, check_delete, check_join, check_join_by_code, check_leave, CodeJoin, GroupAccess,
    LeaveOutcome, ROLE_CREATOR, ROLE_MEMBER,
};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

const DEFAULT_MAX_MEMBERS: i64 = 10;
const ACCESS_CODE_ATTEMPTS: usize = 16;

/// Group record as seen by `viewer_id`; the access code is blanked for everyone but the creator.
fn group_json(conn: &Connection, group_id: &str, viewer_id: &str) -> Result<JsonValue, ApiError> {
    let row = conn
        .query_row(
            "SELECT id, name, description, course, max_members, is_private, access_code,
                    creator_id, is_active, created_at, last_activity
             FROM study_groups
             WHERE id = ?",
            [group_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, Option<String>>(3)?,
                    r.get::<_, i64>(4)?,
                    r.get::<_, i64>(5)? != 0,
                    r.get::<_, Option<String>>(6)?,
                    r.get::<_, String>(7)?,
                    r.get::<_, i64>(8)? != 0,
                    r.get::<_, String>(9)?,
                    r.get::<_, String>(10)?,
                ))
            },
        )
        .optional()?;
    let Some((
        id,
        name,
        description,
        course,
        max_members,
        is_private,
        access_code,
        creator_id,
        is_active,
        created_at,
        last_activity,
    )) = row
    else {
        return Err(ApiError::not_found("Study group not found"));
    };

    let access = GroupAccess {
        members: group_member_ids(conn, &id)?,
        creator_id,
        is_private,
        max_members,
        access_code,
    };
    Ok(json!({
        "id": id,
        "name": name,
        "description": description,
        "course": course,
        "maxMembers": access.max_members,
        "isPrivate": access.is_private,
        "accessCode": access.visible_access_code(viewer_id),
        "creatorId": access.creator_id,
        "memberCount": access.members.len(),
        "members": access.members,
        "createdAt": created_at,
        "lastActivity": last_activity,
        "isActive": is_active,
    }))
}

fn unique_access_code(conn: &Connection) -> Result<String, ApiError> {
    for _ in 0..ACCESS_CODE_ATTEMPTS {
        let code = membership::generate_access_code();
        let taken: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM study_groups WHERE access_code = ?",
                [&code],
                |r| r.get(0),
            )
            .optional()?;
        if taken.is_none() {
            return Ok(code);
        }
    }
    Err(ApiError::Internal(anyhow::anyhow!(
        "could not allocate a unique access code"
    )))
}

fn insert_membership(
    conn: &Connection,
    group_id: &str,
    user_id: &str,
    role: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO group_members(id, group_id, user_id, role, joined_at) VALUES(?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            group_id,
            user_id,
            role,
            db::now_rfc3339(),
        ),
    )?;
    Ok(())
}

fn handle_groups_create(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;

    let name = required_str(&req.params, "name")?;
    let description = optional_str(&req.params, "description")?;
    let course = optional_str(&req.params, "course")?;
    let max_members = optional_i64(&req.params, "maxMembers")?.unwrap_or(DEFAULT_MAX_MEMBERS);
    if max_members < 1 {
        return Err(ApiError::bad_params("maxMembers must be at least 1"));
    }
    let is_private = parse_bool(&req.params, "isPrivate", false)?;

    let tx = conn.unchecked_transaction()?;
    let access_code = if is_private {
        Some(unique_access_code(&tx)?)
    } else {
        None
    };
    let group_id = Uuid::new_v4().to_string();
    let now = db::now_rfc3339();
    tx.execute(
        "INSERT INTO study_groups(
            id, name, description, course, max_members, is_private, access_code,
            creator_id, is_active, created_at, last_activity
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
        (
            &group_id,
            &name,
            &description,
            &course,
            max_members,
            is_private as i64,
            &access_code,
            &user.id,
            &now,
            &now,
        ),
    )?;
    insert_membership(&tx, &group_id, &user.id, ROLE_CREATOR)?;
    tx.commit()?;
    info!(group_id = %group_id, is_private, "study group created");

    group_json(conn, &group_id, &user.id)
}

fn handle_groups_list(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let course = optional_str(&req.params, "course")?;

    let mut member_stmt = conn.prepare(
        "SELECT g.id
         FROM study_groups g
         JOIN group_members m ON m.group_id = g.id
         WHERE m.user_id = ?
         ORDER BY g.created_at, g.rowid",
    )?;
    let mut ids = member_stmt
        .query_map([&user.id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    // The course filter narrows only the public part of the listing.
    let public_ids = match &course {
        Some(c) => {
            let mut stmt = conn.prepare(
                "SELECT id FROM study_groups WHERE is_private = 0 AND course = ?
                 ORDER BY created_at, rowid",
            )?;
            let rows = stmt
                .query_map([c], |r| r.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id FROM study_groups WHERE is_private = 0 ORDER BY created_at, rowid",
            )?;
            let rows = stmt
                .query_map([], |r| r.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };

    let mut seen: HashSet<String> = ids.iter().cloned().collect();
    for id in public_ids {
        if seen.insert(id.clone()) {
            ids.push(id);
        }
    }

    let groups = ids
        .iter()
        .map(|id| group_json(conn, id, &user.id))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "groups": groups }))
}

fn handle_groups_get(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let group_id = required_str(&req.params, "groupId")?;
    let group = load_group_access(conn, &group_id)?;
    require_view(&group, &user)?;
    group_json(conn, &group_id, &user.id)
}

fn add_member(conn: &Connection, group_id: &str, user: &CurrentUser) -> Result<(), ApiError> {
    let tx = conn.unchecked_transaction()?;
    insert_membership(&tx, group_id, &user.id, ROLE_MEMBER)?;
    touch_group(&tx, group_id)?;
    tx.commit()?;
    info!(group_id = %group_id, user_id = %user.id, "joined study group");
    Ok(())
}

fn handle_groups_join(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let group_id = required_str(&req.params, "groupId")?;
    let access_code = optional_str(&req.params, "accessCode")?;

    let group = load_group_access(conn, &group_id)?;
    check_join(&group, &user.id, access_code.as_deref())?;
    add_member(conn, &group_id, &user)?;
    Ok(json!({ "message": "Successfully joined the group", "groupId": group_id }))
}

fn handle_groups_join_by_code(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let Some(code) = optional_str(&req.params, "accessCode")? else {
        return Err(ApiError::bad_params("Access code is required"));
    };
    let code = code.to_ascii_uppercase();

    let group_id: Option<String> = conn
        .query_row(
            "SELECT id FROM study_groups WHERE access_code = ?",
            [&code],
            |r| r.get(0),
        )
        .optional()?;
    let Some(group_id) = group_id else {
        return Err(ApiError::not_found(
            "Study group not found for this access code",
        ));
    };

    let group = load_group_access(conn, &group_id)?;
    match check_join_by_code(&group, &user.id)? {
        CodeJoin::AlreadyMember => Ok(json!({
            "message": "Already a member of this group",
            "groupId": group_id,
            "alreadyMember": true,
        })),
        CodeJoin::Join => {
            add_member(conn, &group_id, &user)?;
            Ok(json!({
                "message": "Successfully joined the group",
                "groupId": group_id,
                "alreadyMember": false,
            }))
        }
    }
}

fn handle_groups_delete(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let group_id = required_str(&req.params, "groupId")?;

    let group = load_group_access(conn, &group_id)?;
    check_delete(&group, &user.id)?;
    delete_group_cascade(conn, &group_id)?;
    info!(group_id = %group_id, "study group deleted");
    Ok(json!({ "message": "Group deleted" }))
}

fn handle_groups_leave(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let group_id = required_str(&req.params, "groupId")?;

    let group = load_group_access(conn, &group_id)?;
    match check_leave(&group, &user.id)? {
        LeaveOutcome::LeftAndDeleted => {
            delete_group_cascade(conn, &group_id)?;
            info!(group_id = %group_id, "last member left, study group deleted");
            Ok(json!({
                "message": "Left group and group was deleted",
                "groupDeleted": true,
            }))
        }
        LeaveOutcome::Left => {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM group_members WHERE group_id = ? AND user_id = ?",
                (&group_id, &user.id),
            )?;
            touch_group(&tx, &group_id)?;
            tx.commit()?;
            info!(group_id = %group_id, user_id = %user.id, "left study group");
            Ok(json!({
                "message": "Successfully left the group",
                "groupDeleted": false,
            }))
        }
    }
}

fn handle_groups_members(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let group_id = required_str(&req.params, "groupId")?;

    let group = load_group_access(conn, &group_id)?;
    require_view(&group, &user)?;

    let mut stmt = conn.prepare(
        "SELECT m.id, m.user_id, m.role, m.joined_at, u.username, u.full_name
         FROM group_members m
         LEFT JOIN users u ON u.id = m.user_id
         WHERE m.group_id = ?
         ORDER BY m.joined_at, m.rowid",
    )?;
    let members = stmt
        .query_map([&group_id], |r| {
            let username: Option<String> = r.get(4)?;
            let full_name: Option<String> = r.get(5)?;
            let user_info = username.map(|username| {
                let full_name = full_name.unwrap_or_default();
                json!({
                    "username": username,
                    "initials": user_initials(&full_name),
                    "fullName": full_name,
                })
            });
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "userId": r.get::<_, String>(1)?,
                "groupId": group_id,
                "role": r.get::<_, String>(2)?,
                "joinedAt": r.get::<_, String>(3)?,
                "userInfo": user_info,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "members": members }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "studyGroups.create" => handle_groups_create(state, req),
        "studyGroups.list" => handle_groups_list(state, req),
        "studyGroups.get" => handle_groups_get(state, req),
        "studyGroups.join" => handle_groups_join(state, req),
        "studyGroups.joinByCode" => handle_groups_join_by_code(state, req),
        "studyGroups.delete" => handle_groups_delete(state, req),
        "studyGroups.leave" => handle_groups_leave(state, req),
        "studyGroups.members" => handle_groups_members(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
