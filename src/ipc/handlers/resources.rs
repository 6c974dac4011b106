use crate::db;
use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::helpers::{
    authenticate, db_conn, load_group_access, optional_str, require_view, required_str,
    touch_group,
};
use crate::ipc::types::{AppState, Request};
use crate::membership::check_contribute;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

const DEFAULT_FILE_TYPE: &str = "application/octet-stream";

fn download_url(group_id: &str, resource_id: &str) -> String {
    format!("/study-groups/{group_id}/resources/{resource_id}/download")
}

/// Accepts plain base64 or a `data:<mime>;base64,` URL as sent by browsers.
fn decode_upload(raw: &str) -> Result<Vec<u8>, ApiError> {
    let payload = match raw.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => raw,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ApiError::bad_params(format!("fileContent is not valid base64: {e}")))
}

fn handle_resources_upload(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let group_id = required_str(&req.params, "groupId")?;
    let name = required_str(&req.params, "name")?;
    let description = optional_str(&req.params, "description")?;
    let file_type =
        optional_str(&req.params, "fileType")?.unwrap_or_else(|| DEFAULT_FILE_TYPE.to_string());
    let raw = req
        .params
        .get("fileContent")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiError::bad_params("missing fileContent"))?;

    let group = load_group_access(conn, &group_id)?;
    check_contribute(&group, &user.id)
        .map_err(|_| ApiError::Forbidden("Must be a group member to upload resources".into()))?;
    let content = decode_upload(raw)?;

    let tx = conn.unchecked_transaction()?;
    let seq: i64 = tx.query_row(
        "SELECT COALESCE(MAX(seq), 0) + 1 FROM group_resources WHERE group_id = ?",
        [&group_id],
        |r| r.get(0),
    )?;
    let resource_id = Uuid::new_v4().to_string();
    let uploaded_at = db::now_rfc3339();
    let uploader_name = user.display_name().to_string();
    let size = content.len() as i64;
    tx.execute(
        "INSERT INTO group_resources(
            id, group_id, name, description, file_type, size, content,
            uploaded_by, uploader_name, uploaded_at, seq
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &resource_id,
            &group_id,
            &name,
            &description,
            &file_type,
            size,
            &content,
            &user.id,
            &uploader_name,
            &uploaded_at,
            seq,
        ),
    )?;
    touch_group(&tx, &group_id)?;
    tx.commit()?;

    Ok(json!({
        "id": resource_id,
        "groupId": group_id,
        "name": name,
        "description": description,
        "fileType": file_type,
        "size": size,
        "uploadedBy": user.id,
        "uploaderName": uploader_name,
        "uploadedAt": uploaded_at,
        "downloadUrl": download_url(&group_id, &resource_id),
    }))
}

fn handle_resources_list(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let group_id = required_str(&req.params, "groupId")?;

    let group = load_group_access(conn, &group_id)?;
    require_view(&group, &user)?;

    let mut stmt = conn.prepare(
        "SELECT id, name, description, file_type, size, uploaded_by, uploader_name, uploaded_at
         FROM group_resources
         WHERE group_id = ?
         ORDER BY seq DESC",
    )?;
    let resources = stmt
        .query_map([&group_id], |r| {
            let id: String = r.get(0)?;
            Ok(json!({
                "downloadUrl": download_url(&group_id, &id),
                "id": id,
                "groupId": group_id,
                "name": r.get::<_, String>(1)?,
                "description": r.get::<_, Option<String>>(2)?,
                "fileType": r.get::<_, String>(3)?,
                "size": r.get::<_, i64>(4)?,
                "uploadedBy": r.get::<_, String>(5)?,
                "uploaderName": r.get::<_, String>(6)?,
                "uploadedAt": r.get::<_, String>(7)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "resources": resources }))
}

fn handle_resources_download(state: &mut AppState, req: &Request) -> ApiResult {
    let user = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let group_id = required_str(&req.params, "groupId")?;
    let resource_id = required_str(&req.params, "resourceId")?;

    let group = load_group_access(conn, &group_id)?;
    require_view(&group, &user)?;

    let row: Option<(String, String, Vec<u8>)> = conn
        .query_row(
            "SELECT name, file_type, content FROM group_resources WHERE id = ? AND group_id = ?",
            (&resource_id, &group_id),
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    let Some((name, file_type, content)) = row else {
        return Err(ApiError::not_found("Resource not found"));
    };

    Ok(json!({
        "name": name,
        "fileType": file_type,
        "size": content.len(),
        "contentBase64": STANDARD.encode(&content),
        "contentDisposition": format!("attachment; filename={name}"),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "resources.upload" => handle_resources_upload(state, req),
        "resources.list" => handle_resources_list(state, req),
        "resources.download" => handle_resources_download(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
