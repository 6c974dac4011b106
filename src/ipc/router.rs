use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;
use tracing::debug;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    debug!(id = %req.id, method = %req.method, "dispatch");

    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::auth::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::courses::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::semesters::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::study_groups::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::discussions::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::resources::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::group_timetable::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::timetable::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
