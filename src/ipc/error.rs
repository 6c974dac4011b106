use serde_json::json;
use thiserror::Error;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadParams(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("select a workspace first")]
    NoWorkspace,

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_params(message: impl Into<String>) -> Self {
        ApiError::BadParams(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadParams(_) => "bad_params",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::NoWorkspace => "no_workspace",
            ApiError::Db(_) => "db_query_failed",
            ApiError::Internal(_) => "internal",
        }
    }

    pub fn response(&self, id: &str) -> serde_json::Value {
        err(id, self.code(), self.to_string(), None)
    }
}

pub type ApiResult = Result<serde_json::Value, ApiError>;

pub fn respond(id: &str, result: ApiResult) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => {
            if matches!(e, ApiError::Db(_) | ApiError::Internal(_)) {
                tracing::error!(request_id = id, error = %e, "request failed");
            }
            e.response(id)
        }
    }
}
