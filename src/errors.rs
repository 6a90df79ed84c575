use actix_web::{HttpResponse, ResponseError};
use std::fmt;

use crate::workflow::validator::ValidationError;

#[derive(Debug)]
pub enum AppError {
    Db(rusqlite::Error),
    Pool(r2d2::Error),
    Session(String),
    Hash(String),
    Validation(String),
    NotFound,
    /// Actor lacks the named permission code.
    PermissionDenied(String),
    /// No active workflow exists for the application type.
    NoActiveWorkflow(String),
    /// The application already has a workflow state.
    AlreadyInitialized(i64),
    /// Transition source does not match the current stage (including lost
    /// concurrency races), or the transition does not exist for the stage.
    InvalidTransition(String),
    /// A transition condition did not hold against the application data.
    ConditionNotMet(String),
    /// Structural validation of a workflow graph failed.
    WorkflowInvalid(Vec<ValidationError>),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Db(e) => write!(f, "Database error: {e}"),
            AppError::Pool(e) => write!(f, "Pool error: {e}"),
            AppError::Session(e) => write!(f, "Session error: {e}"),
            AppError::Hash(e) => write!(f, "Hash error: {e}"),
            AppError::Validation(e) => write!(f, "Validation error: {e}"),
            AppError::NotFound => write!(f, "Not found"),
            AppError::PermissionDenied(code) => write!(f, "Permission denied: {code}"),
            AppError::NoActiveWorkflow(app_type) => {
                write!(f, "No active workflow for application type '{app_type}'")
            }
            AppError::AlreadyInitialized(id) => {
                write!(f, "Application {id} is already in a workflow")
            }
            AppError::InvalidTransition(reason) => write!(f, "Invalid transition: {reason}"),
            AppError::ConditionNotMet(reason) => write!(f, "Condition not met: {reason}"),
            AppError::WorkflowInvalid(errors) => {
                write!(f, "Workflow definition invalid ({} problem(s))", errors.len())
            }
        }
    }
}

fn json_body(error: &str, detail: String) -> serde_json::Value {
    serde_json::json!({ "error": error, "detail": detail })
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::NotFound => {
                HttpResponse::NotFound().json(json_body("not_found", self.to_string()))
            }
            AppError::Session(_) => {
                HttpResponse::Unauthorized().json(json_body("unauthorized", self.to_string()))
            }
            AppError::PermissionDenied(_) => {
                HttpResponse::Forbidden().json(json_body("permission_denied", self.to_string()))
            }
            AppError::AlreadyInitialized(_) | AppError::InvalidTransition(_) => {
                HttpResponse::Conflict().json(json_body("conflict", self.to_string()))
            }
            AppError::ConditionNotMet(_)
            | AppError::NoActiveWorkflow(_)
            | AppError::Validation(_) => HttpResponse::UnprocessableEntity()
                .json(json_body("unprocessable", self.to_string())),
            AppError::WorkflowInvalid(errors) => HttpResponse::UnprocessableEntity()
                .json(serde_json::json!({ "error": "workflow_invalid", "problems": errors })),
            _ => {
                log::error!("{self}");
                HttpResponse::InternalServerError()
                    .json(json_body("internal", "Internal Server Error".to_string()))
            }
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Db(e)
    }
}

impl From<r2d2::Error> for AppError {
    fn from(e: r2d2::Error) -> Self {
        AppError::Pool(e)
    }
}
