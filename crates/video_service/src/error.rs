use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use datastore::StoreError;
use serde::Serialize;
use serde_json::json;

/// The store call a multi-step operation was executing when it failed.
///
/// Steps after `UpdateMembership` run once a reaction set has already been
/// changed, so a failure there leaves a counter that needs reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    LookupVideo,
    LookupChannel,
    UpdateMembership,
    AdjustCounter,
    ClearOpposite,
    AdjustOppositeCounter,
    Reconcile,
    Read,
    Write,
}

impl Step {
    /// Whether a failure at this step may have left counters out of sync
    pub fn leaves_drift(self) -> bool {
        matches!(
            self,
            Step::AdjustCounter | Step::ClearOpposite | Step::AdjustOppositeCounter
        )
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Step::LookupVideo => "lookup video",
            Step::LookupChannel => "lookup channel",
            Step::UpdateMembership => "update reaction set",
            Step::AdjustCounter => "adjust counter",
            Step::ClearOpposite => "clear opposite reaction",
            Step::AdjustOppositeCounter => "adjust opposite counter",
            Step::Reconcile => "reconcile counters",
            Step::Read => "read",
            Step::Write => "write",
        };
        f.write_str(name)
    }
}

/// One rejected input field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Concurrent toggle by channel '{channel_id}' on video '{video_id}' was already applied")]
    ConflictRace {
        channel_id: String,
        video_id: String,
    },

    #[error("Store error during {step}: {source}")]
    Store {
        step: Step,
        #[source]
        source: StoreError,
    },

    #[error("Missing acting channel")]
    Unauthenticated,
}

impl ServiceError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::NotFound(format!("{entity} '{id}'"))
    }

    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::ConflictRace { .. } => StatusCode::CONFLICT,
            ServiceError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Attach the failing step to a store error.
/// A `Missing` entity surfaces as `NotFound`, unless it was reported by a step
/// running after a reaction set already changed.
pub trait StoreResultExt<T> {
    fn at(self, step: Step) -> Result<T, ServiceError>;
}

impl<T> StoreResultExt<T> for Result<T, StoreError> {
    fn at(self, step: Step) -> Result<T, ServiceError> {
        self.map_err(|source| match source {
            StoreError::Missing { entity, id } if !step.leaves_drift() => {
                ServiceError::not_found(entity, &id)
            }
            source => ServiceError::Store { step, source },
        })
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServiceError::NotFound(what) => format!("{what} not found"),
            // Store details stay in the logs
            ServiceError::Store { .. } => "Internal server error".to_string(),
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, status_code = %status, "Request error");
        } else {
            tracing::warn!(error = %self, status_code = %status, "Request rejected");
        }

        let body = match self {
            ServiceError::Validation(errors) => json!({
                "message": message,
                "status": status.as_u16(),
                "errors": errors,
            }),
            _ => json!({
                "message": message,
                "status": status.as_u16(),
            }),
        };
        (status, Json(body)).into_response()
    }
}
