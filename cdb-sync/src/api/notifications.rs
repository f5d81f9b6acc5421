//! Legacy change notifications
//!
//! POST /notifications

use axum::{extract::State, routing::post, Json, Router};
use cdb_common::events::ChangeKind;
use cdb_common::{AggregateKind, ExternalId, RecordKind};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::import::ImportOutcome;
use crate::legacy::id_from_notification_url;
use crate::AppState;

/// POST /notifications request
///
/// Either `id` or `url` (the legacy record URL, whose last path segment is
/// the id) must be given.
#[derive(Debug, Deserialize)]
pub struct NotificationRequest {
    pub kind: RecordKind,
    pub change: ChangeKind,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AggregateOutcome {
    pub aggregate_kind: AggregateKind,
    pub outcome: ImportOutcome,
}

/// POST /notifications response
#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: ExternalId,
    pub outcomes: Vec<AggregateOutcome>,
}

fn resolve_id(request: &NotificationRequest) -> ApiResult<ExternalId> {
    if let Some(id) = &request.id {
        return ExternalId::new(id.as_str()).map_err(|e| ApiError::BadRequest(e.to_string()));
    }

    let url = request
        .url
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("either id or url is required".to_string()))?;

    id_from_notification_url(url)
        .ok_or_else(|| ApiError::BadRequest(format!("No record id in notification url: {}", url)))
}

/// POST /notifications
///
/// Event notifications go to the event importer. Actor notifications go to
/// the place importer and then to the organizer importer; each applies its
/// own admission predicate. Every importer runs even when an earlier one
/// fails, and the first failure decides the response so the notification
/// gets redelivered.
pub async fn handle_notification(
    State(state): State<AppState>,
    Json(request): Json<NotificationRequest>,
) -> ApiResult<Json<NotificationResponse>> {
    let id = resolve_id(&request)?;

    tracing::info!(kind = %request.kind, change = ?request.change, id = %id, "Received legacy notification");

    let mut outcomes = Vec::new();
    let mut first_error = None;
    for importer in state.importers_for(request.kind) {
        match importer.import(&id, request.change).await {
            Ok(outcome) => {
                tracing::info!(aggregate_kind = %importer.kind(), id = %id, outcome = %outcome, "Notification handled");
                outcomes.push(AggregateOutcome {
                    aggregate_kind: importer.kind(),
                    outcome,
                });
            }
            Err(e) => {
                tracing::error!(
                    aggregate_kind = %importer.kind(),
                    id = %id,
                    error = %e,
                    "Import failed"
                );
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(Json(NotificationResponse { id, outcomes })),
    }
}

/// Build notification routes
pub fn notification_routes() -> Router<AppState> {
    Router::new().route("/notifications", post(handle_notification))
}
