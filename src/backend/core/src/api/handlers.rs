//! Request handlers.
//!
//! All handlers return `Result<_, HiveError>` so failures map to HTTP status
//! codes via the error's `IntoResponse`.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::control::{ControlForm, Entity, ViewQuery};
use crate::error::{HiveError, Result};
use crate::health::HealthReport;
use crate::pagination::{OffsetPagination, SortDirection};

// ═══════════════════════════════════════════════════════════════════════════════
// Stats & Views
// ═══════════════════════════════════════════════════════════════════════════════

/// Query string of `GET /workers`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkersQuery {
    pub action: Option<String>,
    pub entity: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

impl WorkersQuery {
    /// The entity view requested, if any.
    fn view(&self) -> Result<Option<ViewQuery>> {
        let Some(entity) = self.entity.as_deref() else {
            return Ok(None);
        };

        let entity: Entity = entity.parse()?;
        let order = match self.order.as_deref() {
            Some(order) => order.parse()?,
            None => SortDirection::default(),
        };

        let mut query = ViewQuery::new(entity);
        query.pagination = OffsetPagination::from_query(self.page, self.per_page)?;
        query.order = order;
        query.sort = self.sort.clone().filter(|s| !s.trim().is_empty());
        Ok(Some(query))
    }
}

pub async fn workers_view(
    State(state): State<AppState>,
    Query(query): Query<WorkersQuery>,
) -> Result<Response> {
    if let Some(view) = query.view()? {
        let page = state.control.view(&view)?;
        return Ok(Json(page).into_response());
    }

    match query.action.as_deref().unwrap_or("stats") {
        "stats" => Ok(Json(state.control.snapshot()).into_response()),
        other => Err(HiveError::unknown_action(other)),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Control
// ═══════════════════════════════════════════════════════════════════════════════

/// Query string of `POST /workers`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionQuery {
    #[serde(default)]
    pub action: String,
}

pub async fn workers_control(
    State(state): State<AppState>,
    Query(query): Query<ActionQuery>,
    Form(form): Form<ControlForm>,
) -> Result<Response> {
    let snapshot = state.control.handle(query.action.trim(), &form)?;
    Ok(Json(snapshot).into_response())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Health & Metrics
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let report = HealthReport::from_dispatcher(state.dispatcher(), state.started_at.elapsed());
    let status = if report.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
}
