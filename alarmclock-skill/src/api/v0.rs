//! API v0 endpoints.
//!
//! Version 0 signals an unstable API -- breaking changes are expected.

use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use tokio::sync::oneshot;

use super::commands::SkillCommand;
use super::server::SharedState;
use crate::api_client::types::{AlarmState, SiteState};
use crate::error::Error;
use crate::types::SiteId;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the v0 API routes.
pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health))
        .route("/alarms", get(get_alarms))
        .route("/alarms/missed", get(get_missed))
        .route("/sites", get(get_sites))
        .route("/sites/{site_id}", get(get_site))
        .route("/sites/{site_id}/stop", post(stop_site))
}

async fn health() -> &'static str {
    "OK"
}

async fn get_alarms(State(state): State<SharedState>) -> Json<Vec<AlarmState>> {
    Json(state.alarms())
}

async fn get_missed(State(state): State<SharedState>) -> Json<Vec<AlarmState>> {
    Json(state.missed())
}

async fn get_sites(State(state): State<SharedState>) -> Json<Vec<SiteState>> {
    Json(state.site_states())
}

/// Return a single site by id, or 404 if not found.
async fn get_site(
    State(state): State<SharedState>,
    Path(site_id): Path<String>,
) -> Result<Json<SiteState>, StatusCode> {
    state
        .sites
        .get(&SiteId::new(site_id))
        .map(|site| Json(state.site_state(site)))
        .ok_or(StatusCode::NOT_FOUND)
}

/// Stop a ringing site. 409 if it is not ringing.
async fn stop_site(
    State(state): State<SharedState>,
    Path(site_id): Path<String>,
) -> Result<Json<SiteState>, StatusCode> {
    let site_id = SiteId::new(site_id);
    let (tx, rx) = oneshot::channel();
    state
        .skill_cmd_tx
        .send(SkillCommand::StopRinging {
            site_id: site_id.clone(),
            reply: tx,
        })
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    // Result layers: timeout / channel-closed / command-error.
    let Ok(Ok(result)) = tokio::time::timeout(COMMAND_TIMEOUT, rx).await else {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    };
    match result {
        Ok(true) => {}
        Ok(false) => return Err(StatusCode::CONFLICT),
        Err(Error::UnknownSite(_)) => return Err(StatusCode::NOT_FOUND),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    }

    state
        .sites
        .get(&site_id)
        .map(|site| Json(state.site_state(site)))
        .ok_or(StatusCode::NOT_FOUND)
}
