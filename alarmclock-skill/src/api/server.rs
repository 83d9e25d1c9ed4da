//! HTTP server wiring.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use super::commands::SkillCommand;
use super::v0;
use crate::api_client::types::{AlarmState, SiteState};
use crate::site::{Site, SiteRegistry};
use crate::store::AlarmStore;
use crate::tracing::prelude::*;
use crate::types::{Alarm, minute};

/// Default listen address. The API is local-only.
pub const DEFAULT_ADDR: &str = "127.0.0.1:7786";

/// State shared by all handlers.
#[derive(Clone)]
pub struct SharedState {
    pub store: Arc<AlarmStore>,
    pub sites: Arc<SiteRegistry>,
    pub skill_cmd_tx: mpsc::Sender<SkillCommand>,
}

impl SharedState {
    /// Pending alarms, soonest first.
    pub fn alarms(&self) -> Vec<AlarmState> {
        self.store
            .active(None, None)
            .iter()
            .map(|a| self.alarm_state(a))
            .collect()
    }

    /// Missed alarms, most recent first.
    pub fn missed(&self) -> Vec<AlarmState> {
        self.store
            .missed(None)
            .iter()
            .map(|a| self.alarm_state(a))
            .collect()
    }

    pub fn site_states(&self) -> Vec<SiteState> {
        self.sites
            .sites()
            .iter()
            .map(|s| self.site_state(s))
            .collect()
    }

    pub fn site_state(&self, site: &Site) -> SiteState {
        let (phase, ringing) = {
            let rt = site.runtime();
            (rt.phase, rt.ringing_alarm.clone())
        };
        SiteState {
            site_id: site.id.to_string(),
            room: site.room.clone(),
            phase: phase.to_string(),
            ringing_timeout_secs: site.ringing_timeout.as_secs(),
            ringtone_enabled: site.ringtone_enabled,
            ringing: ringing.as_ref().map(|a| self.alarm_state(a)),
        }
    }

    fn alarm_state(&self, alarm: &Alarm) -> AlarmState {
        AlarmState {
            datetime: minute::format(alarm.datetime),
            site_id: alarm.site_id.to_string(),
            room: self
                .sites
                .resolve_room(&alarm.site_id)
                .map(str::to_string)
                .unwrap_or_default(),
            missed: alarm.missed,
        }
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .nest("/api/v0", v0::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until `cancellation` fires.
pub async fn serve(
    addr: SocketAddr,
    state: SharedState,
    cancellation: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancellation.cancelled().await })
        .await?;

    debug!("API server stopped");
    Ok(())
}
