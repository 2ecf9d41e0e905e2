use axum::{extract::State, Json};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::agent::{Member, NodeService};
use crate::config::Config;
use crate::health::HealthCheck;
use crate::http::server::AppState;
use crate::observability::inmem::IntervalMetrics;

#[derive(Serialize)]
pub struct BuildStatus {
    pub version: String,
    pub revision: String,
    pub prerelease: String,
}

#[derive(Serialize)]
pub struct AgentSelf {
    pub config: Config,
    pub member: Option<Member>,
    pub build: BuildStatus,
    pub syncing: bool,
}

pub async fn get_self(State(state): State<AppState>) -> Json<AgentSelf> {
    let config = state.agent.config();
    let mut shown = config.as_ref().clone();
    if !shown.encrypt.is_empty() {
        shown.encrypt = "<redacted>".to_string();
    }
    Json(AgentSelf {
        config: shown,
        member: state.agent.local_member(),
        build: BuildStatus {
            version: config.build.version.clone(),
            revision: config.build.revision.clone(),
            prerelease: config.build.prerelease.clone(),
        },
        syncing: state.agent.is_syncing(),
    })
}

pub async fn get_members(State(state): State<AppState>) -> Json<Vec<Member>> {
    Json(state.agent.members())
}

pub async fn get_services(State(state): State<AppState>) -> Json<BTreeMap<String, NodeService>> {
    Json(state.agent.catalog().services())
}

pub async fn get_checks(State(state): State<AppState>) -> Json<BTreeMap<String, HealthCheck>> {
    Json(state.agent.catalog().checks())
}

/// The most recent in-memory metrics interval, `null` before any metric.
pub async fn get_metrics(State(state): State<AppState>) -> Json<Option<IntervalMetrics>> {
    Json(state.telemetry.inmem().latest())
}
