use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
	extract::State,
	http::{header, StatusCode},
	response::{IntoResponse, Response},
	routing::{get, post},
	Form, Json, Router,
};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use serde_json::json;

use tracing as log;

use crate::cache::CacheStore;
use crate::event::Snapshot;
use crate::ics;
use crate::refresh::RefreshCoordinator;
use crate::store::{Stores, SubjectMap, TimetableConfig};

/// Everything a request handler needs, passed explicitly. No ambient
/// globals anywhere in the serving path.
#[derive(Clone)]
pub struct AppState {
	pub cache: Arc<CacheStore>,
	pub coordinator: Arc<RefreshCoordinator>,
	pub stores: Stores,
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/", get(index))
		.route("/events", get(events))
		.route("/calendar.ics", get(calendar_feed))
		.route("/status", get(status))
		.route("/subject_mapping", get(get_mapping).put(put_mapping))
		.route("/update_config", post(update_config))
		.with_state(state)
}

async fn index() -> Json<serde_json::Value> {
	Json(json!({
		"service": "apu-calendar",
		"version": env!("CARGO_PKG_VERSION"),
		"endpoints": ["/events", "/calendar.ics", "/status", "/subject_mapping", "/update_config"],
	}))
}

/// JSON view of the snapshot. Best-effort: a stale cache is refreshed
/// first, but upstream failure still serves whatever is committed.
async fn events(State(state): State<AppState>) -> Json<Snapshot> {
	state.coordinator.ensure_fresh(false).await;
	let snapshot = state.cache.read().await;
	Json(snapshot.as_ref().clone())
}

async fn calendar_feed(State(state): State<AppState>) -> impl IntoResponse {
	state.coordinator.ensure_fresh(false).await;
	let snapshot = state.cache.read().await;
	let body = ics::render_calendar(&snapshot.events);

	(
		[
			(header::CONTENT_TYPE, "text/calendar; charset=utf-8"),
			(header::CONTENT_DISPOSITION, "inline"),
		],
		body,
	)
}

#[derive(Debug, Serialize)]
struct Status {
	status: &'static str,
	last_cache_update: Option<String>,
	event_count: usize,
	version: &'static str,
}

async fn status(State(state): State<AppState>) -> Json<Status> {
	let snapshot = state.cache.read().await;
	Json(Status {
		status: "running",
		last_cache_update: snapshot.last_updated.map(|at| at.to_rfc3339()),
		event_count: snapshot.events.len(),
		version: env!("CARGO_PKG_VERSION"),
	})
}

async fn get_mapping(State(state): State<AppState>) -> Json<SubjectMap> {
	Json(state.stores.load_mapping())
}

/// Replace the whole subject mapping, then refresh so the new names show
/// up in the very next read.
async fn put_mapping(State(state): State<AppState>, Json(mapping): Json<SubjectMap>) -> Response {
	if let Err(err) = state.stores.save_mapping(&mapping) {
		log::error!("failed to save subject mapping: {err:#}");
		return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to persist mapping");
	}

	state.coordinator.ensure_fresh(true).await;
	Json(json!({"status": "success"})).into_response()
}

/// Form fields exactly as the config page submits them; `updates_per_day`
/// arrives as one comma-separated string.
#[derive(Debug, Deserialize)]
struct ConfigForm {
	intake: String,
	group: String,
	weeks_ahead: String,
	updates_per_day: String,
}

async fn update_config(State(state): State<AppState>, Form(form): Form<ConfigForm>) -> Response {
	let conf = match parse_config_form(form) {
		Ok(v) => v,
		Err(message) => return error_response(StatusCode::BAD_REQUEST, &message),
	};

	if let Err(err) = state.stores.save_config(&conf) {
		log::error!("failed to save config: {err:#}");
		return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to persist config");
	}

	state.coordinator.ensure_fresh(true).await;
	Json(json!({"status": "success"})).into_response()
}

fn parse_config_form(form: ConfigForm) -> Result<TimetableConfig, String> {
	let intake = form.intake.trim().to_owned();
	if intake.is_empty() {
		return Err("intake must not be empty".into());
	}

	let group = form.group.trim().to_owned();
	if group.is_empty() {
		return Err("group must not be empty".into());
	}

	let weeks_ahead: u32 = form.weeks_ahead.trim().parse()
		.map_err(|_| format!("weeks_ahead is not a non-negative integer: {:?}", form.weeks_ahead))?;

	let mut updates_per_day = BTreeSet::new();
	for entry in form.updates_per_day.split(',') {
		let entry = entry.trim();
		if entry.is_empty() {
			continue;
		}
		NaiveTime::parse_from_str(entry, "%H:%M")
			.map_err(|_| format!("updates_per_day entry is not a HH:MM time: {entry:?}"))?;
		updates_per_day.insert(entry.to_owned());
	}

	Ok(TimetableConfig { intake, group, weeks_ahead, updates_per_day })
}

fn error_response(status: StatusCode, message: &str) -> Response {
	(status, Json(json!({"status": "error", "message": message}))).into_response()
}
