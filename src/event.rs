use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// Fixed civil timezone of the campus. Event timestamps are zoned here the
/// moment they are parsed; only external text formats localize further.
pub const CAMPUS_TZ: Tz = chrono_tz::Asia::Kuala_Lumpur;

/// One timetable entry. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
	pub start: DateTime<Tz>,
	pub end: DateTime<Tz>,
	pub subject: String,
	pub location: String,
	pub description: String,
}

/// A fully-formed event list plus its commit timestamp. The cache replaces
/// snapshots wholesale, never mutates one in place.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
	pub events: Vec<Event>,
	pub last_updated: Option<DateTime<Utc>>,
}

impl Snapshot {
	pub fn empty() -> Self {
		Self { events: Vec::new(), last_updated: None }
	}
}
