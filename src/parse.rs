use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use scraper::{Html, Selector};
use thiserror::Error;

use tracing as log;

use crate::event::{Event, CAMPUS_TZ};
use crate::store::SubjectMap;

/// Why a single timetable row was dropped. One bad row never takes the rest
/// of the document with it.
#[derive(Debug, Error)]
pub enum RowError {
	#[error("expected 6 columns, found {0}")]
	ColumnCount(usize),
	#[error("invalid date {0:?}")]
	Date(String),
	#[error("invalid time range {0:?}")]
	TimeRange(String),
	#[error("time {0} does not exist in campus timezone")]
	LocalTime(NaiveDateTime),
}

/// Extract events from one week's timetable document, in row order.
/// Rows without `<td>` cells are layout, anything else must carry exactly
/// `{date, time-range, room, building, subject-code, lecturer}`. An empty
/// or entirely malformed document yields an empty list, not an error.
pub fn parse_timetable(html: &str, subjects: &SubjectMap) -> Vec<Event> {
	let sel_row = Selector::parse("tr").unwrap();
	let sel_cell = Selector::parse("td").unwrap();

	let doc = Html::parse_document(html);
	let mut events = Vec::new();
	for row in doc.select(&sel_row) {
		let cells: Vec<String> = row.select(&sel_cell)
			.map(|cell| cell.text().collect::<String>().trim().to_owned())
			.collect();
		if cells.is_empty() {
			continue;
		}
		match parse_row(&cells, subjects) {
			Ok(event) => events.push(event),
			Err(err) => log::warn!("skipping timetable row: {err}"),
		}
	}
	events
}

fn parse_row(cells: &[String], subjects: &SubjectMap) -> Result<Event, RowError> {
	let [date, times, room, building, code, lecturer] = cells else {
		return Err(RowError::ColumnCount(cells.len()));
	};

	// "Mon, 06-Jan-2025"
	let date = NaiveDate::parse_from_str(date, "%a, %d-%b-%Y")
		.map_err(|_| RowError::Date(date.clone()))?;

	// "09:00-11:00"
	let (start, end) = times.split_once('-')
		.ok_or_else(|| RowError::TimeRange(times.clone()))?;
	let start = parse_time(start).ok_or_else(|| RowError::TimeRange(times.clone()))?;
	let end = parse_time(end).ok_or_else(|| RowError::TimeRange(times.clone()))?;

	Ok(Event {
		start: zoned(date.and_time(start))?,
		end: zoned(date.and_time(end))?,
		subject: subjects.resolve(code).to_owned(),
		location: format!("{room}, {building}"),
		description: format!("Course Code: {code}\nLecturer: {lecturer}"),
	})
}

fn parse_time(text: &str) -> Option<NaiveTime> {
	NaiveTime::parse_from_str(text.trim(), "%H:%M").ok()
}

fn zoned(local: NaiveDateTime) -> Result<DateTime<Tz>, RowError> {
	CAMPUS_TZ.from_local_datetime(&local)
		.single()
		.ok_or(RowError::LocalTime(local))
}
