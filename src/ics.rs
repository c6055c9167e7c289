use chrono::Utc;
use icalendar::{Calendar, Component, EventLike};
use thiserror::Error;

use tracing as log;

use crate::event::Event;

/// An event the serializer refused to emit. Isolated per entry; the rest
/// of the document is still produced.
#[derive(Debug, Error)]
pub enum SerializeError {
	#[error("event ends before it starts ({start} .. {end})")]
	InvertedInterval { start: String, end: String },
}

/// Render an ordered event list as an iCalendar document.
pub fn render_calendar(events: &[Event]) -> String {
	let mut cal = Calendar::new();
	cal.name("APU Timetable");

	for event in events {
		match to_vevent(event) {
			Ok(vevent) => {
				cal.push(vevent);
			}
			Err(err) => log::warn!(subject = event.subject.as_str(), "skipping calendar entry: {err}"),
		}
	}

	cal.done().to_string()
}

fn to_vevent(event: &Event) -> Result<icalendar::Event, SerializeError> {
	if event.end < event.start {
		return Err(SerializeError::InvertedInterval {
			start: event.start.to_rfc3339(),
			end: event.end.to_rfc3339(),
		});
	}

	Ok(icalendar::Event::new()
		.summary(&event.subject)
		.location(&event.location)
		.description(&event.description)
		.starts(event.start.with_timezone(&Utc))
		.ends(event.end.with_timezone(&Utc))
		.done())
}

#[cfg(test)]
mod tests {
	use chrono::TimeZone;
	use icalendar::DatePerhapsTime;

	use super::*;
	use crate::event::CAMPUS_TZ;

	fn event(day: u32, subject: &str) -> Event {
		Event {
			start: CAMPUS_TZ.with_ymd_and_hms(2025, 1, day, 9, 0, 0).unwrap(),
			end: CAMPUS_TZ.with_ymd_and_hms(2025, 1, day, 11, 0, 0).unwrap(),
			subject: subject.to_owned(),
			location: "C1, Block A".to_owned(),
			description: "Course Code: CT101\nLecturer: Dr. X".to_owned(),
		}
	}

	fn parse_back(text: &str) -> Vec<icalendar::Event> {
		let unfolded = icalendar::parser::unfold(text);
		let cal: Calendar = icalendar::parser::read_calendar(&unfolded)
			.expect("generated calendar must parse")
			.into();
		cal.components.into_iter()
			.filter_map(|c| c.as_event().cloned())
			.collect()
	}

	fn start_utc(vevent: &icalendar::Event) -> Option<chrono::DateTime<Utc>> {
		match vevent.get_start() {
			Some(DatePerhapsTime::DateTime(cdt)) => cdt.try_into_utc(),
			_ => None,
		}
	}

	#[test]
	fn round_trip_preserves_count_and_fields() {
		let events = vec![event(6, "Intro to CT"), event(7, "Networks")];
		let text = render_calendar(&events);

		let parsed = parse_back(&text);
		assert_eq!(parsed.len(), events.len());

		for (vevent, event) in parsed.iter().zip(&events) {
			assert_eq!(vevent.get_summary(), Some(event.subject.as_str()));
			assert_eq!(vevent.get_location(), Some(event.location.as_str()));
			assert_eq!(start_utc(vevent), Some(event.start.with_timezone(&Utc)));
		}
	}

	#[test]
	fn times_are_emitted_in_utc() {
		let text = render_calendar(&[event(6, "Intro to CT")]);
		// 09:00 Kuala Lumpur is 01:00 UTC
		assert!(text.contains("20250106T010000Z"));
	}

	#[test]
	fn inverted_event_is_skipped_not_fatal() {
		let good = event(6, "Intro to CT");
		let mut bad = event(7, "Backwards");
		std::mem::swap(&mut bad.start, &mut bad.end);

		let parsed = parse_back(&render_calendar(&[good.clone(), bad]));
		assert_eq!(parsed.len(), 1);
		assert_eq!(parsed[0].get_summary(), Some(good.subject.as_str()));
	}

	#[test]
	fn empty_snapshot_renders_an_empty_calendar() {
		let text = render_calendar(&[]);
		assert!(text.contains("BEGIN:VCALENDAR"));
		assert!(!text.contains("BEGIN:VEVENT"));
	}
}
