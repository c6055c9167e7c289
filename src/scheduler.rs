use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use tracing as log;

use crate::event::CAMPUS_TZ;
use crate::refresh::RefreshCoordinator;
use crate::store::Stores;

const TICK: Duration = Duration::from_secs(60);

/// What one scheduler wake decided to do. Staleness and configured
/// times-of-day trigger independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
	Stale,
	Daily,
}

/// Pure per-tick decision. Daily matching is minute-resolution; the 60s
/// tick can land twice inside one wall-clock minute, so `last_daily`
/// remembers the (date, entry) that already fired.
pub fn tick_trigger(
	now_minute: &str,
	today: NaiveDate,
	stale: bool,
	times: &BTreeSet<String>,
	last_daily: &mut Option<(NaiveDate, String)>,
) -> Option<Trigger> {
	if times.contains(now_minute) {
		let fired = (today, now_minute.to_owned());
		if last_daily.as_ref() != Some(&fired) {
			*last_daily = Some(fired);
			return Some(Trigger::Daily);
		}
	}
	if stale {
		return Some(Trigger::Stale);
	}
	None
}

/// Background refresh loop: one forced cycle at startup, then a fixed tick
/// re-evaluating staleness and the configured daily times. Survives any
/// upstream failure; only cancellation ends it.
pub async fn run(coordinator: Arc<RefreshCoordinator>, stores: Stores, run_token: CancellationToken) {
	log::info!("scheduler started, running initial refresh");
	coordinator.ensure_fresh(true).await;

	let mut tick = time::interval_at(time::Instant::now() + TICK, TICK);
	tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
	let mut last_daily = None;

	loop {
		tokio::select! {
			_ = tick.tick() => {}
			_ = run_token.cancelled() => {
				log::debug!("scheduler shutting down...");
				return;
			}
		}

		// config is re-read every wake so edits apply without a restart
		let conf = stores.load_config();
		let now = Utc::now().with_timezone(&CAMPUS_TZ);
		let stale = coordinator.is_stale().await;

		match tick_trigger(&now.format("%H:%M").to_string(), now.date_naive(), stale, &conf.updates_per_day, &mut last_daily) {
			Some(Trigger::Daily) => {
				log::info!(at = %now.format("%H:%M"), "scheduled daily refresh");
				coordinator.ensure_fresh(true).await;
			}
			Some(Trigger::Stale) => {
				log::debug!("cache stale, refreshing");
				coordinator.ensure_fresh(false).await;
			}
			None => {}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn times(entries: &[&str]) -> BTreeSet<String> {
		entries.iter().map(|s| s.to_string()).collect()
	}

	fn day() -> NaiveDate {
		NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()
	}

	#[test]
	fn matching_minute_fires_daily() {
		let mut last = None;
		let trigger = tick_trigger("08:00", day(), false, &times(&["08:00", "16:00"]), &mut last);
		assert_eq!(trigger, Some(Trigger::Daily));
		assert_eq!(last, Some((day(), "08:00".to_owned())));
	}

	#[test]
	fn same_minute_does_not_fire_twice() {
		let mut last = None;
		let schedule = times(&["08:00"]);

		assert_eq!(tick_trigger("08:00", day(), false, &schedule, &mut last), Some(Trigger::Daily));
		assert_eq!(tick_trigger("08:00", day(), false, &schedule, &mut last), None);
		// but the same entry fires again on the next day
		let tomorrow = day().succ_opt().unwrap();
		assert_eq!(tick_trigger("08:00", tomorrow, false, &schedule, &mut last), Some(Trigger::Daily));
	}

	#[test]
	fn staleness_fires_independently() {
		let mut last = None;
		assert_eq!(tick_trigger("09:30", day(), true, &times(&["08:00"]), &mut last), Some(Trigger::Stale));
		assert_eq!(tick_trigger("09:30", day(), false, &times(&["08:00"]), &mut last), None);
	}

	#[test]
	fn daily_wins_over_staleness_but_dedup_falls_through() {
		let mut last = None;
		let schedule = times(&["08:00"]);

		assert_eq!(tick_trigger("08:00", day(), true, &schedule, &mut last), Some(Trigger::Daily));
		// already fired this minute, but the cache is still stale
		assert_eq!(tick_trigger("08:00", day(), true, &schedule, &mut last), Some(Trigger::Stale));
	}

	#[test]
	fn unparseable_entries_are_inert() {
		let mut last = None;
		assert_eq!(tick_trigger("08:00", day(), false, &times(&["8 o'clock"]), &mut last), None);
	}
}
