use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, Utc};
use tokio::sync::Mutex;

use tracing as log;

use crate::apu::WeekSource;
use crate::cache::CacheStore;
use crate::event::CAMPUS_TZ;
use crate::parse;
use crate::store::Stores;

/// Orchestrates one full refresh cycle (enumerate weeks, fetch, parse,
/// commit) under single-flight protection.
pub struct RefreshCoordinator {
	cache: Arc<CacheStore>,
	source: Arc<dyn WeekSource>,
	stores: Stores,
	max_age: Duration,
	flight: Mutex<()>,
}

impl RefreshCoordinator {
	pub fn new(cache: Arc<CacheStore>, source: Arc<dyn WeekSource>, stores: Stores, max_age: Duration) -> Self {
		Self { cache, source, stores, max_age, flight: Mutex::new(()) }
	}

	pub async fn is_stale(&self) -> bool {
		self.cache.is_stale(self.max_age).await
	}

	/// Single-flight refresh. Concurrent callers coalesce on the in-flight
	/// lock: whoever holds it runs the cycle to completion, everyone else
	/// waits for that commit and re-checks staleness instead of starting a
	/// second fetch round. A forced call always runs a cycle of its own
	/// once the lock is free.
	pub async fn ensure_fresh(&self, force: bool) {
		if !force && !self.is_stale().await {
			return;
		}

		let _flight = self.flight.lock().await;
		if !force && !self.is_stale().await {
			// the cycle we waited on already freshened the cache
			return;
		}

		self.run_cycle().await;
	}

	/// One cycle, not cancellable. Per-week failures are isolated; only a
	/// cycle in which every attempted week failed leaves the previous
	/// snapshot in place.
	async fn run_cycle(&self) {
		let conf = self.stores.load_config();
		let subjects = self.stores.load_mapping();

		let today = Utc::now().with_timezone(&CAMPUS_TZ).date_naive();
		let weeks = mondays(today, conf.weeks_ahead);

		let mut events = Vec::new();
		let mut failed = 0usize;
		for &monday in &weeks {
			let html = match self.source.fetch_week(monday, &conf.intake, &conf.group).await {
				Ok(v) => v,
				Err(err) => {
					log::error!(week = %monday, "failed to fetch timetable: {err}");
					failed += 1;
					continue;
				}
			};
			events.extend(parse::parse_timetable(&html, &subjects));
		}

		if failed == weeks.len() && !weeks.is_empty() {
			log::error!("refresh cycle failed for all {} weeks, keeping previous snapshot", weeks.len());
			return;
		}

		let count = events.len();
		self.cache.replace(events).await;
		log::info!(event_count = count, weeks_ok = weeks.len() - failed, "cache updated");
	}
}

/// Week-start dates from the current week's Monday, `weeks` weeks out.
pub fn mondays(today: NaiveDate, weeks: u32) -> Vec<NaiveDate> {
	let current = today - Duration::days(today.weekday().num_days_from_monday() as i64);
	(0..weeks).map(|i| current + Duration::weeks(i as i64)).collect()
}
