use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest as http;
use thiserror::Error;
use tokio::time;

use tracing as log;

/// Default upstream endpoint serving the printable week view.
pub const DEFAULT_BASE_URL: &str = "https://api.apiit.edu.my/timetable-print/index.php";

/// A failed week retrieval. Isolated per week by the refresh cycle; the
/// week simply contributes no events.
#[derive(Debug, Error)]
pub enum FetchError {
	#[error("upstream returned {0}")]
	Status(http::StatusCode),
	#[error("request failed: {0}")]
	Transport(#[from] http::Error),
}

/// Source of one week's raw timetable document. The seam lets refresh
/// cycles run against a canned source in tests.
#[async_trait]
pub trait WeekSource: Send + Sync {
	async fn fetch_week(&self, monday: NaiveDate, intake: &str, group: &str) -> Result<String, FetchError>;
}

pub struct Session {
	client: http::Client,
	base_url: String,
}

impl Session {
	pub fn create(base_url: &str) -> Result<Self> {
		let client = http::ClientBuilder::new()
			.connect_timeout(time::Duration::from_secs(10))
			.timeout(time::Duration::from_secs(30))
			.build()
			.context("failed to init http client")?;

		Ok(Session { client, base_url: base_url.to_owned() })
	}
}

#[async_trait]
impl WeekSource for Session {
	async fn fetch_week(&self, monday: NaiveDate, intake: &str, group: &str) -> Result<String, FetchError> {
		let week = monday.format("%Y-%m-%d").to_string();
		log::debug!(week = %week, intake = intake, group = group, "fetching timetable");

		let res = self.client.get(&self.base_url)
			.query(&[
				("Week", week.as_str()),
				("Intake", intake),
				("Intake_Group", group),
				("print_request", "print_tt"),
			])
			.send()
			.await?;

		if !res.status().is_success() {
			return Err(FetchError::Status(res.status()));
		}

		Ok(res.text().await?)
	}
}
