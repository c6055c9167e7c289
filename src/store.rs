use std::{
	collections::{BTreeSet, HashMap},
	fs, io,
	path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use tracing as log;

/// Refresh parameters editable at runtime. Persisted as JSON and re-read at
/// the start of every refresh cycle, so edits apply without a restart.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TimetableConfig {
	pub intake: String,
	pub group: String,
	pub weeks_ahead: u32,
	pub updates_per_day: BTreeSet<String>,
}

impl Default for TimetableConfig {
	fn default() -> Self {
		Self {
			intake: "APUFEFREI2501".into(),
			group: "G1".into(),
			weeks_ahead: 4,
			updates_per_day: BTreeSet::from(["08:00".to_owned(), "16:00".to_owned()]),
		}
	}
}

/// Subject code to display name lookup. Unmapped codes resolve to themselves.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SubjectMap(HashMap<String, String>);

impl SubjectMap {
	pub fn resolve<'a>(&'a self, code: &'a str) -> &'a str {
		self.0.get(code).map(String::as_str).unwrap_or(code)
	}
}

impl From<HashMap<String, String>> for SubjectMap {
	fn from(map: HashMap<String, String>) -> Self {
		Self(map)
	}
}

/// File-backed config and subject-mapping stores. Loads never fail the
/// caller: a missing config is defaulted and persisted for editing, an
/// unreadable one falls back to defaults with a logged error.
#[derive(Debug, Clone)]
pub struct Stores {
	config_path: PathBuf,
	mapping_path: PathBuf,
}

impl Stores {
	pub fn new(config_path: PathBuf, mapping_path: PathBuf) -> Self {
		Self { config_path, mapping_path }
	}

	pub fn load_config(&self) -> TimetableConfig {
		match read_json::<TimetableConfig>(&self.config_path) {
			Ok(Some(conf)) => conf,
			Ok(None) => {
				let conf = TimetableConfig::default();
				if let Err(err) = self.save_config(&conf) {
					log::warn!("failed to persist default config: {err:#}");
				}
				conf
			}
			Err(err) => {
				log::error!("unreadable config {}: {err:#}, using defaults", self.config_path.display());
				TimetableConfig::default()
			}
		}
	}

	pub fn save_config(&self, conf: &TimetableConfig) -> Result<()> {
		write_json(&self.config_path, conf)
			.with_context(|| format!("failed to save config {}", self.config_path.display()))
	}

	pub fn load_mapping(&self) -> SubjectMap {
		match read_json::<SubjectMap>(&self.mapping_path) {
			Ok(Some(map)) => map,
			Ok(None) => SubjectMap::default(),
			Err(err) => {
				log::error!("unreadable subject mapping {}: {err:#}, using empty mapping", self.mapping_path.display());
				SubjectMap::default()
			}
		}
	}

	pub fn save_mapping(&self, mapping: &SubjectMap) -> Result<()> {
		write_json(&self.mapping_path, mapping)
			.with_context(|| format!("failed to save subject mapping {}", self.mapping_path.display()))
	}
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
	let data = match fs::read_to_string(path) {
		Ok(v) => v,
		Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
		Err(err) => return Err(err).context("failed to read file"),
	};
	serde_json::from_str(&data).map(Some).context("failed to parse JSON")
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
	let data = serde_json::to_string_pretty(value).context("failed to encode JSON")?;
	fs::write(path, data).context("failed to write file")
}

#[cfg(test)]
mod tests {
	use super::*;

	fn stores_in(dir: &tempfile::TempDir) -> Stores {
		Stores::new(dir.path().join("config.json"), dir.path().join("subject_mapping.json"))
	}

	#[test]
	fn first_load_persists_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let stores = stores_in(&dir);

		let conf = stores.load_config();
		assert_eq!(conf, TimetableConfig::default());
		assert!(dir.path().join("config.json").exists());

		// the persisted file round-trips
		assert_eq!(stores.load_config(), conf);
	}

	#[test]
	fn malformed_config_falls_back_to_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let stores = stores_in(&dir);

		fs::write(dir.path().join("config.json"), "{ not json").unwrap();
		assert_eq!(stores.load_config(), TimetableConfig::default());
	}

	#[test]
	fn config_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let stores = stores_in(&dir);

		let conf = TimetableConfig {
			intake: "APUFEFREI2501".into(),
			group: "G2".into(),
			weeks_ahead: 1,
			updates_per_day: BTreeSet::from(["07:30".to_owned()]),
		};
		stores.save_config(&conf).unwrap();
		assert_eq!(stores.load_config(), conf);
	}

	#[test]
	fn missing_mapping_is_empty() {
		let dir = tempfile::tempdir().unwrap();
		let stores = stores_in(&dir);

		let mapping = stores.load_mapping();
		assert_eq!(mapping.resolve("CT101"), "CT101");
		// absence is not persisted, unlike the config
		assert!(!dir.path().join("subject_mapping.json").exists());
	}

	#[test]
	fn mapping_resolves_known_codes() {
		let dir = tempfile::tempdir().unwrap();
		let stores = stores_in(&dir);

		let mapping = SubjectMap::from(HashMap::from([("CT101".to_owned(), "Intro to CT".to_owned())]));
		stores.save_mapping(&mapping).unwrap();

		let loaded = stores.load_mapping();
		assert_eq!(loaded.resolve("CT101"), "Intro to CT");
		assert_eq!(loaded.resolve("XX999"), "XX999");
	}
}
