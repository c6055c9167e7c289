use std::{future::IntoFuture, path::PathBuf, sync::Arc};

use clap::Parser;
use figment::{
	providers::{Env, Format, Serialized, Toml},
	Figment,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use anyhow::{Context, Result};

use tracing as log;
use tracing_subscriber;

mod apu;
mod cache;
mod event;
mod ics;
mod parse;
mod refresh;
mod scheduler;
mod server;
mod store;

#[derive(Parser, Debug, Serialize)]
#[clap(about, version)]
struct Options {
	/// Config path
	#[clap(short = 'C', long = "config", default_value = "./apu-calendar.toml")]
	config_path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize)]
struct Settings {
	listen_addr: String,
	/// Snapshot age beyond which readers trigger a refresh, in seconds
	cache_duration: u64,
	upstream_url: String,
	timetable_config: PathBuf,
	subject_mapping: PathBuf,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			listen_addr: "0.0.0.0:5000".into(),
			cache_duration: 3600,
			upstream_url: apu::DEFAULT_BASE_URL.into(),
			timetable_config: "./config.json".into(),
			subject_mapping: "./subject_mapping.json".into(),
		}
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	// Config init
	let opts = Options::parse();

	let fig = Figment::new()
		.merge(Serialized::defaults(Settings::default()))
		.merge(Toml::file(&opts.config_path))
		.merge(Env::prefixed("APU_CAL_"));

	let settings: Settings = fig.extract()?;

	// Logging system init
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
				.add_directive("apu_calendar=debug".parse()?)
				.add_directive("reqwest=debug".parse()?),
		)
		.compact()
		.init();

	fig.metadata().for_each(|md| {
		if let Some(src) = md.source.as_ref() {
			log::debug!("using config from {} - {}", md.name, src);
		}
	});

	log::debug!("settings: {:?}", &settings);

	let stores = store::Stores::new(settings.timetable_config.clone(), settings.subject_mapping.clone());
	let cache = Arc::new(cache::CacheStore::new());
	let session = apu::Session::create(&settings.upstream_url)?;
	let coordinator = Arc::new(refresh::RefreshCoordinator::new(
		cache.clone(),
		Arc::new(session),
		stores.clone(),
		chrono::Duration::seconds(settings.cache_duration as i64),
	));

	let scheduler_run = CancellationToken::new();
	let scheduler_task = tokio::spawn(scheduler::run(
		coordinator.clone(),
		stores.clone(),
		scheduler_run.child_token(),
	));

	let app = server::router(server::AppState { cache, coordinator, stores });

	let listener = tokio::net::TcpListener::bind(&settings.listen_addr)
		.await
		.with_context(|| format!("failed to bind {}", settings.listen_addr))?;
	log::info!("listening on http://{}", settings.listen_addr);

	tokio::select! {
		res = axum::serve(listener, app).into_future() => res.context("server failed")?,
		_ = tokio::signal::ctrl_c() => {
			log::debug!("SIGINT detected!");
		}
	}

	log::debug!("shutting down...");
	scheduler_run.cancel();
	scheduler_task.await.ok();

	log::info!("Have a nice day!");
	Ok(())
}
