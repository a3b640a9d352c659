//! Account broker server binary.

// crates.io
use color_eyre::Result;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
// self
use account_broker::{
	config::Config,
	obs,
	server::{self, AppState},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	obs::init_tracing();

	let config = Config::from_env()?;

	tracing::info!(?config, "Configuration loaded.");

	if config.secret.is_none() {
		tracing::warn!("APP_SECRET is not set; every request will be rejected.");
	}

	let broker = config.build_broker()?;
	let shutdown = CancellationToken::new();

	tokio::spawn({
		let shutdown = shutdown.clone();

		async move {
			match tokio::signal::ctrl_c().await {
				Ok(()) => tracing::info!("Shutdown requested."),
				Err(e) => tracing::error!(error = %e, "Failed to listen for the shutdown signal."),
			}

			shutdown.cancel();
		}
	});

	if let Some(period) = config.auto_refresh {
		let broker = broker.clone();
		let shutdown = shutdown.clone();

		tokio::spawn(async move { broker.auto_refresh(period, &shutdown).await });
	}

	let listener = TcpListener::bind(config.bind).await?;

	tracing::info!(addr = %listener.local_addr()?, adapter = broker.adapter.name(), "Listening.");

	server::serve(listener, AppState::new(broker, config.secret.clone(), shutdown)).await?;

	Ok(())
}
