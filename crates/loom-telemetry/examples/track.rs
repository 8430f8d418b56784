// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Example: Track events with the loom-telemetry SDK.
//!
//! Run with:
//!   LOOM_TELEMETRY_SERVER_URL=http://localhost:8080 \
//!   LOOM_TELEMETRY_PRODUCT=example \
//!   cargo run --example track -p loom-telemetry

use std::time::Duration;

use loom_telemetry::{Diagnostic, Properties, TelemetryClientBuilder};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("loom_telemetry=debug")),
		)
		.init();

	let client = TelemetryClientBuilder::from_env()?
		.flush_interval(Duration::from_secs(2))
		.debug(true)
		.diagnostic_sink(|d: &Diagnostic<'_>| println!("  diagnostic: {d}"))
		.build()?;

	println!("Telemetry client ready");
	println!("  Server: {}", client.server_url());
	println!("  Device: {}", client.device_id());
	println!("  Session: {}", client.session_id());

	client.report_install_with_callback(|result| match result {
		Ok(()) => println!("Install reported"),
		Err(e) => println!("Install report failed: {e}"),
	});

	client.track_app_launch(Properties::new().insert("example", true));
	client.set_user_id("example_user").await;

	for i in 0..5 {
		client.track(
			"button_clicked",
			Properties::new().insert("button", "checkout").insert("attempt", i),
		);
	}
	client.track_event("settings", "toggle", "dark_mode", 1.0);

	println!("Queued {} events, flushing...", client.queue_len());
	client.flush().await;

	if let Err(e) = client.track_app_exit(Properties::new()).await {
		println!("app_exit failed: {e}");
	}

	client.close().await?;
	println!("Client closed");

	Ok(())
}
