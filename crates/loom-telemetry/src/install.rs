// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Install reporting and application lifecycle events.

use chrono::Utc;
use loom_telemetry_core::{Event, HostInfo, InstallInfo};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::client::{TelemetryClient, INSTALLS_PATH};
use crate::diagnostics::Diagnostic;
use crate::error::{Result, TelemetryError};
use crate::properties::Properties;

pub const APP_LAUNCH_EVENT: &str = "app_launch";
pub const APP_EXIT_EVENT: &str = "app_exit";

impl TelemetryClient {
	/// Reports this installation in the background. The outcome is logged
	/// and, in debug mode, passed to the diagnostic sink.
	pub fn report_install(&self) -> JoinHandle<()> {
		self.report_install_with_callback(|_| {})
	}

	/// Reports this installation in the background and hands the outcome to
	/// `callback` on the spawned task.
	pub fn report_install_with_callback<F>(&self, callback: F) -> JoinHandle<()>
	where
		F: FnOnce(Result<()>) + Send + 'static,
	{
		let client = self.clone();
		self.runtime().spawn(async move {
			let result = client.report_install_sync().await;
			callback(result);
		})
	}

	/// Pushes a signed install record and waits for the collector's reply.
	pub async fn report_install_sync(&self) -> Result<()> {
		let result = self.push_install().await;
		match &result {
			Ok(()) => self.diagnostics().emit(Diagnostic::InstallReported),
			Err(error) => self.diagnostics().emit(Diagnostic::InstallFailed { error }),
		}
		result
	}

	async fn push_install(&self) -> Result<()> {
		if self.is_closed() {
			return Err(TelemetryError::operation("report_install", TelemetryError::ClientClosed));
		}

		let host = HostInfo::collect()
			.map_err(|e| TelemetryError::operation("report_install", e.into()))?;
		let info = InstallInfo::new(self.product(), self.device_id(), Utc::now().timestamp(), &host);

		debug!(product = %info.product, device_id = %info.device_id, "Reporting install");

		self.transport()
			.send_json(&self.endpoint(INSTALLS_PATH), &info)
			.await
			.map(|_| ())
			.map_err(|e| TelemetryError::wrap("report_install", e))
	}

	/// Queues an `app_launch` event carrying session and host details.
	///
	/// Session and host fields override caller properties with the same key.
	pub fn track_app_launch(&self, properties: Properties) -> bool {
		let mut automatic = Properties::new()
			.insert("session_id", self.session_id())
			.insert("device_id", self.device_id())
			.insert("session_started", self.session_started().timestamp());

		match HostInfo::collect() {
			Ok(host) => {
				automatic.set("hostname", host.hostname);
				automatic.set("os", host.os);
				automatic.set("platform", host.platform);
				if let Some(uptime) = host.uptime_secs {
					automatic.set("uptime", uptime);
				}
			}
			Err(e) => debug!(error = %e, "Host info unavailable for app launch"),
		}

		let properties = properties.merge(automatic);
		self.enqueue(Event::new(APP_LAUNCH_EVENT).with_properties(properties.into_map()))
	}

	/// Sends an `app_exit` event immediately with the session duration in
	/// seconds.
	pub async fn track_app_exit(&self, properties: Properties) -> Result<()> {
		let now = Utc::now();
		let duration = (now - self.session_started()).num_milliseconds() as f64 / 1000.0;
		let properties = properties.merge(
			Properties::new()
				.insert("session_duration", duration)
				.insert("session_id", self.session_id())
				.insert("device_id", self.device_id()),
		);

		let mut event = Event::new(APP_EXIT_EVENT).with_properties(properties.into_map());
		event.stamp(now);
		self.send_now("track_app_exit", event).await
	}
}
