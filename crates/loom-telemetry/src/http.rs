// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP client with a consistent User-Agent header.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};

use crate::error::{Result, TelemetryError};

const SDK_NAME: &str = "loom-telemetry";
const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the SDK User-Agent string.
///
/// Format: `loom-telemetry/{version}`
pub fn user_agent() -> String {
	format!("{SDK_NAME}/{SDK_VERSION}")
}

/// Creates a client builder with the SDK User-Agent header.
pub fn builder() -> ClientBuilder {
	Client::builder().user_agent(user_agent())
}

/// Creates a client whose requests time out after `timeout`.
pub fn new_client_with_timeout(timeout: Duration) -> Result<Client> {
	builder()
		.timeout(timeout)
		.build()
		.map_err(|e| TelemetryError::InvalidConfig(format!("failed to build HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn user_agent_has_correct_format() {
		let ua = user_agent();
		let parts: Vec<&str> = ua.split('/').collect();

		assert_eq!(parts, vec!["loom-telemetry", env!("CARGO_PKG_VERSION")]);
	}

	#[test]
	fn client_builds_with_timeout() {
		assert!(new_client_with_timeout(Duration::from_secs(1)).is_ok());
	}
}
