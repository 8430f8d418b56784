// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Environment-based client configuration.
//!
//! | Variable | Builder setting |
//! |---|---|
//! | `LOOM_TELEMETRY_SERVER_URL` | [`server_url`](TelemetryClientBuilder::server_url) |
//! | `LOOM_TELEMETRY_PRODUCT` | [`product`](TelemetryClientBuilder::product) |
//! | `LOOM_TELEMETRY_DEVICE_ID` | [`device_id`](TelemetryClientBuilder::device_id) |
//! | `LOOM_TELEMETRY_USER_ID` | [`user_id`](TelemetryClientBuilder::user_id) |
//! | `LOOM_TELEMETRY_BATCH_SIZE` | [`batch_size`](TelemetryClientBuilder::batch_size) |
//! | `LOOM_TELEMETRY_FLUSH_INTERVAL_MS` | [`flush_interval`](TelemetryClientBuilder::flush_interval) |
//! | `LOOM_TELEMETRY_QUEUE_CAPACITY` | [`queue_capacity`](TelemetryClientBuilder::queue_capacity) |
//! | `LOOM_TELEMETRY_TIMEOUT_MS` | [`request_timeout`](TelemetryClientBuilder::request_timeout) |
//! | `LOOM_TELEMETRY_DEBUG` | [`debug`](TelemetryClientBuilder::debug) |
//! | `LOOM_TELEMETRY_SECRET_KEY` / `LOOM_TELEMETRY_SECRET_KEY_FILE` | [`secret_key`](TelemetryClientBuilder::secret_key) |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use std::{env, fs};

use zeroize::Zeroizing;

use crate::cipher::{CipherError, SecretKey};
use crate::client::TelemetryClientBuilder;
use crate::error::{Result, TelemetryError};

pub const SERVER_URL_VAR: &str = "LOOM_TELEMETRY_SERVER_URL";
pub const PRODUCT_VAR: &str = "LOOM_TELEMETRY_PRODUCT";
pub const DEVICE_ID_VAR: &str = "LOOM_TELEMETRY_DEVICE_ID";
pub const USER_ID_VAR: &str = "LOOM_TELEMETRY_USER_ID";
pub const BATCH_SIZE_VAR: &str = "LOOM_TELEMETRY_BATCH_SIZE";
pub const FLUSH_INTERVAL_VAR: &str = "LOOM_TELEMETRY_FLUSH_INTERVAL_MS";
pub const QUEUE_CAPACITY_VAR: &str = "LOOM_TELEMETRY_QUEUE_CAPACITY";
pub const TIMEOUT_VAR: &str = "LOOM_TELEMETRY_TIMEOUT_MS";
pub const DEBUG_VAR: &str = "LOOM_TELEMETRY_DEBUG";
pub const SECRET_KEY_VAR: &str = "LOOM_TELEMETRY_SECRET_KEY";

impl TelemetryClientBuilder {
	/// Creates a builder from `LOOM_TELEMETRY_*` environment variables.
	///
	/// Unset variables keep their defaults. The secret key is read from the
	/// file named by `LOOM_TELEMETRY_SECRET_KEY_FILE` when set, otherwise from
	/// `LOOM_TELEMETRY_SECRET_KEY`.
	pub fn from_env() -> Result<Self> {
		Self::from_lookup(|var| env::var(var).ok())
	}

	/// Like [`from_env`](Self::from_env) with a custom variable source.
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
		let mut builder = Self::new();

		if let Some(url) = lookup(SERVER_URL_VAR) {
			builder = builder.server_url(url);
		}
		if let Some(product) = lookup(PRODUCT_VAR) {
			builder = builder.product(product);
		}
		if let Some(device_id) = lookup(DEVICE_ID_VAR) {
			builder = builder.device_id(device_id);
		}
		if let Some(user_id) = lookup(USER_ID_VAR) {
			builder = builder.user_id(user_id);
		}
		if let Some(size) = parse_var(&lookup, BATCH_SIZE_VAR)? {
			builder = builder.batch_size(size);
		}
		if let Some(ms) = parse_var(&lookup, FLUSH_INTERVAL_VAR)? {
			builder = builder.flush_interval(Duration::from_millis(ms));
		}
		if let Some(capacity) = parse_var(&lookup, QUEUE_CAPACITY_VAR)? {
			builder = builder.queue_capacity(capacity);
		}
		if let Some(ms) = parse_var(&lookup, TIMEOUT_VAR)? {
			builder = builder.request_timeout(Duration::from_millis(ms));
		}
		if let Some(debug) = lookup(DEBUG_VAR) {
			builder = builder.debug(parse_flag(DEBUG_VAR, &debug)?);
		}
		if let Some(key) = load_secret(&lookup, SECRET_KEY_VAR)? {
			builder = builder.secret_key(key);
		}

		Ok(builder)
	}
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Result<Option<T>> {
	let Some(raw) = lookup(var) else {
		return Ok(None);
	};
	raw.trim()
		.parse()
		.map(Some)
		.map_err(|_| TelemetryError::InvalidConfig(format!("{var} must be a number, got {raw:?}")))
}

fn parse_flag(var: &str, raw: &str) -> Result<bool> {
	match raw.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"" | "0" | "false" | "no" | "off" => Ok(false),
		_ => Err(TelemetryError::InvalidConfig(format!(
			"{var} must be a boolean, got {raw:?}"
		))),
	}
}

/// `VAR_FILE` wins over `VAR`; one trailing newline is stripped from files.
fn load_secret(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Result<Option<SecretKey>> {
	let file_var = format!("{var}_FILE");

	if let Some(path) = lookup(&file_var) {
		if path.is_empty() {
			return Err(TelemetryError::InvalidConfig(format!(
				"secret file path in {file_var} is empty"
			)));
		}
		let path = PathBuf::from(path);
		let content = Zeroizing::new(fs::read_to_string(&path).map_err(|e| {
			TelemetryError::InvalidConfig(format!(
				"failed to read secret file at {}: {e}",
				path.display()
			))
		})?);
		let secret = content.strip_suffix('\n').unwrap_or(&content);
		return non_empty_key(secret).map(Some);
	}

	match lookup(var) {
		Some(secret) => non_empty_key(&Zeroizing::new(secret)).map(Some),
		None => Ok(None),
	}
}

fn non_empty_key(secret: &str) -> Result<SecretKey> {
	if secret.is_empty() {
		return Err(TelemetryError::InvalidKey(CipherError::EmptyKey));
	}
	Ok(SecretKey::new(secret))
}
