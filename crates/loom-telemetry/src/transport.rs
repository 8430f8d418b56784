// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Single-request HTTP transport with optional payload encryption.

use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde::Serialize;
use tracing::debug;

use crate::cipher::{EncryptedResponse, Envelope, SecretKey};
use crate::error::{Result, TelemetryError};

/// Marks a request body as an [`Envelope`].
pub const ENCRYPTED_HEADER: &str = "X-Encrypted";
/// Asks the collector to encrypt its reply.
pub const RESPONSE_ENCRYPT_HEADER: &str = "X-Response-Encrypt";

/// Posts JSON payloads to the collector.
///
/// With a key configured, every request body is sealed into an [`Envelope`]
/// and encrypted replies are opened transparently. Responses are classified
/// by status: 5xx and transport failures are retryable, everything else is
/// not.
#[derive(Clone)]
pub struct Transport {
	http: Client,
	key: Option<SecretKey>,
}

impl Transport {
	pub fn new(http: Client, key: Option<SecretKey>) -> Self {
		Self { http, key }
	}

	pub fn is_encrypted(&self) -> bool {
		self.key.is_some()
	}

	/// Serializes `payload` and sends it, see [`Transport::send`].
	pub async fn send_json<T: Serialize + ?Sized>(&self, url: &str, payload: &T) -> Result<Vec<u8>> {
		let body = serde_json::to_vec(payload).map_err(TelemetryError::Marshal)?;
		self.send(url, &body).await
	}

	/// Posts `payload` to `url` and returns the (decrypted) response body.
	pub async fn send(&self, url: &str, payload: &[u8]) -> Result<Vec<u8>> {
		let body = match &self.key {
			Some(key) => {
				let envelope = Envelope::seal(key, payload, Utc::now().timestamp())
					.map_err(TelemetryError::Encryption)?;
				serde_json::to_vec(&envelope).map_err(TelemetryError::Marshal)?
			}
			None => payload.to_vec(),
		};

		let mut request = self
			.http
			.post(url)
			.header(CONTENT_TYPE, "application/json")
			.body(body);
		if self.key.is_some() {
			request = request
				.header(ENCRYPTED_HEADER, "1")
				.header(RESPONSE_ENCRYPT_HEADER, "1");
		}

		let response = request
			.send()
			.await
			.map_err(|e| transport_error(url, e))?;
		let status = response.status();
		let bytes = response
			.bytes()
			.await
			.map_err(|e| transport_error(url, e))?;

		debug!(url = %url, status = status.as_u16(), len = bytes.len(), "Telemetry request completed");

		if status.is_success() {
			return self.open_response(&bytes);
		}

		let message = self
			.open_response(&bytes)
			.unwrap_or_else(|_| bytes.to_vec());
		Err(TelemetryError::network(
			Method::POST,
			url,
			status.as_u16(),
			TelemetryError::ServerResponse(String::from_utf8_lossy(&message).into_owned()),
			status.is_server_error(),
		))
	}

	/// Decrypts `body` if it is an encrypted reply, otherwise returns it as-is.
	fn open_response(&self, body: &[u8]) -> Result<Vec<u8>> {
		let Some(key) = &self.key else {
			return Ok(body.to_vec());
		};
		if !is_flagged_encrypted(body) {
			return Ok(body.to_vec());
		}
		let reply: EncryptedResponse = serde_json::from_slice(body).map_err(TelemetryError::Unmarshal)?;
		let envelope = Envelope {
			data: reply.data,
			timestamp: reply.timestamp,
		};
		envelope.open(key).map_err(TelemetryError::Decryption)
	}
}

/// True when `body` is a JSON object carrying `"encrypted": true`.
fn is_flagged_encrypted(body: &[u8]) -> bool {
	serde_json::from_slice::<serde_json::Value>(body)
		.ok()
		.and_then(|value| value.get("encrypted").and_then(serde_json::Value::as_bool))
		.unwrap_or(false)
}

fn transport_error(url: &str, err: reqwest::Error) -> TelemetryError {
	let cause = if err.is_timeout() {
		TelemetryError::NetworkTimeout
	} else {
		TelemetryError::NetworkFailure(err.to_string())
	};
	TelemetryError::network(Method::POST, url, 0, cause, true)
}

impl std::fmt::Debug for Transport {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Transport")
			.field("encrypted", &self.is_encrypted())
			.finish_non_exhaustive()
	}
}
