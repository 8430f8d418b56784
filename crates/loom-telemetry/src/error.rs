// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types and retry classification for the telemetry SDK.
//!
//! Errors come in two structured shapes that can wrap any other error:
//!
//! - [`OperationError`]: which SDK operation failed, plus optional context
//! - [`NetworkError`]: which request failed, with its status code and whether
//!   resending the same payload is safe
//!
//! Everything else is a leaf. [`RetryableError::is_retryable`] walks the
//! chain, so wrapping depth never changes the classification.

use std::collections::BTreeMap;

use reqwest::Method;
use thiserror::Error;

use crate::cipher::CipherError;

/// Classifies errors as transient (safe to resend) or permanent.
pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

impl RetryableError for reqwest::Error {
	fn is_retryable(&self) -> bool {
		if self.is_timeout() || self.is_connect() {
			return true;
		}
		self.status().is_some_and(|status| status.is_server_error())
	}
}

/// Telemetry SDK errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
	#[error(transparent)]
	Operation(#[from] OperationError),

	#[error(transparent)]
	Network(#[from] NetworkError),

	#[error("invalid configuration: {0}")]
	InvalidConfig(String),

	#[error("invalid server URL")]
	InvalidServerUrl,

	#[error("invalid product name")]
	InvalidProductName,

	#[error("network timeout")]
	NetworkTimeout,

	#[error("network request failed: {0}")]
	NetworkFailure(String),

	#[error("encryption failed: {0}")]
	Encryption(#[source] CipherError),

	#[error("decryption failed: {0}")]
	Decryption(#[source] CipherError),

	#[error("invalid encryption key: {0}")]
	InvalidKey(#[source] CipherError),

	#[error("failed to marshal data: {0}")]
	Marshal(#[source] serde_json::Error),

	#[error("failed to unmarshal data: {0}")]
	Unmarshal(#[source] serde_json::Error),

	#[error("server response error: {0}")]
	ServerResponse(String),

	#[error("client is closed")]
	ClientClosed,

	#[error("host info unavailable: {0}")]
	HostInfo(#[from] loom_telemetry_core::CoreError),

	#[error("dispatcher task failed: {0}")]
	Dispatcher(#[from] tokio::task::JoinError),
}

/// An SDK operation that failed.
#[derive(Debug, Error)]
#[error("{op}: {source}{}", render_context(.context))]
pub struct OperationError {
	pub op: String,
	#[source]
	pub source: Box<TelemetryError>,
	pub context: BTreeMap<String, serde_json::Value>,
}

/// A failed HTTP exchange.
#[derive(Debug, Error)]
#[error("{method} {url}: {}{source}", render_status(.status))]
pub struct NetworkError {
	pub method: Method,
	pub url: String,
	/// Zero when no response was received.
	pub status: u16,
	#[source]
	pub source: Box<TelemetryError>,
	pub retryable: bool,
}

fn render_context(context: &BTreeMap<String, serde_json::Value>) -> String {
	if context.is_empty() {
		return String::new();
	}
	let pairs: Vec<String> = context.iter().map(|(k, v)| format!("{k}={v}")).collect();
	format!(" (context: {})", pairs.join(", "))
}

fn render_status(status: &u16) -> String {
	match status {
		0 => String::new(),
		code => format!("status {code}: "),
	}
}

impl TelemetryError {
	/// Wraps `err` with the name of the operation that produced it.
	pub fn operation(op: impl Into<String>, err: TelemetryError) -> Self {
		Self::operation_with_context(op, err, BTreeMap::new())
	}

	pub fn operation_with_context(
		op: impl Into<String>,
		err: TelemetryError,
		context: BTreeMap<String, serde_json::Value>,
	) -> Self {
		Self::Operation(OperationError {
			op: op.into(),
			source: Box::new(err),
			context,
		})
	}

	pub fn network(
		method: Method,
		url: impl Into<String>,
		status: u16,
		err: TelemetryError,
		retryable: bool,
	) -> Self {
		Self::Network(NetworkError {
			method,
			url: url.into(),
			status,
			source: Box::new(err),
			retryable,
		})
	}

	/// Adds operation context unless `err` is already an operation or
	/// network error, in which case it is returned unchanged.
	pub fn wrap(op: impl Into<String>, err: TelemetryError) -> Self {
		match err {
			Self::Operation(_) | Self::Network(_) => err,
			other => Self::operation(op, other),
		}
	}

	/// The innermost error, skipping every operation and network wrapper.
	pub fn root_cause(&self) -> &TelemetryError {
		match self {
			Self::Operation(e) => e.source.root_cause(),
			Self::Network(e) => e.source.root_cause(),
			other => other,
		}
	}

	/// The outermost network error in the chain, if any.
	pub fn network_error(&self) -> Option<&NetworkError> {
		match self {
			Self::Operation(e) => e.source.network_error(),
			Self::Network(e) => Some(e),
			_ => None,
		}
	}

	/// The HTTP status of the failed exchange, if a response was received.
	pub fn status(&self) -> Option<u16> {
		self.network_error()
			.map(|e| e.status)
			.filter(|status| *status != 0)
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self.root_cause(), Self::NetworkTimeout)
	}
}

impl RetryableError for TelemetryError {
	fn is_retryable(&self) -> bool {
		if let Some(network) = self.network_error() {
			return network.retryable;
		}
		matches!(
			self.root_cause(),
			Self::NetworkTimeout | Self::NetworkFailure(_)
		)
	}
}

/// Result type alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

#[cfg(test)]
mod tests {
	use super::*;
	use std::error::Error as _;

	fn marshal_error() -> serde_json::Error {
		serde_json::from_str::<serde_json::Value>("{not json").unwrap_err()
	}

	#[test]
	fn operation_error_display() {
		let err = TelemetryError::operation("track", TelemetryError::NetworkTimeout);

		assert_eq!(err.to_string(), "track: network timeout");
	}

	#[test]
	fn operation_error_display_with_context() {
		let context = BTreeMap::from([("event_count".to_string(), serde_json::json!(10))]);
		let err = TelemetryError::operation_with_context(
			"send_events",
			TelemetryError::ClientClosed,
			context,
		);

		assert_eq!(
			err.to_string(),
			"send_events: client is closed (context: event_count=10)"
		);
	}

	#[test]
	fn network_error_display() {
		let without_status = TelemetryError::network(
			Method::POST,
			"http://example.com/api/events/batch",
			0,
			TelemetryError::NetworkFailure("connection refused".to_string()),
			true,
		);
		let with_status = TelemetryError::network(
			Method::POST,
			"http://example.com/api/events/batch",
			500,
			TelemetryError::ServerResponse("boom".to_string()),
			true,
		);

		assert_eq!(
			without_status.to_string(),
			"POST http://example.com/api/events/batch: network request failed: connection refused"
		);
		assert_eq!(
			with_status.to_string(),
			"POST http://example.com/api/events/batch: status 500: server response error: boom"
		);
	}

	#[test]
	fn source_chain_reaches_root() {
		let err = TelemetryError::operation(
			"close",
			TelemetryError::network(Method::POST, "u", 0, TelemetryError::NetworkTimeout, true),
		);

		let network = err.source().unwrap();
		let root = network.source().unwrap();
		assert_eq!(root.to_string(), "network timeout");
		assert!(err.is_timeout());
	}

	#[test]
	fn retryable_statuses() {
		for (status, retryable) in [(500, true), (502, true), (503, true), (400, false), (404, false)] {
			let err = TelemetryError::network(
				Method::POST,
				"u",
				status,
				TelemetryError::ServerResponse(String::new()),
				(500..600).contains(&status),
			);
			assert_eq!(err.is_retryable(), retryable, "status {status}");
			assert_eq!(err.status(), Some(status));
		}
	}

	#[test]
	fn network_flag_wins_over_root_cause() {
		let err = TelemetryError::network(Method::POST, "u", 0, TelemetryError::NetworkTimeout, false);

		assert!(!err.is_retryable());
	}

	#[test]
	fn sentinels_are_retryable_at_any_depth() {
		let bare = TelemetryError::NetworkTimeout;
		let wrapped = TelemetryError::operation(
			"outer",
			TelemetryError::operation("inner", TelemetryError::NetworkFailure("reset".to_string())),
		);

		assert!(bare.is_retryable());
		assert!(wrapped.is_retryable());
	}

	#[test]
	fn non_network_errors_are_not_retryable() {
		let errors = [
			TelemetryError::Marshal(marshal_error()),
			TelemetryError::Unmarshal(marshal_error()),
			TelemetryError::Encryption(CipherError::InvalidPadding),
			TelemetryError::Decryption(CipherError::Empty),
			TelemetryError::InvalidConfig("batch size".to_string()),
			TelemetryError::ClientClosed,
			TelemetryError::InvalidKey(CipherError::EmptyKey),
			TelemetryError::operation("track", TelemetryError::ServerResponse("x".to_string())),
		];

		for err in errors {
			assert!(!err.is_retryable(), "{err} should not be retryable");
		}
	}

	#[test]
	fn wrap_is_idempotent() {
		let once = TelemetryError::wrap("flush", TelemetryError::ClientClosed);
		let twice = TelemetryError::wrap("close", once);

		match twice {
			TelemetryError::Operation(op) => {
				assert_eq!(op.op, "flush");
				assert!(matches!(*op.source, TelemetryError::ClientClosed));
			}
			other => panic!("unexpected error: {other:?}"),
		}
	}

	#[test]
	fn wrap_leaves_network_errors_alone() {
		let err = TelemetryError::network(Method::POST, "u", 503, TelemetryError::ServerResponse(String::new()), true);

		assert!(matches!(
			TelemetryError::wrap("send_events", err),
			TelemetryError::Network(_)
		));
	}

	#[test]
	fn status_is_none_without_response() {
		let err = TelemetryError::network(Method::POST, "u", 0, TelemetryError::NetworkTimeout, true);

		assert_eq!(err.status(), None);
		assert_eq!(TelemetryError::ClientClosed.status(), None);
	}
}
