// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Diagnostics for failures that never reach the caller.
//!
//! Ingestion does not return errors, so dropped events and failed batches
//! are reported here instead. Every diagnostic is logged through `tracing`;
//! when debug mode is enabled it is also handed to the configured
//! [`DiagnosticSink`].

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::TelemetryError;

/// Why an event was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
	QueueFull,
	ClientClosed,
}

impl fmt::Display for DropReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DropReason::QueueFull => f.write_str("queue full"),
			DropReason::ClientClosed => f.write_str("client closed"),
		}
	}
}

#[derive(Debug)]
pub enum Diagnostic<'a> {
	EventDropped { name: &'a str, reason: DropReason },
	BatchSent { count: usize },
	BatchFailed { count: usize, error: &'a TelemetryError },
	InstallReported,
	InstallFailed { error: &'a TelemetryError },
}

impl fmt::Display for Diagnostic<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Diagnostic::EventDropped { name, reason } => {
				write!(f, "event {name:?} dropped: {reason}")
			}
			Diagnostic::BatchSent { count } => write!(f, "sent batch of {count} events"),
			Diagnostic::BatchFailed { count, error } => {
				write!(f, "failed to send batch of {count} events: {error}")
			}
			Diagnostic::InstallReported => f.write_str("install reported"),
			Diagnostic::InstallFailed { error } => write!(f, "failed to report install: {error}"),
		}
	}
}

/// Receives diagnostics when debug mode is enabled.
///
/// Called from the dispatcher task and from producers, so implementations
/// must not block.
pub trait DiagnosticSink: Send + Sync {
	fn record(&self, diagnostic: &Diagnostic<'_>);
}

impl<F> DiagnosticSink for F
where
	F: Fn(&Diagnostic<'_>) + Send + Sync,
{
	fn record(&self, diagnostic: &Diagnostic<'_>) {
		self(diagnostic)
	}
}

#[derive(Clone, Default)]
pub struct Diagnostics {
	debug: bool,
	sink: Option<Arc<dyn DiagnosticSink>>,
}

impl Diagnostics {
	pub fn new(debug: bool, sink: Option<Arc<dyn DiagnosticSink>>) -> Self {
		Self { debug, sink }
	}

	pub fn emit(&self, diagnostic: Diagnostic<'_>) {
		match &diagnostic {
			Diagnostic::EventDropped { name, reason } => {
				warn!(event = %name, reason = %reason, "Telemetry event dropped");
			}
			Diagnostic::BatchSent { count } => {
				debug!(count, "Telemetry batch sent");
			}
			Diagnostic::BatchFailed { count, error } => {
				error!(count, error = %error, "Failed to send telemetry batch");
			}
			Diagnostic::InstallReported => {
				debug!("Install reported");
			}
			Diagnostic::InstallFailed { error } => {
				error!(error = %error, "Failed to report install");
			}
		}

		if !self.debug {
			return;
		}
		if let Some(sink) = &self.sink {
			sink.record(&diagnostic);
		}
	}
}

impl fmt::Debug for Diagnostics {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Diagnostics")
			.field("debug", &self.debug)
			.field("sink", &self.sink.is_some())
			.finish()
	}
}
