// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the telemetry core types.

use thiserror::Error;

/// Errors raised while collecting host or identity information.
#[derive(Debug, Error)]
pub enum CoreError {
	#[error("failed to read hostname: {0}")]
	Hostname(#[source] std::io::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
