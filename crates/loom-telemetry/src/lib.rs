// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client SDK for Loom telemetry.
//!
//! Events are queued without blocking the caller, grouped into batches by a
//! background dispatcher and posted to the collector, optionally sealed in an
//! AES-CBC envelope.
//!
//! # Quick Start
//!
//! ```ignore
//! use loom_telemetry::{Properties, TelemetryClient};
//! use std::time::Duration;
//!
//! let client = TelemetryClient::builder()
//!     .server_url("https://telemetry.example.com")
//!     .product("MyApp")
//!     .flush_interval(Duration::from_secs(5))
//!     .build()?;
//!
//! client.report_install();
//! client.track_app_launch(Properties::new());
//! client.track("document_opened", Properties::new().insert("pages", 12));
//!
//! client.track_app_exit(Properties::new()).await?;
//! client.close().await?;
//! ```
//!
//! # Delivery
//!
//! - `track*` never wait and never fail; a full queue drops the new event
//! - batches are sent when `batch_size` events accumulate or `flush_interval`
//!   elapses, one request at a time
//! - failed batches are reported through [`Diagnostic`] and dropped
//! - [`TelemetryClient::close`] delivers everything still queued

pub mod batch;
pub mod cipher;
mod client;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod http;
mod install;
mod properties;
pub mod transport;

pub use batch::{BatchConfig, BatchSender, DispatcherState, IngestQueue};
pub use cipher::{CipherError, SecretKey};
pub use client::{ClientConfig, TelemetryClient, TelemetryClientBuilder};
pub use diagnostics::{Diagnostic, DiagnosticSink, DropReason};
pub use error::{NetworkError, OperationError, Result, RetryableError, TelemetryError};
pub use install::{APP_EXIT_EVENT, APP_LAUNCH_EVENT};
pub use properties::Properties;
pub use transport::Transport;

pub use loom_telemetry_core::{Event, EventBatch, HostInfo, InstallInfo};
