// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Loom telemetry pipeline.
//!
//! This crate holds the wire-level data model shared by the telemetry SDK
//! (`loom-telemetry`) and anything that needs to speak the collector protocol:
//!
//! - [`Event`] and [`EventBatch`]: the body of `POST /api/events/batch`
//! - [`InstallInfo`]: the body of `POST /api/installs/push`, signed with
//!   [`install_signature`]
//! - [`generate_device_id`]: a stable per-machine identifier
//! - [`HostInfo`]: host metadata attached to install records and launch events
//!
//! # Example
//!
//! ```
//! use loom_telemetry_core::{Event, EventBatch};
//!
//! let event = Event::new("button_clicked")
//!     .with_property("button", "checkout")
//!     .stamped(1_700_000_000);
//!
//! let batch = EventBatch {
//!     product: "MyApp".to_string(),
//!     device_id: "device-1".to_string(),
//!     user_id: String::new(),
//!     session_id: "session-1".to_string(),
//!     events: vec![event],
//! };
//!
//! let json = serde_json::to_value(&batch).unwrap();
//! assert_eq!(json["events"][0]["name"], "button_clicked");
//! ```

pub mod device;
pub mod error;
pub mod event;
pub mod host;
pub mod install;

pub use device::{fingerprint_device_id, generate_device_id};
pub use error::{CoreError, Result};
pub use event::{Event, EventBatch};
pub use host::HostInfo;
pub use install::{install_signature, InstallInfo};
