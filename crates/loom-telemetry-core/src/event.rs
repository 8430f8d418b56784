// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event types sent to the telemetry collector.
//!
//! An [`Event`] is a named record with free-form properties. The legacy
//! category/action/label/value fields are optional classification slots kept
//! for collectors that still group events that way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single telemetry event.
///
/// The timestamp is assigned when the event is accepted by the queue, not
/// when it is constructed, so `Event::new` leaves it at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
	pub name: String,
	/// Seconds since the Unix epoch.
	pub timestamp: i64,
	#[serde(default, skip_serializing_if = "Map::is_empty")]
	pub properties: Map<String, Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub category: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub action: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub label: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<f64>,
}

impl Event {
	/// Creates an unstamped event with no properties.
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			timestamp: 0,
			properties: Map::new(),
			category: None,
			action: None,
			label: None,
			value: None,
		}
	}

	/// Creates an event in the legacy category/action/label/value shape.
	///
	/// The action doubles as the event name. An empty label and a zero value
	/// are left unset so they are omitted from the wire.
	pub fn classified(
		category: impl Into<String>,
		action: impl Into<String>,
		label: impl Into<String>,
		value: f64,
	) -> Self {
		let action = action.into();
		let label = label.into();
		Self {
			category: Some(category.into()),
			action: Some(action.clone()),
			label: (!label.is_empty()).then_some(label),
			value: (value != 0.0).then_some(value),
			..Self::new(action)
		}
	}

	/// Replaces the event properties.
	pub fn with_properties(mut self, properties: Map<String, Value>) -> Self {
		self.properties = properties;
		self
	}

	/// Sets a single property.
	pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.properties.insert(key.into(), value.into());
		self
	}

	/// Returns the event with its timestamp set to `timestamp` seconds.
	pub fn stamped(mut self, timestamp: i64) -> Self {
		self.timestamp = timestamp;
		self
	}

	/// Sets the timestamp from a wall-clock instant.
	pub fn stamp(&mut self, at: DateTime<Utc>) {
		self.timestamp = at.timestamp();
	}
}

/// Request body for `POST /api/events/batch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
	pub product: String,
	pub device_id: String,
	/// Empty until the application sets a user id.
	pub user_id: String,
	pub session_id: String,
	pub events: Vec<Event>,
}
