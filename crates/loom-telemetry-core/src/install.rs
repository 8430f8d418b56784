// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Installation records pushed to `POST /api/installs/push`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::host::HostInfo;

/// A signed record announcing that a product is installed on a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallInfo {
	pub product: String,
	pub device_id: String,
	/// Seconds since the Unix epoch.
	pub timestamp: i64,
	/// See [`install_signature`].
	pub sign: String,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub hostname: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub os: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub platform: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub platform_version: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub kernel_version: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub kernel_arch: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub uptime: Option<u64>,
}

impl InstallInfo {
	/// Builds a signed install record from host metadata.
	pub fn new(product: &str, device_id: &str, timestamp: i64, host: &HostInfo) -> Self {
		Self {
			product: product.to_string(),
			device_id: device_id.to_string(),
			timestamp,
			sign: install_signature(product, device_id, timestamp),
			hostname: Some(host.hostname.clone()),
			os: Some(host.os.clone()),
			platform: Some(host.platform.clone()),
			platform_version: host.platform_version.clone(),
			kernel_version: host.kernel_version.clone(),
			kernel_arch: Some(host.kernel_arch.clone()),
			uptime: host.uptime_secs,
		}
	}

	/// Returns true if `sign` matches the record's product, device and timestamp.
	pub fn verify(&self) -> bool {
		self.sign == install_signature(&self.product, &self.device_id, self.timestamp)
	}
}

/// Integrity signature for install records: `hex(sha256("product#device_id#timestamp"))`.
pub fn install_signature(product: &str, device_id: &str, timestamp: i64) -> String {
	let digest = Sha256::digest(format!("{product}#{device_id}#{timestamp}").as_bytes());
	hex::encode(digest)
}
