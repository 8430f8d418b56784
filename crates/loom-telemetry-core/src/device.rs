// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stable device identifiers.

use std::fs;

use uuid::Uuid;

use crate::host::HostInfo;

const MACHINE_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Returns an identifier that stays the same across process restarts.
///
/// Resolution order:
/// 1. The OS machine id (`/etc/machine-id`, `/var/lib/dbus/machine-id`)
/// 2. A name-based UUID derived from host metadata, see [`fingerprint_device_id`]
/// 3. A random UUID, which is only stable for the lifetime of the caller's cache
pub fn generate_device_id() -> String {
	if let Some(id) = MACHINE_ID_PATHS.iter().find_map(|path| read_machine_id(path)) {
		return id;
	}

	match HostInfo::collect() {
		Ok(info) => fingerprint_device_id(&info),
		Err(_) => Uuid::new_v4().to_string(),
	}
}

/// Derives a UUIDv5 (OID namespace) from hostname, OS, platform and platform
/// version, rendered as 32 hex characters without dashes.
pub fn fingerprint_device_id(info: &HostInfo) -> String {
	let combined = format!(
		"{}-{}-{}-{}",
		info.hostname,
		info.os,
		info.platform,
		info.platform_version.as_deref().unwrap_or_default()
	);
	Uuid::new_v5(&Uuid::NAMESPACE_OID, combined.as_bytes())
		.simple()
		.to_string()
}

fn read_machine_id(path: &str) -> Option<String> {
	let id = fs::read_to_string(path).ok()?;
	let id = id.trim();
	(!id.is_empty()).then(|| id.to_string())
}
