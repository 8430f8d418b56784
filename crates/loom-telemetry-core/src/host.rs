// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Host metadata used for install records and launch events.

use std::fs;

use crate::error::{CoreError, Result};

const OS_RELEASE_PATH: &str = "/etc/os-release";
const KERNEL_RELEASE_PATH: &str = "/proc/sys/kernel/osrelease";
const UPTIME_PATH: &str = "/proc/uptime";

/// A snapshot of the host the process is running on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
	pub hostname: String,
	/// Operating system family, e.g. `linux`, `macos`, `windows`.
	pub os: String,
	/// Distribution id where known (`ubuntu`, `debian`), otherwise the OS family.
	pub platform: String,
	pub platform_version: Option<String>,
	pub kernel_version: Option<String>,
	pub kernel_arch: String,
	pub uptime_secs: Option<u64>,
}

impl HostInfo {
	/// Collects host metadata. Only the hostname lookup can fail; every other
	/// field falls back to compile-time values or `None`.
	pub fn collect() -> Result<Self> {
		let hostname = hostname::get()
			.map_err(CoreError::Hostname)?
			.to_string_lossy()
			.into_owned();

		let os = std::env::consts::OS.to_string();
		let (platform, platform_version) = fs::read_to_string(OS_RELEASE_PATH)
			.map(|contents| parse_os_release(&contents))
			.unwrap_or((None, None));

		Ok(Self {
			hostname,
			platform: platform.unwrap_or_else(|| os.clone()),
			os,
			platform_version,
			kernel_version: read_trimmed(KERNEL_RELEASE_PATH),
			kernel_arch: std::env::consts::ARCH.to_string(),
			uptime_secs: fs::read_to_string(UPTIME_PATH)
				.ok()
				.and_then(|contents| parse_uptime(&contents)),
		})
	}
}

fn read_trimmed(path: &str) -> Option<String> {
	let value = fs::read_to_string(path).ok()?;
	let value = value.trim();
	(!value.is_empty()).then(|| value.to_string())
}

/// Extracts `ID` and `VERSION_ID` from an os-release file.
pub(crate) fn parse_os_release(contents: &str) -> (Option<String>, Option<String>) {
	let mut id = None;
	let mut version = None;
	for line in contents.lines() {
		let Some((key, value)) = line.split_once('=') else {
			continue;
		};
		let value = value.trim().trim_matches('"').to_string();
		match key.trim() {
			"ID" if !value.is_empty() => id = Some(value),
			"VERSION_ID" if !value.is_empty() => version = Some(value),
			_ => {}
		}
	}
	(id, version)
}

/// Parses the first field of `/proc/uptime` as whole seconds.
pub(crate) fn parse_uptime(contents: &str) -> Option<u64> {
	let secs: f64 = contents.split_whitespace().next()?.parse().ok()?;
	(secs.is_finite() && secs >= 0.0).then(|| secs as u64)
}
