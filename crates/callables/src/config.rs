// Configuration for the callable registry

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::info;

use crate::signature::DEFAULT_ROOT;
use crate::store::{FileMetadataStore, MemoryMetadataStore, MetadataStore};

pub const ENV_REFRESH_INTERVAL: &str = "CUSTOM_CALLABLES_REFRESH_INTERVAL";
pub const ENV_SCOPE: &str = "CUSTOM_CALLABLES_SCOPE";

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(60_000);
pub const DEFAULT_SCOPE: &str = "default";

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("failed to read config file: {0}")]
	Io(#[from] std::io::Error),

	#[error("failed to parse config: {0}")]
	Parse(#[from] serde_yaml::Error),

	#[error("invalid duration: {0}")]
	InvalidDuration(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct CallablesConfig {
	/// How often each instance polls the store for changes.
	#[serde(deserialize_with = "deserialize_duration")]
	pub refresh_interval: Duration,
	/// Segment prepended to every callable name.
	pub root_namespace: String,
	/// Scope this instance serves; also the default for every operation.
	pub default_scope: String,
	/// Backing document for the file store. Unset means in-memory.
	pub store_path: Option<PathBuf>,
}

impl Default for CallablesConfig {
	fn default() -> Self {
		Self {
			refresh_interval: DEFAULT_REFRESH_INTERVAL,
			root_namespace: DEFAULT_ROOT.to_string(),
			default_scope: DEFAULT_SCOPE.to_string(),
			store_path: None,
		}
	}
}

impl CallablesConfig {
	/// Parse YAML (or JSON, which is valid YAML).
	pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
		if content.trim().is_empty() {
			return Ok(Self::default());
		}
		Ok(serde_yaml::from_str(content)?)
	}

	/// Load from a file and apply environment overrides.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		Self::load_with(path, |key| std::env::var(key).ok())
	}

	pub fn load_with(
		path: impl AsRef<Path>,
		lookup: impl Fn(&str) -> Option<String>,
	) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let content = fs_err::read_to_string(path)?;
		let config = Self::from_yaml(&content)?.with_overrides(lookup)?;
		info!(
			target: "custom_callables",
			path = %path.display(),
			scope = %config.default_scope,
			refresh = ?config.refresh_interval,
			"loaded configuration"
		);
		Ok(config)
	}

	pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
		self.with_overrides(|key| std::env::var(key).ok())
	}

	/// Apply overrides from an arbitrary lookup, so tests need not touch the
	/// process environment.
	pub fn with_overrides(
		mut self,
		lookup: impl Fn(&str) -> Option<String>,
	) -> Result<Self, ConfigError> {
		if let Some(interval) = lookup(ENV_REFRESH_INTERVAL) {
			self.refresh_interval = parse_duration(&interval)?;
		}
		if let Some(scope) = lookup(ENV_SCOPE).filter(|s| !s.trim().is_empty()) {
			self.default_scope = scope;
		}
		Ok(self)
	}

	/// The store selected by `storePath`: a file store when set, otherwise
	/// a fresh in-memory store.
	pub fn metadata_store(&self) -> Arc<dyn MetadataStore> {
		match &self.store_path {
			Some(path) => Arc::new(FileMetadataStore::new(path)),
			None => Arc::new(MemoryMetadataStore::new()),
		}
	}
}

fn deserialize_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Raw {
		Millis(u64),
		Text(String),
	}
	match Raw::deserialize(deserializer)? {
		Raw::Millis(ms) => {
			positive(Duration::from_millis(ms), &ms.to_string()).map_err(serde::de::Error::custom)
		},
		Raw::Text(s) => parse_duration(&s).map_err(serde::de::Error::custom),
	}
}

/// Parse a duration string like "500ms", "30s", "5m"
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
	let s = s.trim();
	if s.is_empty() {
		return Err(ConfigError::InvalidDuration("empty duration string".into()));
	}

	let (num_str, unit) = if let Some(n) = s.strip_suffix("ms") {
		(n, "ms")
	} else if let Some(n) = s.strip_suffix('s') {
		(n, "s")
	} else if let Some(n) = s.strip_suffix('m') {
		(n, "m")
	} else if let Some(n) = s.strip_suffix('h') {
		(n, "h")
	} else if let Some(n) = s.strip_suffix('d') {
		(n, "d")
	} else {
		// bare numbers are milliseconds, like the refresh setting they replace
		(s, "ms")
	};

	let num: u64 = num_str
		.trim()
		.parse()
		.map_err(|_| ConfigError::InvalidDuration(format!("invalid duration number: {num_str}")))?;

	let secs_per_unit = match unit {
		"ms" => return positive(Duration::from_millis(num), s),
		"s" => 1,
		"m" => 60,
		"h" => 60 * 60,
		_ => 60 * 60 * 24,
	};
	let secs = num
		.checked_mul(secs_per_unit)
		.ok_or_else(|| ConfigError::InvalidDuration(format!("duration too large: {s}")))?;
	positive(Duration::from_secs(secs), s)
}

fn positive(duration: Duration, raw: &str) -> Result<Duration, ConfigError> {
	if duration.is_zero() {
		return Err(ConfigError::InvalidDuration(format!("duration must be positive: {raw}")));
	}
	Ok(duration)
}
