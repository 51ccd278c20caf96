//! Configuration for ddld
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (`.toml`, anything else is read as JSON5)
//! 3. Environment variables (DDLD_* prefix)
//! 4. CLI flags (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::hasher::HASH_CHUNK_SIZE;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "DDLD_";

/// Config file names looked up in the data directory
pub const CONFIG_FILES: &[&str] = &["config.toml", "config.json5", "config.json"];

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	// ========================================================================
	// LOCATIONS
	// ========================================================================
	/// State directory holding the cache database (~/.ddld)
	pub data_dir: PathBuf,

	/// Root of the local mirror (defaults to <dataDir>/mirror)
	pub mirror_root: Option<PathBuf>,

	/// Directory served as the remote drive
	pub remote_root: Option<PathBuf>,

	// ========================================================================
	// TRANSFERS
	// ========================================================================
	/// Number of parallel downloads
	pub max_concurrent_downloads: usize,

	/// Read size when hashing mirror files
	pub hash_chunk_size: usize,

	/// Download new and changed files right after a refresh
	pub auto_download: bool,

	/// Seconds in-flight downloads get to finish on shutdown
	pub shutdown_grace_secs: u64,

	// ========================================================================
	// MIRROR POLICY
	// ========================================================================
	/// Delete mirror copies of files that disappeared remotely
	pub remove_mirror_on_delete: bool,

	/// Delete mirror copies of trashed nodes
	pub remove_mirror_on_trash: bool,

	// ========================================================================
	// LOGGING
	// ========================================================================
	/// Log level (trace, debug, info, warn, error); RUST_LOG wins
	pub log_level: String,

	/// Path to log file (if any)
	pub log_file: Option<PathBuf>,

	/// Number of recent log records kept for listeners
	pub recent_log_capacity: usize,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			data_dir: std::env::var("HOME")
				.ok()
				.map(|h| PathBuf::from(h).join(".ddld"))
				.unwrap_or_else(|| PathBuf::from(".ddld")),
			mirror_root: None,
			remote_root: None,

			max_concurrent_downloads: 4,
			hash_chunk_size: HASH_CHUNK_SIZE,
			auto_download: false,
			shutdown_grace_secs: 10,

			remove_mirror_on_delete: false,
			remove_mirror_on_trash: true,

			log_level: "info".to_string(),
			log_file: None,
			recent_log_capacity: 10,
		}
	}
}

impl Config {
	/// Load a config file on top of the defaults
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let contents = std::fs::read_to_string(path)
			.map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
		Self::parse(path, &contents)
	}

	/// Parse config text, picking the format from the file extension
	pub fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
		let parse_err =
			|message: String| ConfigError::Parse { path: path.display().to_string(), message };
		match path.extension().and_then(|e| e.to_str()) {
			Some("toml") => toml::from_str(contents).map_err(|e| parse_err(e.to_string())),
			_ => json5::from_str(contents).map_err(|e| parse_err(e.to_string())),
		}
	}

	/// Load `explicit` if given, else the first config file found in the
	/// data directory, else the defaults. Environment overrides are applied
	/// on top.
	///
	/// The data directory searched is `data_dir` (the CLI flag) if given,
	/// then `DDLD_DATA_DIR`, then the default `~/.ddld`.
	pub fn discover(explicit: Option<&Path>, data_dir: Option<&Path>) -> Result<Self, ConfigError> {
		Self::discover_with(explicit, data_dir, |name| std::env::var(name).ok())
	}

	/// [`Config::discover`] with an injectable environment
	pub fn discover_with<F>(
		explicit: Option<&Path>,
		data_dir: Option<&Path>,
		lookup: F,
	) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let mut config = match explicit {
			Some(path) => Self::load(path)?,
			None => {
				let dir = data_dir
					.map(Path::to_path_buf)
					.or_else(|| lookup(&format!("{}DATA_DIR", ENV_PREFIX)).map(PathBuf::from))
					.unwrap_or_else(|| Config::default().data_dir);
				match CONFIG_FILES.iter().map(|f| dir.join(f)).find(|p| p.is_file()) {
					Some(path) => {
						let mut found = Self::load(&path)?;
						if found.data_dir == Config::default().data_dir {
							found.data_dir = dir;
						}
						found
					}
					None => Config { data_dir: dir, ..Config::default() },
				}
			}
		};
		config.apply_env(lookup)?;
		Ok(config)
	}

	/// Apply DDLD_* overrides from `lookup`
	pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |key: &str| {
			let name = format!("{}{}", ENV_PREFIX, key);
			lookup(&name).map(|value| (name, value))
		};

		if let Some((_, v)) = var("DATA_DIR") {
			self.data_dir = PathBuf::from(v);
		}
		if let Some((_, v)) = var("MIRROR_ROOT") {
			self.mirror_root = Some(PathBuf::from(v));
		}
		if let Some((_, v)) = var("REMOTE_ROOT") {
			self.remote_root = Some(PathBuf::from(v));
		}
		if let Some((name, v)) = var("MAX_CONCURRENT_DOWNLOADS") {
			self.max_concurrent_downloads = parse_number(&name, &v)?;
		}
		if let Some((name, v)) = var("HASH_CHUNK_SIZE") {
			self.hash_chunk_size = parse_number(&name, &v)?;
		}
		if let Some((name, v)) = var("AUTO_DOWNLOAD") {
			self.auto_download = parse_flag(&name, &v)?;
		}
		if let Some((name, v)) = var("SHUTDOWN_GRACE_SECS") {
			self.shutdown_grace_secs = parse_number(&name, &v)?;
		}
		if let Some((name, v)) = var("REMOVE_MIRROR_ON_DELETE") {
			self.remove_mirror_on_delete = parse_flag(&name, &v)?;
		}
		if let Some((name, v)) = var("REMOVE_MIRROR_ON_TRASH") {
			self.remove_mirror_on_trash = parse_flag(&name, &v)?;
		}
		if let Some((_, v)) = var("LOG_LEVEL") {
			self.log_level = v;
		}
		if let Some((_, v)) = var("LOG_FILE") {
			self.log_file = Some(PathBuf::from(v));
		}
		if let Some((name, v)) = var("RECENT_LOG_CAPACITY") {
			self.recent_log_capacity = parse_number(&name, &v)?;
		}
		Ok(())
	}

	/// Reject settings the daemon cannot run with
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_concurrent_downloads == 0 {
			return Err(invalid("maxConcurrentDownloads must be at least 1"));
		}
		if self.hash_chunk_size == 0 {
			return Err(invalid("hashChunkSize must be at least 1"));
		}
		if self.recent_log_capacity == 0 {
			return Err(invalid("recentLogCapacity must be at least 1"));
		}
		Ok(())
	}

	/// Effective mirror root
	pub fn mirror_root(&self) -> PathBuf {
		self.mirror_root.clone().unwrap_or_else(|| self.data_dir.join("mirror"))
	}

	/// Location of the cache database
	pub fn cache_path(&self) -> PathBuf {
		self.data_dir.join("cache.db")
	}

	pub fn shutdown_grace(&self) -> Duration {
		Duration::from_secs(self.shutdown_grace_secs)
	}
}

fn invalid(message: &str) -> ConfigError {
	ConfigError::Invalid { message: message.to_string() }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
	value
		.trim()
		.parse()
		.map_err(|_| ConfigError::Env { name: name.to_string(), value: value.to_string() })
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ConfigError> {
	match value.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(ConfigError::Env { name: name.to_string(), value: value.to_string() }),
	}
}


// vim: ts=4
