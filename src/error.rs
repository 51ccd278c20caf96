//! Error types for ddld operations

use std::error::Error;
use std::fmt;
use std::io;

/// Coarse error classification, used by request layers to pick a status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	NotFound,
	RemoteUnavailable,
	ContentMismatch,
	LocalContentUnavailable,
	InvalidPattern,
	Aborted,
	Internal,
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ErrorKind::NotFound => write!(f, "not-found"),
			ErrorKind::RemoteUnavailable => write!(f, "remote-unavailable"),
			ErrorKind::ContentMismatch => write!(f, "content-mismatch"),
			ErrorKind::LocalContentUnavailable => write!(f, "local-content-unavailable"),
			ErrorKind::InvalidPattern => write!(f, "invalid-pattern"),
			ErrorKind::Aborted => write!(f, "aborted"),
			ErrorKind::Internal => write!(f, "internal"),
		}
	}
}

/// Main error type for drive operations
///
/// Cloneable so that every caller joined to one download observes the
/// same failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveError {
	/// Identity unknown to the cache
	NotFound { id: String },

	/// Remote path did not resolve to a node
	PathNotFound { path: String },

	/// Listing, content or trash call to the remote store failed
	RemoteUnavailable { target: String, message: String },

	/// Downloaded byte count or digest disagrees with the cached metadata
	ContentMismatch { id: String, expected: String, actual: String },

	/// Equality requested on a node whose content is not mirrored locally
	LocalContentUnavailable { id: String },

	/// Search pattern rejected
	InvalidPattern { pattern: String, reason: String },

	/// Operation cancelled by shutdown
	Aborted { id: String },

	/// Cache database failure
	Cache(CacheError),

	/// Local filesystem failure
	Io { path: String, message: String },
}

impl DriveError {
	/// Classify this error
	pub fn kind(&self) -> ErrorKind {
		match self {
			DriveError::NotFound { .. } | DriveError::PathNotFound { .. } => ErrorKind::NotFound,
			DriveError::RemoteUnavailable { .. } => ErrorKind::RemoteUnavailable,
			DriveError::ContentMismatch { .. } => ErrorKind::ContentMismatch,
			DriveError::LocalContentUnavailable { .. } => ErrorKind::LocalContentUnavailable,
			DriveError::InvalidPattern { .. } => ErrorKind::InvalidPattern,
			DriveError::Aborted { .. } => ErrorKind::Aborted,
			DriveError::Cache(_) | DriveError::Io { .. } => ErrorKind::Internal,
		}
	}

	pub(crate) fn not_found(id: &str) -> Self {
		DriveError::NotFound { id: id.to_string() }
	}

	pub(crate) fn remote(target: &str, error: RemoteError) -> Self {
		DriveError::RemoteUnavailable { target: target.to_string(), message: error.to_string() }
	}

	pub(crate) fn io(path: &std::path::Path, error: io::Error) -> Self {
		DriveError::Io { path: path.display().to_string(), message: error.to_string() }
	}
}

impl fmt::Display for DriveError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DriveError::NotFound { id } => write!(f, "Node not found: {}", id),
			DriveError::PathNotFound { path } => write!(f, "Remote path not found: {}", path),
			DriveError::RemoteUnavailable { target, message } => {
				write!(f, "Remote store unavailable for {}: {}", target, message)
			}
			DriveError::ContentMismatch { id, expected, actual } => {
				write!(f, "Content mismatch for {}: expected {}, got {}", id, expected, actual)
			}
			DriveError::LocalContentUnavailable { id } => {
				write!(f, "Local content unavailable for {} (download it first)", id)
			}
			DriveError::InvalidPattern { pattern, reason } => {
				write!(f, "Invalid pattern '{}': {}", pattern, reason)
			}
			DriveError::Aborted { id } => write!(f, "Operation on {} aborted by shutdown", id),
			DriveError::Cache(e) => write!(f, "Cache error: {}", e),
			DriveError::Io { path, message } => write!(f, "I/O error on {}: {}", path, message),
		}
	}
}

impl Error for DriveError {}

impl From<CacheError> for DriveError {
	fn from(e: CacheError) -> Self {
		DriveError::Cache(e)
	}
}

/// Cache database errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
	/// redb reported a failure
	Database { message: String },

	/// A stored entry could not be decoded
	Corrupted { id: String, message: String },

	/// Entry could not be encoded
	Encode { message: String },
}

impl fmt::Display for CacheError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CacheError::Database { message } => write!(f, "database failure: {}", message),
			CacheError::Corrupted { id, message } => {
				write!(f, "entry {} corrupted: {}", id, message)
			}
			CacheError::Encode { message } => write!(f, "failed to encode entry: {}", message),
		}
	}
}

impl Error for CacheError {}

impl From<redb::DatabaseError> for CacheError {
	fn from(e: redb::DatabaseError) -> Self {
		CacheError::Database { message: e.to_string() }
	}
}

impl From<redb::TransactionError> for CacheError {
	fn from(e: redb::TransactionError) -> Self {
		CacheError::Database { message: e.to_string() }
	}
}

impl From<redb::TableError> for CacheError {
	fn from(e: redb::TableError) -> Self {
		CacheError::Database { message: e.to_string() }
	}
}

impl From<redb::StorageError> for CacheError {
	fn from(e: redb::StorageError) -> Self {
		CacheError::Database { message: e.to_string() }
	}
}

impl From<redb::CommitError> for CacheError {
	fn from(e: redb::CommitError) -> Self {
		CacheError::Database { message: e.to_string() }
	}
}

/// Errors reported by remote store adapters
#[derive(Debug)]
pub enum RemoteError {
	/// The store does not know this identity
	NotFound(String),
	/// I/O error talking to the store
	Io(io::Error),
	/// Generic error message
	Other(String),
}

impl fmt::Display for RemoteError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RemoteError::NotFound(id) => write!(f, "no such remote node: {}", id),
			RemoteError::Io(e) => write!(f, "I/O error: {}", e),
			RemoteError::Other(msg) => write!(f, "{}", msg),
		}
	}
}

impl Error for RemoteError {}

impl From<io::Error> for RemoteError {
	fn from(e: io::Error) -> Self {
		RemoteError::Io(e)
	}
}

impl From<String> for RemoteError {
	fn from(e: String) -> Self {
		RemoteError::Other(e)
	}
}

impl From<&str> for RemoteError {
	fn from(e: &str) -> Self {
		RemoteError::Other(e.to_string())
	}
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
	/// Config file could not be read
	Read { path: String, source: io::Error },

	/// Config file could not be parsed
	Parse { path: String, message: String },

	/// Environment variable holds an unusable value
	Env { name: String, value: String },

	/// Configuration values are inconsistent
	Invalid { message: String },
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::Read { path, source } => {
				write!(f, "Failed to read config {}: {}", path, source)
			}
			ConfigError::Parse { path, message } => {
				write!(f, "Failed to parse config {}: {}", path, message)
			}
			ConfigError::Env { name, value } => {
				write!(f, "Invalid value for {}: '{}'", name, value)
			}
			ConfigError::Invalid { message } => write!(f, "Invalid configuration: {}", message),
		}
	}
}

impl Error for ConfigError {}


// vim: ts=4
