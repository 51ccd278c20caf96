//! Logging prelude module for convenient access to tracing macros.
//!
//! This module provides convenient re-exports of common tracing macros
//! to reduce verbosity and maintain consistency across the codebase.
//! It also owns subscriber setup and the bounded queue of recent log
//! records that live log viewers subscribe to.
//!
//! # Usage
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("This is an info message");
//! warn!("This is a warning");
//! error!("An error occurred");
//! debug!("Debug information");
//! ```

pub use tracing::{debug, error, info, warn};

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt::{self, Write as _};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::UnboundedSender;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// One formatted log event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
	pub level: String,
	/// Milliseconds since the Unix epoch
	pub timestamp: i64,
	pub target: String,
	pub message: String,
}

struct QueueState {
	capacity: usize,
	records: VecDeque<LogRecord>,
	listeners: HashMap<String, UnboundedSender<LogRecord>>,
}

/// Most recent log records plus the listeners following new ones
pub struct LogQueue {
	state: Mutex<QueueState>,
}

impl LogQueue {
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);
		LogQueue {
			state: Mutex::new(QueueState {
				capacity,
				records: VecDeque::with_capacity(capacity),
				listeners: HashMap::new(),
			}),
		}
	}

	fn lock(&self) -> MutexGuard<'_, QueueState> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Store a record and hand it to every listener
	///
	/// Listeners whose receiving side is gone are dropped.
	pub fn push(&self, record: LogRecord) {
		let mut state = self.lock();
		state.listeners.retain(|_, tx| tx.send(record.clone()).is_ok());
		state.records.push_back(record);
		while state.records.len() > state.capacity {
			state.records.pop_front();
		}
	}

	/// Snapshot of the retained records, oldest first
	pub fn recent(&self) -> Vec<LogRecord> {
		self.lock().records.iter().cloned().collect()
	}

	/// Register a listener; false if `id` is already registered
	pub fn add(&self, id: &str, listener: UnboundedSender<LogRecord>) -> bool {
		let mut state = self.lock();
		if state.listeners.contains_key(id) {
			return false;
		}
		state.listeners.insert(id.to_string(), listener);
		true
	}

	/// Unregister a listener; false if it was not registered
	pub fn remove(&self, id: &str) -> bool {
		self.lock().listeners.remove(id).is_some()
	}

	pub fn listeners(&self) -> usize {
		self.lock().listeners.len()
	}
}

/// Collects the message and fields of an event into one line
#[derive(Default)]
struct MessageVisitor {
	message: String,
	fields: String,
}

impl Visit for MessageVisitor {
	fn record_str(&mut self, field: &Field, value: &str) {
		if field.name() == "message" {
			self.message = value.to_string();
		} else {
			let _ = write!(self.fields, " {}={}", field.name(), value);
		}
	}

	fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
		if field.name() == "message" {
			self.message = format!("{:?}", value);
		} else {
			let _ = write!(self.fields, " {}={:?}", field.name(), value);
		}
	}
}

/// Subscriber layer feeding a [`LogQueue`]
pub struct QueueLayer {
	queue: Arc<LogQueue>,
}

impl QueueLayer {
	pub fn new(queue: Arc<LogQueue>) -> Self {
		QueueLayer { queue }
	}
}

impl<S: Subscriber> Layer<S> for QueueLayer {
	fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
		let mut visitor = MessageVisitor::default();
		event.record(&mut visitor);
		let meta = event.metadata();
		self.queue.push(LogRecord {
			level: meta.level().to_string(),
			timestamp: chrono::Utc::now().timestamp_millis(),
			target: meta.target().to_string(),
			message: format!("{}{}", visitor.message, visitor.fields),
		});
	}
}

/// Initialize the tracing subscriber with environment filter support.
///
/// `RUST_LOG` wins over `level` when set:
///
/// ```bash
/// RUST_LOG=debug ddld serve /
/// RUST_LOG=ddld::download=debug,ddld::sync=info ddld serve /
/// ```
///
/// Events always go to stderr; with `log_file` they are also appended there
/// without colors, and with `queue` they are kept for log listeners.
pub fn init_tracing(
	level: &str,
	log_file: Option<&Path>,
	queue: Option<Arc<LogQueue>>,
) -> std::io::Result<()> {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

	let file_layer = match log_file {
		Some(path) => {
			let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
			Some(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
		}
		None => None,
	};

	tracing_subscriber::registry()
		.with(filter)
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
		.with(file_layer)
		.with(queue.map(QueueLayer::new))
		.try_init()
		.map_err(|e| std::io::Error::other(e.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::sync::mpsc;

	fn record(message: &str) -> LogRecord {
		LogRecord {
			level: "INFO".to_string(),
			timestamp: 0,
			target: "ddld".to_string(),
			message: message.to_string(),
		}
	}

	#[test]
	fn test_queue_keeps_most_recent() {
		let queue = LogQueue::new(2);
		queue.push(record("one"));
		queue.push(record("two"));
		queue.push(record("three"));
		let messages: Vec<String> = queue.recent().into_iter().map(|r| r.message).collect();
		assert_eq!(messages, vec!["two", "three"]);
	}

	#[test]
	fn test_listener_registration() {
		let queue = LogQueue::new(10);
		let (tx, mut rx) = mpsc::unbounded_channel();
		assert!(queue.add("viewer", tx.clone()));
		assert!(!queue.add("viewer", tx));

		queue.push(record("hello"));
		assert_eq!(rx.try_recv().unwrap().message, "hello");

		assert!(queue.remove("viewer"));
		assert!(!queue.remove("viewer"));
	}

	#[test]
	fn test_closed_listener_dropped() {
		let queue = LogQueue::new(10);
		let (tx, rx) = mpsc::unbounded_channel();
		queue.add("gone", tx);
		drop(rx);
		queue.push(record("x"));
		assert_eq!(queue.listeners(), 0);
	}

	#[test]
	fn test_layer_feeds_queue() {
		let queue = Arc::new(LogQueue::new(10));
		let subscriber = tracing_subscriber::registry().with(QueueLayer::new(queue.clone()));
		tracing::subscriber::with_default(subscriber, || {
			info!(id = "F1", "downloaded");
		});
		let records = queue.recent();
		assert_eq!(records.len(), 1);
		assert_eq!(records[0].level, "INFO");
		assert_eq!(records[0].message, "downloaded id=F1");
	}
}

// vim: ts=4
