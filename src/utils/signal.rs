//! Signal handling for graceful termination

use tracing::{debug, warn};

/// Which signal asked the process to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
	Interrupt,
	Terminate,
}

impl Shutdown {
	/// Conventional exit status (128 + signal number)
	pub fn exit_code(self) -> i32 {
		match self {
			Shutdown::Interrupt => 130, // 128 + SIGINT(2)
			Shutdown::Terminate => 143, // 128 + SIGTERM(15)
		}
	}
}

/// Resolve once SIGINT or SIGTERM arrives
///
/// If a handler cannot be installed the corresponding signal is simply not
/// waited for; Ctrl-C keeps working through tokio's portable handler.
pub async fn shutdown_signal() -> Shutdown {
	#[cfg(unix)]
	{
		use tokio::signal::unix::{signal, SignalKind};

		let mut sigterm = match signal(SignalKind::terminate()) {
			Ok(stream) => Some(stream),
			Err(e) => {
				warn!("Failed to setup SIGTERM handler: {}. Process will not handle SIGTERM gracefully.", e);
				None
			}
		};

		let terminate = async {
			match sigterm.as_mut() {
				Some(stream) => {
					stream.recv().await;
				}
				None => std::future::pending::<()>().await,
			}
		};

		tokio::select! {
			_ = terminate => {
				debug!("Received SIGTERM, shutting down...");
				Shutdown::Terminate
			}
			_ = interrupt() => {
				debug!("Received SIGINT, shutting down...");
				Shutdown::Interrupt
			}
		}
	}

	#[cfg(not(unix))]
	{
		interrupt().await;
		debug!("Received Ctrl-C, shutting down...");
		Shutdown::Interrupt
	}
}

async fn interrupt() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		warn!("Failed to setup SIGINT handler: {}. Process will not handle SIGINT gracefully.", e);
		std::future::pending::<()>().await;
	}
}


// vim: ts=4
