//! Process signal handling.
//!
//! OS signals are turned into [`DaemonSignal`] values on a broadcast
//! channel. SIGTERM and SIGINT request shutdown, SIGHUP requests a schedule
//! reload. A burst of SIGHUPs that queues up before the daemon gets to it
//! is served by a single reload: see [`SignalHandler::take_reload_request`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::DaemonError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonSignal {
    /// Graceful shutdown (SIGTERM, SIGINT).
    Shutdown,
    /// Re-read schedules (SIGHUP).
    Reload,
}

impl DaemonSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            DaemonSignal::Shutdown => "shutdown",
            DaemonSignal::Reload => "reload",
        }
    }
}

impl std::fmt::Display for DaemonSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requests raised but not yet acted on.
#[derive(Default)]
struct Pending {
    shutdown: AtomicBool,
    reload: AtomicBool,
}

impl Pending {
    fn flag(&self, signal: DaemonSignal) -> &AtomicBool {
        match signal {
            DaemonSignal::Shutdown => &self.shutdown,
            DaemonSignal::Reload => &self.reload,
        }
    }
}

/// Fan-out of daemon control signals.
///
/// Clones share the same channel and pending requests.
#[derive(Clone)]
pub struct SignalHandler {
    sender: broadcast::Sender<DaemonSignal>,
    pending: Arc<Pending>,
}

impl SignalHandler {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self {
            sender,
            pending: Arc::default(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DaemonSignal> {
        self.sender.subscribe()
    }

    /// Record the request, then wake subscribers.
    pub fn send(&self, signal: DaemonSignal) {
        self.pending.flag(signal).store(true, Ordering::SeqCst);
        if self.sender.send(signal).is_err() {
            debug!(%signal, "No subscribers for signal");
        }
    }

    pub fn request_shutdown(&self) {
        self.send(DaemonSignal::Shutdown);
    }

    pub fn request_reload(&self) {
        self.send(DaemonSignal::Reload);
    }

    /// Sticky once raised.
    pub fn is_shutdown_requested(&self) -> bool {
        self.pending.shutdown.load(Ordering::SeqCst)
    }

    /// Consume the pending reload request.
    ///
    /// Returns true for the first caller after one or more reload requests,
    /// false until another request arrives.
    pub fn take_reload_request(&self) -> bool {
        self.pending.reload.swap(false, Ordering::SeqCst)
    }

    /// Install SIGTERM, SIGINT and SIGHUP listeners.
    #[cfg(unix)]
    pub fn setup_os_signals(&self) -> Result<(), DaemonError> {
        use tokio::signal::unix::SignalKind;

        self.forward(SignalKind::terminate(), "SIGTERM", DaemonSignal::Shutdown)?;
        self.forward(SignalKind::interrupt(), "SIGINT", DaemonSignal::Shutdown)?;
        self.forward(SignalKind::hangup(), "SIGHUP", DaemonSignal::Reload)?;

        info!("OS signal handlers installed (SIGTERM, SIGINT, SIGHUP)");
        Ok(())
    }

    #[cfg(unix)]
    fn forward(
        &self,
        kind: tokio::signal::unix::SignalKind,
        name: &'static str,
        action: DaemonSignal,
    ) -> Result<(), DaemonError> {
        let mut stream = tokio::signal::unix::signal(kind)
            .map_err(|e| DaemonError::SignalSetup(format!("{}: {}", name, e)))?;
        let handler = self.clone();
        tokio::spawn(async move {
            while stream.recv().await.is_some() {
                info!(signal = name, action = %action, "Received OS signal");
                handler.send(action);
            }
        });
        Ok(())
    }

    /// Only Ctrl+C is available off Unix.
    #[cfg(not(unix))]
    pub fn setup_os_signals(&self) -> Result<(), DaemonError> {
        let handler = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!(signal = "Ctrl+C", "Received OS signal");
                handler.request_shutdown();
            }
        });
        Ok(())
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Deliver a control signal to another scheduler process.
#[cfg(unix)]
pub fn send_signal_to_pid(pid: u32, signal: DaemonSignal) -> Result<(), DaemonError> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let target = match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Pid::from_raw(raw),
        _ => return Err(DaemonError::Custom(format!("Invalid PID: {}", pid))),
    };
    let os_signal = match signal {
        DaemonSignal::Shutdown => Signal::SIGTERM,
        DaemonSignal::Reload => Signal::SIGHUP,
    };

    kill(target, os_signal).map_err(|e| {
        DaemonError::Custom(format!("Failed to send {:?} to PID {}: {}", os_signal, pid, e))
    })?;
    info!(pid, signal = ?os_signal, "Signal delivered");
    Ok(())
}

#[cfg(not(unix))]
pub fn send_signal_to_pid(_pid: u32, _signal: DaemonSignal) -> Result<(), DaemonError> {
    Err(DaemonError::Custom(
        "Signal sending not supported on this platform".to_string(),
    ))
}

#[cfg(test)]
#[path = "signal_tests.rs"]
mod tests;
