//! Error classification and the fatal error path
//!
//! Recoverable errors are logged where they happen. Faults that end the
//! current run are raised through a [`FaultHandler`] and resolved once in
//! `main` according to the configured [`FaultPolicy`], after the work tasks
//! have been stopped.

use serde::Deserialize;
use std::fmt;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{error, info};

/// Error taxonomy used for escalation decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A single failed operation; the next cycle retries naturally
    TransportRecoverable,
    /// The transport can no longer be used
    TransportIrrecoverable,
    SystemFault,
    /// Cloud socket or protocol failure
    Cloud,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::TransportRecoverable => write!(f, "TRANSPORT_RECOVERABLE"),
            ErrorKind::TransportIrrecoverable => write!(f, "TRANSPORT_IRRECOVERABLE"),
            ErrorKind::SystemFault => write!(f, "SYSTEM_FAULT"),
            ErrorKind::Cloud => write!(f, "CLOUD"),
        }
    }
}

/// What the device does after a fatal fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    /// Stay up in a diagnostic idle state
    #[default]
    Halt,
    /// Exit with an error so the supervisor restarts the device
    Reboot,
}

/// A terminal condition reported to `main`
#[derive(Debug, Clone, PartialEq)]
pub enum Shutdown {
    Fault { kind: ErrorKind, reason: String },
    /// Requested restart (e.g. after a firmware update), independent of policy
    Reboot { reason: String },
}

impl fmt::Display for Shutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shutdown::Fault { kind, reason } => write!(f, "{} fault: {}", kind, reason),
            Shutdown::Reboot { reason } => write!(f, "reboot requested: {}", reason),
        }
    }
}

/// Cloneable handle for raising terminal conditions from any task
#[derive(Debug, Clone)]
pub struct FaultHandler {
    tx: mpsc::UnboundedSender<Shutdown>,
}

impl FaultHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Shutdown>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Escalate a fatal fault
    pub fn raise(&self, kind: ErrorKind, reason: impl Into<String>) {
        let reason = reason.into();
        error!("Error of type {}: {}", kind, reason);
        let _ = self.tx.send(Shutdown::Fault { kind, reason });
    }

    pub fn reboot(&self, reason: impl Into<String>) {
        let _ = self.tx.send(Shutdown::Reboot {
            reason: reason.into(),
        });
    }

    /// Watch a task that should run forever. Its end raises a system fault;
    /// aborting it through the returned handle does not.
    pub fn supervise(&self, name: &'static str, task: JoinHandle<()>) -> AbortHandle {
        let handle = task.abort_handle();
        let fault = self.clone();
        tokio::spawn(async move {
            let reason = match task.await {
                Ok(()) => format!("{} task exited", name),
                Err(e) if e.is_cancelled() => return,
                Err(e) => format!("{} task failed: {}", name, e),
            };
            fault.raise(ErrorKind::SystemFault, reason);
        });
        handle
    }
}

/// Stop the device's work tasks before a terminal condition is resolved
pub fn stop_tasks(tasks: &[AbortHandle]) {
    for task in tasks {
        task.abort();
    }
    info!("Stopped {} tasks", tasks.len());
}

/// Resolve a terminal condition. Returns an error when the process should
/// exit, and never returns under [`FaultPolicy::Halt`].
pub async fn resolve(policy: FaultPolicy, shutdown: Shutdown) -> anyhow::Result<()> {
    match (&shutdown, policy) {
        (Shutdown::Reboot { .. }, _) | (Shutdown::Fault { .. }, FaultPolicy::Reboot) => {
            error!("Rebooting: {}", shutdown);
            Err(anyhow::anyhow!("{}", shutdown))
        }
        (Shutdown::Fault { .. }, FaultPolicy::Halt) => {
            error!("Halted: {}", shutdown);
            std::future::pending::<()>().await;
            Ok(())
        }
    }
}
