//! Process lifecycle: the PID marker, interrupt handling, and the fault
//! policy.
//!
//! One [`Lifecycle`] value is created at startup and owns every cleanup
//! action the process must run on its way out. Interrupts terminate
//! through it so the PID marker never goes stale. Faults that escape
//! request handling are logged with a diagnostic trace and the process
//! keeps serving; an intentional shutdown or a startup error are the only
//! paths that terminate.

use std::panic;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use http::StatusCode;

use crate::error::{Error, Result};

/// Exit status for fatal configuration, I/O, and bind failures.
pub const EXIT_FAILURE: i32 = 1;

/// Exit status for an operator-requested interrupt, distinct from
/// [`EXIT_FAILURE`] so "stopped" and "failed" read differently to a
/// supervisor.
pub const EXIT_INTERRUPT: i32 = 2;

/// The on-disk PID marker.
#[derive(Debug)]
struct PidFile {
    path: PathBuf,
}

impl PidFile {
    fn write(&self) -> std::io::Result<()> {
        std::fs::write(&self.path, process::id().to_string())
    }

    fn remove(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed pid file"),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => {
                tracing::warn!(path = %self.path.display(), %error, "failed to remove pid file")
            }
        }
    }
}

/// Owner of the process's exit-time obligations.
///
/// Cleanup runs at most once no matter which path leaves the process: the
/// interrupt handler and the fatal-error path both funnel through
/// [`cleanup`](Self::cleanup).
#[derive(Debug)]
pub struct Lifecycle {
    pid_file: Option<PidFile>,
    cleaned: AtomicBool,
}

impl Lifecycle {
    pub fn new(pid_path: Option<PathBuf>) -> Self {
        Self {
            pid_file: pid_path.map(|path| PidFile { path }),
            cleaned: AtomicBool::new(false),
        }
    }

    /// Write the PID marker, if one was configured. Called once the
    /// listeners are bound: the file's existence implies a live process.
    /// A signal can land between handler installation and this call; once
    /// cleanup has run, the marker must not reappear.
    pub fn write_pid_file(&self) -> Result<()> {
        if self.cleaned.load(Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(pid_file) = &self.pid_file {
            pid_file.write().map_err(|source| Error::PidFile {
                path: pid_file.path.clone(),
                source,
            })?;
            tracing::info!(pid = process::id(), path = %pid_file.path.display(), "wrote pid file");
        }
        Ok(())
    }

    /// Run the registered cleanup actions. Every exit path calls this;
    /// only the first call does anything.
    pub fn cleanup(&self) {
        if self.cleaned.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(pid_file) = &self.pid_file {
            pid_file.remove();
        }
    }

    /// Wait for an interrupt (Ctrl+C, and SIGTERM on unix), then clean up
    /// and leave with [`EXIT_INTERRUPT`]. No draining: in-flight requests
    /// are abandoned.
    pub fn spawn_signal_handler(self: Arc<Self>) {
        tokio::spawn(async move {
            let ctrl_c = async {
                tokio::signal::ctrl_c()
                    .await
                    .expect("failed to install interrupt handler");
            };

            #[cfg(unix)]
            let terminate = async {
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to install termination handler")
                    .recv()
                    .await;
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => tracing::warn!("interrupt received, shutting down"),
                _ = terminate => tracing::warn!("termination signal received, shutting down"),
            }

            self.cleanup();
            process::exit(EXIT_INTERRUPT);
        });
    }

    /// Route panics through the structured log instead of stderr.
    /// Installed once at startup, so faults outside request handling get a
    /// diagnostic trace too.
    pub fn install_panic_hook() {
        panic::set_hook(Box::new(|info| {
            let payload = payload_str(info.payload());
            let location = info
                .location()
                .map(|location| location.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let backtrace = std::backtrace::Backtrace::capture();
            tracing::error!(%location, %backtrace, "fault: {payload}");
        }));
    }
}

/// Convert an escaped request-handler fault into a plain 500 so the
/// listener keeps accepting connections. The panic hook has already logged
/// the trace by the time this runs.
pub fn fault_response(panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    tracing::error!("request handler fault: {}", payload_str(&*panic));
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

fn payload_str(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_file_holds_current_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gatehouse.pid");

        let lifecycle = Lifecycle::new(Some(path.clone()));
        lifecycle.write_pid_file().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, process::id().to_string());
    }

    #[test]
    fn test_cleanup_removes_pid_file_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gatehouse.pid");

        let lifecycle = Lifecycle::new(Some(path.clone()));
        lifecycle.write_pid_file().unwrap();

        lifecycle.cleanup();
        assert!(!path.exists());

        // A second call must not touch the path again.
        std::fs::write(&path, "unrelated").unwrap();
        lifecycle.cleanup();
        assert!(path.exists());
    }

    #[test]
    fn test_pid_file_is_not_written_after_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gatehouse.pid");

        let lifecycle = Lifecycle::new(Some(path.clone()));
        lifecycle.cleanup();
        lifecycle.write_pid_file().unwrap();

        assert!(!path.exists());
    }

    #[test]
    fn test_cleanup_without_pid_file_is_a_noop() {
        Lifecycle::new(None).cleanup();
    }

    #[test]
    fn test_unwritable_pid_path_is_fatal() {
        let lifecycle = Lifecycle::new(Some(PathBuf::from("/nonexistent-dir/gatehouse.pid")));
        let err = lifecycle.write_pid_file().unwrap_err();
        assert!(matches!(err, Error::PidFile { .. }));
    }

    #[test]
    fn test_fault_response_is_internal_error() {
        let response = fault_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
