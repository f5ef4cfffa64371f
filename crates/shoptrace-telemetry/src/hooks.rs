//! Process-wide error hooks
//!
//! [`install_global_handlers`] registers a tracker as the sink for:
//!
//! - panics, through a panic hook chained in front of the existing one
//! - errors from detached tasks nobody awaits, through [`report_unhandled`]
//!   and [`spawn_reported`]
//!
//! Installation happens at most once per process; later calls are no-ops.

use std::future::Future;
use std::sync::{Arc, OnceLock};

use shoptrace_core::domain::{EntryId, RawError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::classifier::CaptureOrigin;
use crate::store::store_lock_held;
use crate::tracker::ErrorTracker;

/// Context label of panics
pub const GLOBAL_HANDLER_CONTEXT: &str = "Global Error Handler";
/// Context label of errors from detached tasks
pub const UNHANDLED_CONTEXT: &str = "Unhandled Promise Rejection";

static GLOBAL_TRACKER: OnceLock<Arc<ErrorTracker>> = OnceLock::new();

/// Installs the panic hook and registers `tracker` as the global sink.
///
/// Returns `false` (and changes nothing) if handlers were already
/// installed in this process.
pub fn install_global_handlers(tracker: Arc<ErrorTracker>) -> bool {
    if GLOBAL_TRACKER.set(tracker).is_err() {
        debug!("Global error handlers already installed");
        return false;
    }

    let previous_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        // Panics raised while this thread is inside the store go to the previous hook only
        if let Some(tracker) = GLOBAL_TRACKER.get().filter(|_| !store_lock_held()) {
            let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };

            let location = panic_info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_default();
            let backtrace = std::backtrace::Backtrace::force_capture();

            let error = RawError::new(message)
                .with_stack_trace(format!("at {location}\n{backtrace}"));
            tracker.capture_from_hook(error, CaptureOrigin::GlobalHook, GLOBAL_HANDLER_CONTEXT);
        }

        previous_hook(panic_info);
    }));

    info!("Global error handlers installed");
    true
}

/// True once [`install_global_handlers`] has succeeded
pub fn handlers_installed() -> bool {
    GLOBAL_TRACKER.get().is_some()
}

/// Records an error nobody else will handle.
///
/// Returns `None` when no handlers are installed.
pub fn report_unhandled(error: impl Into<RawError>) -> Option<EntryId> {
    let Some(tracker) = GLOBAL_TRACKER.get() else {
        warn!("Unhandled error reported before global handlers were installed");
        return None;
    };
    tracker.capture_from_hook(error.into(), CaptureOrigin::UnhandledRejection, UNHANDLED_CONTEXT)
}

/// Spawns `future`, reporting its error through [`report_unhandled`].
///
/// Must be called from within a tokio runtime.
pub fn spawn_reported<F>(future: F) -> JoinHandle<()>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = future.await {
            report_unhandled(e);
        }
    })
}
