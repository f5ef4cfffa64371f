//! Severity and category assignment
//!
//! [`classify`] is pure and total: every capture path gets a
//! `(Severity, Category)` pair, with `medium`/`javascript` when nothing
//! more specific is known.

use shoptrace_core::domain::{Category, Severity};

/// Where a capture came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOrigin {
    /// Generic `capture` call
    Generic,
    /// Render/component failure
    Ui,
    /// Failed outbound request; `status` is `None` when no response arrived
    Network { status: Option<u16> },
    /// Login, session or permission failure
    Auth,
    /// Payment failure
    Payment,
    /// Process-wide panic hook
    GlobalHook,
    /// Error surfaced from a detached task nobody awaited
    UnhandledRejection,
}

/// Assigns severity and category for a capture.
///
/// Payment captures are always `critical`/`payment`, whatever the caller
/// asked for.
pub fn classify(
    origin: CaptureOrigin,
    explicit_severity: Option<Severity>,
    explicit_category: Option<Category>,
) -> (Severity, Category) {
    match origin {
        CaptureOrigin::Payment => (Severity::Critical, Category::Payment),
        CaptureOrigin::Ui => (Severity::High, Category::Ui),
        CaptureOrigin::Network { status } => {
            let severity = match status {
                Some(status) if status >= 500 => Severity::High,
                _ => Severity::Medium,
            };
            (severity, Category::Network)
        }
        CaptureOrigin::Auth => (explicit_severity.unwrap_or(Severity::High), Category::Auth),
        CaptureOrigin::Generic | CaptureOrigin::GlobalHook | CaptureOrigin::UnhandledRejection => (
            explicit_severity.unwrap_or_default(),
            explicit_category.unwrap_or_default(),
        ),
    }
}
