//! Log entry domain entity
//!
//! A [`LogEntry`] is one captured failure: the diagnostic payload, the
//! client origin it happened in, and the `Severity`/`Category` tags assigned
//! by the classifier. Entries are immutable once built; the store only ever
//! changes which entries it holds.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::errors::DomainError;

/// Open key/value bag attached to an entry, passed through verbatim.
///
/// Conventional shapes per category:
/// - network: `url`, `method`, `status`
/// - payment: `orderId`, `amount`, `paymentMethod`, `currency`
/// - ui: `componentStack`
pub type Metadata = serde_json::Map<String, Value>;

// ============================================================================
// Severity
// ============================================================================

/// Ordinal risk tag. Ordering follows risk: `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    /// All severities, lowest risk first
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Returns true for entries that must be escalated immediately
    pub fn is_critical(&self) -> bool {
        matches!(self, Severity::Critical)
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|sev| sev.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::InvalidSeverity(s.to_string()))
    }
}

// ============================================================================
// Category
// ============================================================================

/// Closed classification of where a failure came from.
///
/// Used for aggregation only; it does not imply a severity.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Javascript,
    Network,
    Ui,
    Auth,
    Payment,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Javascript,
        Category::Network,
        Category::Ui,
        Category::Auth,
        Category::Payment,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Javascript => "javascript",
            Category::Network => "network",
            Category::Ui => "ui",
            Category::Auth => "auth",
            Category::Payment => "payment",
            Category::Other => "other",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Category {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|cat| cat.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::InvalidCategory(s.to_string()))
    }
}

// ============================================================================
// EntryId
// ============================================================================

/// Identifier of a log entry: `err_<unix millis>_<9 random chars>`.
///
/// Time-based with a random suffix, so ids sort roughly by capture time and
/// stay unique across reloads. The delivery pipeline dedups on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Generate a fresh id for an entry captured now
    #[must_use]
    pub fn generate() -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "err_{}_{}",
            Utc::now().timestamp_millis(),
            &suffix[..9]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EntryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '_');
        let valid = parts.next() == Some("err")
            && parts
                .next()
                .is_some_and(|millis| millis.parse::<i64>().is_ok())
            && parts.next().is_some_and(|suffix| !suffix.is_empty());

        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(DomainError::InvalidEntryId(s.to_string()))
        }
    }
}

// ============================================================================
// ClientOrigin
// ============================================================================

/// The client-execution context a failure happened in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientOrigin {
    /// User-agent string of the client
    pub user_agent: String,
    /// Route or URL the client was on
    pub url: String,
}

impl ClientOrigin {
    pub fn new(user_agent: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            url: url.into(),
        }
    }
}

// ============================================================================
// RawError
// ============================================================================

/// A failure as handed to the capture API, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawError {
    pub message: String,
    pub stack_trace: Option<String>,
}

impl RawError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack_trace: None,
        }
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    /// Builds a raw error from any `std::error::Error`.
    ///
    /// The `source()` chain becomes the stack trace, one `caused by:` line
    /// per level.
    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {cause}"));
            source = cause.source();
        }

        Self {
            message: err.to_string(),
            stack_trace: (!chain.is_empty()).then(|| chain.join("\n")),
        }
    }
}

impl From<&str> for RawError {
    fn from(message: &str) -> Self {
        RawError::new(message)
    }
}

impl From<String> for RawError {
    fn from(message: String) -> Self {
        RawError::new(message)
    }
}

impl From<&anyhow::Error> for RawError {
    fn from(err: &anyhow::Error) -> Self {
        let chain: Vec<String> = err
            .chain()
            .skip(1)
            .map(|cause| format!("caused by: {cause}"))
            .collect();
        Self {
            message: err.to_string(),
            stack_trace: (!chain.is_empty()).then(|| chain.join("\n")),
        }
    }
}

impl From<anyhow::Error> for RawError {
    fn from(err: anyhow::Error) -> Self {
        RawError::from(&err)
    }
}

// ============================================================================
// LogEntry
// ============================================================================

/// One captured failure
///
/// Built once at capture time through the `with_*` methods and never
/// modified afterwards; fields are read through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    id: EntryId,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stack_trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    component_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context: Option<String>,
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    origin: ClientOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    actor_id: Option<String>,
    #[serde(default)]
    severity: Severity,
    #[serde(default)]
    category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Metadata>,
}

impl LogEntry {
    /// Creates a new entry stamped with a fresh id and the current time
    ///
    /// # Example
    ///
    /// ```
    /// use shoptrace_core::domain::entry::{Category, ClientOrigin, LogEntry, RawError, Severity};
    ///
    /// let entry = LogEntry::new(
    ///     RawError::new("boom"),
    ///     Severity::High,
    ///     Category::Network,
    ///     ClientOrigin::new("test-agent", "/cart"),
    /// )
    /// .with_context("Checkout");
    /// assert_eq!(entry.message(), "boom");
    /// assert_eq!(entry.context(), Some("Checkout"));
    /// ```
    pub fn new(raw: RawError, severity: Severity, category: Category, origin: ClientOrigin) -> Self {
        Self {
            id: EntryId::generate(),
            message: raw.message,
            stack_trace: raw.stack_trace,
            component_context: None,
            context: None,
            timestamp: Utc::now(),
            origin,
            actor_id: None,
            severity,
            category,
            metadata: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_component_context(mut self, component_context: impl Into<String>) -> Self {
        self.component_context = Some(component_context.into());
        self
    }

    pub fn with_actor_id(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    /// Attaches metadata; an empty map is stored as no metadata
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = (!metadata.is_empty()).then_some(metadata);
        self
    }

    /// Overrides the capture time (replaying persisted or imported entries)
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn id(&self) -> &EntryId {
        &self.id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }

    pub fn component_context(&self) -> Option<&str> {
        self.component_context.as_deref()
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn origin(&self) -> &ClientOrigin {
        &self.origin
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.actor_id.as_deref()
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }
}
