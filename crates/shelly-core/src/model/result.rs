// ── Operation results and the per-device error taxonomy ──

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::device::MacAddr;

// ── ErrorKind ───────────────────────────────────────────────────────

/// Per-device failure classification, observable on every
/// [`OperationResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Target MAC not in the registry.
    UnknownDevice,
    /// Transport could not reach the IP (DNS, connect, or no IP at all).
    Unreachable,
    /// The call was in flight past its deadline.
    Timeout,
    /// Explicit cancellation; not a failure for fleet accounting.
    Cancelled,
    /// Neither catalogue nor mapping knows the logical name for this device.
    UnsupportedParameter,
    /// The declared parameter path does not exist in the actual payload
    /// (stale capability data; non-fatal to the fleet).
    PathMissing,
    /// Value cannot be coerced to the declared type.
    TypeMismatch,
    /// Device returned a protocol-level failure (Gen1 `error` field or a
    /// Gen2 RPC error object, surfaced verbatim).
    DeviceError,
    /// Non-200 HTTP without a structured error body.
    HttpError,
    /// Safety interlock triggered for an all-devices destructive verb.
    ConfirmationRequired,
    /// Everything unexpected.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownDevice => "unknown-device",
            Self::Unreachable => "unreachable",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::UnsupportedParameter => "unsupported-parameter",
            Self::PathMissing => "path-missing",
            Self::TypeMismatch => "type-mismatch",
            Self::DeviceError => "device-error",
            Self::HttpError => "http-error",
            Self::ConfirmationRequired => "confirmation-required",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Warnings ────────────────────────────────────────────────────────

/// Non-fatal annotations on a successful result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Warning {
    /// The device silently clamped the written value to its own limits.
    Clamped,
}

// ── OperationResult ─────────────────────────────────────────────────

/// Outcome of one leaf operation against one device.
///
/// Carries enough detail to retry exactly that device. A device that
/// reported `restart_required` while the caller declined the coordinated
/// reboot is a *success* with the flag preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    pub device_id: MacAddr,
    pub success: bool,
    pub attempted_at: DateTime<Utc>,
    pub duration: Duration,

    /// Human-oriented one-liner of what went on the wire.
    pub request_summary: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default)]
    pub reboot_required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<Warning>,

    /// A failure that happened *after* the primary operation succeeded
    /// (e.g. a coordinated reboot that did not come back). Never
    /// invalidates the primary success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_error: Option<String>,

    /// The value read or echoed back, where the operation has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl OperationResult {
    pub fn success(device_id: MacAddr, request_summary: impl Into<String>) -> Self {
        Self {
            device_id,
            success: true,
            attempted_at: Utc::now(),
            duration: Duration::ZERO,
            request_summary: request_summary.into(),
            response_summary: None,
            error_kind: None,
            error_message: None,
            reboot_required: false,
            warning: None,
            secondary_error: None,
            value: None,
        }
    }

    pub fn failure(
        device_id: MacAddr,
        kind: ErrorKind,
        message: impl Into<String>,
        request_summary: impl Into<String>,
    ) -> Self {
        Self {
            device_id,
            success: false,
            attempted_at: Utc::now(),
            duration: Duration::ZERO,
            request_summary: request_summary.into(),
            response_summary: None,
            error_kind: Some(kind),
            error_message: Some(message.into()),
            reboot_required: false,
            warning: None,
            secondary_error: None,
            value: None,
        }
    }

    /// A member listed in a group but absent from the registry.
    pub fn skipped(device_id: MacAddr) -> Self {
        Self::failure(
            device_id.clone(),
            ErrorKind::UnknownDevice,
            format!("device {device_id} is not in the registry"),
            "(skipped)",
        )
    }

    pub fn was_skipped(&self) -> bool {
        self.error_kind == Some(ErrorKind::UnknownDevice)
    }
}

// ── GroupResult ─────────────────────────────────────────────────────

/// Aggregate outcome of a group fan-out.
///
/// Per-device results appear in the group's input order regardless of
/// completion order. The fleet call "succeeds" at this level even when
/// every device failed; callers read the counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupResult {
    pub group: String,
    pub success_count: usize,
    pub failure_count: usize,
    pub skipped_count: usize,
    pub results: Vec<OperationResult>,
}

impl GroupResult {
    /// Build the aggregate from ordered per-device results.
    pub fn new(group: impl Into<String>, results: Vec<OperationResult>) -> Self {
        let mut success_count = 0;
        let mut failure_count = 0;
        let mut skipped_count = 0;
        for r in &results {
            if r.success {
                success_count += 1;
            } else if r.was_skipped() {
                skipped_count += 1;
            } else {
                failure_count += 1;
            }
        }
        Self {
            group: group.into(),
            success_count,
            failure_count,
            skipped_count,
            results,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failure_count == 0 && self.skipped_count == 0
    }
}
