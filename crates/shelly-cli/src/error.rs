//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` variants into user-facing errors with actionable help
//! text, and both into process exit codes.

use miette::Diagnostic;
use thiserror::Error;

use shelly_core::CoreError;

/// Exit codes of the façade contract: 0 all per-device results succeeded,
/// 1 one or more failed, 2 confirmation-required or invalid arguments,
/// 3 internal error.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const PARTIAL_FAILURE: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const INTERNAL: i32 = 3;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Usage ────────────────────────────────────────────────────────

    #[error("Device '{id}' is not in the registry")]
    #[diagnostic(
        code(shellyctl::unknown_device),
        help("Run: shellyctl devices list\nOr discover it first: shellyctl discover")
    )]
    UnknownDevice { id: String },

    #[error("Group '{name}' not found")]
    #[diagnostic(
        code(shellyctl::unknown_group),
        help("Run: shellyctl groups list")
    )]
    UnknownGroup { name: String },

    #[error("Group '{name}' already exists")]
    #[diagnostic(code(shellyctl::group_exists))]
    GroupExists { name: String },

    #[error("'{name}' is reserved for the dynamic all-registry group")]
    #[diagnostic(code(shellyctl::reserved_group))]
    ReservedGroupName { name: String },

    #[error("Operation '{verb}' against all-devices requires confirmation")]
    #[diagnostic(
        code(shellyctl::confirmation_required),
        help("Re-run with --yes (-y) to confirm the fleet-wide operation.")
    )]
    ConfirmationRequired { verb: String },

    #[error("Invalid {field}: {reason}")]
    #[diagnostic(code(shellyctl::validation))]
    Validation { field: String, reason: String },

    #[error("Capability definition for '{device_type}' not found")]
    #[diagnostic(
        code(shellyctl::unknown_capability),
        help("Run: shellyctl capabilities list")
    )]
    UnknownCapability { device_type: String },

    // ── Infrastructure ───────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(code(shellyctl::config))]
    Config(#[from] shelly_config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(shellyctl::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to a process exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnknownDevice { .. }
            | Self::UnknownGroup { .. }
            | Self::GroupExists { .. }
            | Self::ReservedGroupName { .. }
            | Self::ConfirmationRequired { .. }
            | Self::Validation { .. }
            | Self::UnknownCapability { .. } => exit_code::USAGE,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => exit_code::INTERNAL,
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::DeviceNotFound { identifier } => Self::UnknownDevice { id: identifier },
            CoreError::GroupNotFound { name } => Self::UnknownGroup { name },
            CoreError::GroupExists { name } => Self::GroupExists { name },
            CoreError::ReservedGroupName { name } => Self::ReservedGroupName { name },
            CoreError::ConfirmationRequired { verb } => Self::ConfirmationRequired { verb },
            CoreError::Validation { field, reason } => Self::Validation { field, reason },
            CoreError::CapabilityNotFound { device_type } => {
                Self::UnknownCapability { device_type }
            }
            CoreError::Io { path, source } => {
                Self::Internal(format!("IO error at {path}: {source}"))
            }
            CoreError::Yaml { path, source } => {
                Self::Internal(format!("YAML error in {path}: {source}"))
            }
            CoreError::Internal(message) => Self::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_errors_exit_2() {
        assert_eq!(
            CliError::ConfirmationRequired { verb: "off".into() }.exit_code(),
            exit_code::USAGE
        );
        assert_eq!(
            CliError::UnknownGroup {
                name: "attic".into()
            }
            .exit_code(),
            exit_code::USAGE
        );
    }

    #[test]
    fn internal_errors_exit_3() {
        assert_eq!(
            CliError::Internal("boom".into()).exit_code(),
            exit_code::INTERNAL
        );
    }

    #[test]
    fn core_errors_map_across() {
        let err: CliError = CoreError::ConfirmationRequired { verb: "off".into() }.into();
        assert!(matches!(err, CliError::ConfirmationRequired { .. }));
    }
}
