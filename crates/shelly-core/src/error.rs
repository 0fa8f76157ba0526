use thiserror::Error;

/// Errors for whole-fleet calls: caller contract violations and
/// infrastructure failures.
///
/// Per-device failures never surface here -- they are captured in each
/// device's [`OperationResult`](crate::model::OperationResult) and the
/// fleet call itself succeeds with counts. This type is for the cases
/// where the request as a whole cannot proceed.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("device '{identifier}' not found in registry")]
    DeviceNotFound { identifier: String },

    #[error("group '{name}' not found")]
    GroupNotFound { name: String },

    #[error("group '{name}' already exists")]
    GroupExists { name: String },

    #[error("'{name}' is a reserved group name")]
    ReservedGroupName { name: String },

    /// The safety interlock: a destructive verb against the implicit
    /// all-devices set without `confirm=true`. Zero device I/O happened.
    #[error("operation '{verb}' on all-devices requires confirmation")]
    ConfirmationRequired { verb: String },

    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("capability definition for '{device_type}' not found")]
    CapabilityNotFound { device_type: String },

    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error in {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn yaml(path: impl Into<String>, source: serde_yaml::Error) -> Self {
        Self::Yaml {
            path: path.into(),
            source,
        }
    }
}
