// ── Group executor ──
//
// Resolves a group (or the implicit all-devices set) to concrete device
// records and fans a logical request out with bounded concurrency.
// Partial failure is the norm: one device's failure never aborts the
// remainder, and results come back in input order regardless of
// completion order.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::{OperateOptions, ParameterEngine, SetOptions};
use crate::error::CoreError;
use crate::groups::{GroupManager, ALL_DEVICES};
use crate::model::{Device, ErrorKind, GroupResult, MacAddr, OperationResult};
use crate::registry::DeviceRegistry;

// ── Request ─────────────────────────────────────────────────────────

/// A logical request to run against every member of a group.
#[derive(Debug, Clone)]
pub enum GroupRequest {
    /// A control verb (`on`, `toggle`, `reboot`, ...).
    Operate {
        verb: String,
        args: BTreeMap<String, Value>,
    },
    /// Write one logical parameter.
    SetParameter {
        name: String,
        value: Value,
        reboot_if_needed: bool,
    },
    /// Read one logical parameter.
    GetParameter { name: String },
    /// Bulk setter: several parameters per device, applied in order.
    ApplyParameters {
        values: BTreeMap<String, Value>,
        reboot_if_needed: bool,
    },
    /// Trigger firmware updates, optionally only on devices that report
    /// one available.
    UpdateFirmware { only_with_updates: bool },
}

impl GroupRequest {
    fn label(&self) -> String {
        match self {
            Self::Operate { verb, .. } => verb.clone(),
            Self::SetParameter { name, .. } => format!("set {name}"),
            Self::GetParameter { name } => format!("get {name}"),
            Self::ApplyParameters { values, .. } => format!("apply {} parameters", values.len()),
            Self::UpdateFirmware { .. } => "update_firmware".to_string(),
        }
    }

    /// Parameter names this request writes (empty for reads/verbs).
    fn written_parameters(&self) -> Vec<&str> {
        match self {
            Self::SetParameter { name, .. } => vec![name.as_str()],
            Self::ApplyParameters { values, .. } => values.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Required for destructive verbs against `all-devices`.
    pub confirm: bool,

    /// Per-device deadline; `None` leaves only the transport timeout.
    pub per_device_timeout: Option<Duration>,

    /// Group-level cancellation; each device gets a child token.
    pub cancel: CancellationToken,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            confirm: false,
            per_device_timeout: None,
            cancel: CancellationToken::new(),
        }
    }
}

// ── Executor ────────────────────────────────────────────────────────

pub struct GroupExecutor {
    registry: Arc<DeviceRegistry>,
    engine: Arc<ParameterEngine>,
    groups: Arc<GroupManager>,
    concurrency: usize,
    destructive_verbs: HashSet<String>,
}

impl GroupExecutor {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        engine: Arc<ParameterEngine>,
        groups: Arc<GroupManager>,
        concurrency: usize,
        destructive_verbs: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            registry,
            engine,
            groups,
            concurrency: concurrency.max(1),
            destructive_verbs: destructive_verbs.into_iter().collect(),
        }
    }

    /// Execute `request` against every member of `group_name`.
    ///
    /// Caller contract violations (unknown group, unknown verb, missing
    /// argument, the all-devices interlock) come back as `Err` before any
    /// device I/O; per-device failures live inside the `GroupResult`.
    pub async fn execute(
        &self,
        group_name: &str,
        request: GroupRequest,
        opts: ExecuteOptions,
    ) -> Result<GroupResult, CoreError> {
        // Resolve the target set first; the group config overlay applies
        // to verb arguments.
        let (targets, config_overlay) = self.resolve_targets(group_name)?;
        let request = self.apply_overlay(request, config_overlay);

        self.check_interlock(group_name, &request, &opts)?;
        self.validate_request(&request)?;

        info!(
            group = group_name,
            request = %request.label(),
            targets = targets.len(),
            "executing group request"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let request = Arc::new(request);
        let mut handles = Vec::with_capacity(targets.len());

        for (index, (mac, device)) in targets.into_iter().enumerate() {
            let Some(device) = device else {
                // Known-but-missing member: skipped, no task.
                handles.push(TaskSlot::Ready(index, OperationResult::skipped(mac)));
                continue;
            };

            // Acquiring before spawning keeps dispatch in input order.
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .expect("semaphore closed");
            let engine = Arc::clone(&self.engine);
            let request = Arc::clone(&request);
            let child_cancel = opts.cancel.child_token();
            let timeout = opts.per_device_timeout;

            handles.push(TaskSlot::Running(
                index,
                tokio::spawn(async move {
                    let _permit = permit;
                    run_one(&engine, &device, &request, timeout, child_cancel).await
                }),
            ));
        }

        let mut ordered: Vec<Option<OperationResult>> =
            (0..handles.len()).map(|_| None).collect();
        for slot in handles {
            match slot {
                TaskSlot::Ready(index, result) => ordered[index] = Some(result),
                TaskSlot::Running(index, handle) => {
                    let result = handle.await.unwrap_or_else(|e| {
                        OperationResult::failure(
                            MacAddr::new("000000000000"),
                            ErrorKind::Internal,
                            format!("task panicked: {e}"),
                            "(internal)",
                        )
                    });
                    ordered[index] = Some(result);
                }
            }
        }

        let results: Vec<OperationResult> = ordered.into_iter().flatten().collect();
        Ok(GroupResult::new(group_name, results))
    }

    // ── Target resolution ────────────────────────────────────────────

    #[allow(clippy::type_complexity)]
    fn resolve_targets(
        &self,
        group_name: &str,
    ) -> Result<(Vec<(MacAddr, Option<Arc<Device>>)>, Option<Value>), CoreError> {
        if group_name == ALL_DEVICES {
            let targets = self
                .registry
                .snapshot()
                .into_iter()
                .map(|device| (device.id.clone(), Some(device)))
                .collect();
            return Ok((targets, None));
        }

        let group = self
            .groups
            .get(group_name)
            .ok_or_else(|| CoreError::GroupNotFound {
                name: group_name.to_string(),
            })?;
        let targets = group
            .device_ids
            .iter()
            .map(|id| (id.clone(), self.registry.get(id)))
            .collect();
        Ok((targets, group.config.clone()))
    }

    /// Fold a group's config overlay into verb arguments; explicit
    /// arguments win.
    fn apply_overlay(&self, request: GroupRequest, overlay: Option<Value>) -> GroupRequest {
        let Some(Value::Object(defaults)) = overlay else {
            return request;
        };
        match request {
            GroupRequest::Operate { verb, mut args } => {
                for (key, value) in defaults {
                    args.entry(key).or_insert(value);
                }
                GroupRequest::Operate { verb, args }
            }
            other => other,
        }
    }

    // ── Contract checks ──────────────────────────────────────────────

    /// The safety interlock: destructive requests against the implicit
    /// all-devices set refuse to run without confirmation, performing
    /// zero device I/O.
    fn check_interlock(
        &self,
        group_name: &str,
        request: &GroupRequest,
        opts: &ExecuteOptions,
    ) -> Result<(), CoreError> {
        if group_name != ALL_DEVICES || opts.confirm {
            return Ok(());
        }
        let destructive = match request {
            GroupRequest::Operate { verb, .. } => self.destructive_verbs.contains(verb),
            GroupRequest::UpdateFirmware { .. } => {
                self.destructive_verbs.contains("update_firmware")
            }
            _ => request
                .written_parameters()
                .iter()
                .any(|name| name.starts_with("wifi.")),
        };
        if destructive {
            debug!(group = group_name, request = %request.label(), "confirmation required");
            return Err(CoreError::ConfirmationRequired {
                verb: request.label(),
            });
        }
        Ok(())
    }

    fn validate_request(&self, request: &GroupRequest) -> Result<(), CoreError> {
        if let GroupRequest::Operate { verb, args } = request {
            let recipe =
                self.engine
                    .verb_table()
                    .get(verb)
                    .ok_or_else(|| CoreError::Validation {
                        field: "verb".into(),
                        reason: format!("unknown operation '{verb}'"),
                    })?;
            for required in recipe.required_args() {
                if !args.contains_key(&required) {
                    return Err(CoreError::Validation {
                        field: "args".into(),
                        reason: format!("operation '{verb}' requires argument '{required}'"),
                    });
                }
            }
        }
        Ok(())
    }
}

enum TaskSlot {
    Ready(usize, OperationResult),
    Running(usize, tokio::task::JoinHandle<OperationResult>),
}

// ── Per-device execution ────────────────────────────────────────────

async fn run_one(
    engine: &ParameterEngine,
    device: &Device,
    request: &GroupRequest,
    timeout: Option<Duration>,
    cancel: CancellationToken,
) -> OperationResult {
    let work = run_request(engine, device, request, &cancel);
    match timeout {
        None => work.await,
        Some(deadline) => match tokio::time::timeout(deadline, work).await {
            Ok(result) => result,
            Err(_) => {
                // Abort whatever is still in flight for this device.
                cancel.cancel();
                OperationResult::failure(
                    device.id.clone(),
                    ErrorKind::Timeout,
                    format!("per-device deadline of {deadline:?} exceeded"),
                    request.label(),
                )
            }
        },
    }
}

async fn run_request(
    engine: &ParameterEngine,
    device: &Device,
    request: &GroupRequest,
    cancel: &CancellationToken,
) -> OperationResult {
    match request {
        GroupRequest::Operate { verb, args } => {
            let opts = OperateOptions {
                args: args.clone(),
                wait_for_update: None,
            };
            engine
                .operate(device, verb, &opts, cancel)
                .await
                .unwrap_or_else(|e| {
                    OperationResult::failure(
                        device.id.clone(),
                        ErrorKind::Internal,
                        e.to_string(),
                        verb,
                    )
                })
        }
        GroupRequest::SetParameter {
            name,
            value,
            reboot_if_needed,
        } => {
            engine
                .set(
                    device,
                    name,
                    value.clone(),
                    SetOptions {
                        reboot_if_needed: *reboot_if_needed,
                    },
                    cancel,
                )
                .await
        }
        GroupRequest::GetParameter { name } => engine.get(device, name, cancel).await,
        GroupRequest::ApplyParameters {
            values,
            reboot_if_needed,
        } => apply_all(engine, device, values, *reboot_if_needed, cancel).await,
        GroupRequest::UpdateFirmware { only_with_updates } => {
            update_firmware(engine, device, *only_with_updates, cancel).await
        }
    }
}

/// Per-device firmware update, optionally gated on the device actually
/// reporting an available update.
async fn update_firmware(
    engine: &ParameterEngine,
    device: &Device,
    only_with_updates: bool,
    cancel: &CancellationToken,
) -> OperationResult {
    let opts = OperateOptions::default();
    if only_with_updates {
        let check = match engine.operate(device, "check_updates", &opts, cancel).await {
            Ok(check) => check,
            Err(e) => {
                return OperationResult::failure(
                    device.id.clone(),
                    ErrorKind::Internal,
                    e.to_string(),
                    "check_updates",
                )
            }
        };
        if !check.success {
            return check;
        }
        let has_update = check
            .value
            .as_ref()
            .and_then(|v| v.get("has_update"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !has_update {
            let mut result = OperationResult::success(device.id.clone(), "update_firmware");
            result.response_summary = Some("no update available".to_string());
            return result;
        }
    }
    engine
        .operate(device, "update_firmware", &opts, cancel)
        .await
        .unwrap_or_else(|e| {
            OperationResult::failure(
                device.id.clone(),
                ErrorKind::Internal,
                e.to_string(),
                "update_firmware",
            )
        })
}

/// Bulk setter: apply each parameter in order, reporting one combined
/// result per device.
async fn apply_all(
    engine: &ParameterEngine,
    device: &Device,
    values: &BTreeMap<String, Value>,
    reboot_if_needed: bool,
    cancel: &CancellationToken,
) -> OperationResult {
    let mut per_parameter = serde_json::Map::new();
    let mut first_failure: Option<(ErrorKind, String)> = None;
    let mut reboot_required = false;

    for (name, value) in values {
        let result = engine
            .set(
                device,
                name,
                value.clone(),
                SetOptions { reboot_if_needed },
                cancel,
            )
            .await;
        reboot_required |= result.reboot_required;
        if result.success {
            per_parameter.insert(name.clone(), Value::String("ok".into()));
        } else {
            let message = result
                .error_message
                .clone()
                .unwrap_or_else(|| "failed".into());
            per_parameter.insert(name.clone(), Value::String(message.clone()));
            if first_failure.is_none() {
                first_failure =
                    Some((result.error_kind.unwrap_or(ErrorKind::Internal), message));
            }
            if result.error_kind == Some(ErrorKind::Cancelled) {
                break;
            }
        }
    }

    let summary = format!("apply {} parameters", values.len());
    let mut combined = match first_failure {
        None => OperationResult::success(device.id.clone(), summary),
        Some((kind, message)) => {
            OperationResult::failure(device.id.clone(), kind, message, summary)
        }
    };
    combined.reboot_required = reboot_required;
    combined.value = Some(Value::Object(per_parameter));
    combined
}
