//! Command handlers, one module per top-level subcommand.

pub mod capabilities;
pub mod devices;
pub mod discover;
pub mod groups;
pub mod parameters;

use std::collections::BTreeMap;

use serde_json::Value;
use tabled::Tabled;

use shelly_core::{GroupResult, OperationResult};

use crate::error::{exit_code, CliError};

/// Parse a CLI value: JSON first (`true`, `42`, `"x"`, `[1,2]`), falling
/// back to a plain string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Parse repeated `key=value` argument flags.
pub fn parse_kv_args(raw: &[String]) -> Result<BTreeMap<String, Value>, CliError> {
    let mut args = BTreeMap::new();
    for pair in raw {
        let (key, value) = pair.split_once('=').ok_or_else(|| CliError::Validation {
            field: "args".into(),
            reason: format!("'{pair}' is not key=value"),
        })?;
        args.insert(key.to_string(), parse_value(value));
    }
    Ok(args)
}

/// Exit code for a fleet call: 0 only when every per-device result
/// succeeded.
pub fn group_exit_code(result: &GroupResult) -> i32 {
    if result.all_succeeded() {
        exit_code::SUCCESS
    } else {
        exit_code::PARTIAL_FAILURE
    }
}

pub fn operation_exit_code(result: &OperationResult) -> i32 {
    if result.success {
        exit_code::SUCCESS
    } else {
        exit_code::PARTIAL_FAILURE
    }
}

// ── Shared result rendering ─────────────────────────────────────────

#[derive(Tabled)]
pub struct ResultRow {
    #[tabled(rename = "Device")]
    pub device: String,
    #[tabled(rename = "Outcome")]
    pub outcome: String,
    #[tabled(rename = "Detail")]
    pub detail: String,
}

impl From<&OperationResult> for ResultRow {
    fn from(r: &OperationResult) -> Self {
        let outcome = if r.success {
            match r.warning {
                Some(_) => "ok (clamped)".to_string(),
                None if r.reboot_required => "ok (restart required)".to_string(),
                None => "ok".to_string(),
            }
        } else {
            r.error_kind
                .map(|k| k.to_string())
                .unwrap_or_else(|| "failed".to_string())
        };
        let detail = if r.success {
            r.value
                .as_ref()
                .map(|v| compact(v))
                .or_else(|| r.response_summary.clone())
                .unwrap_or_default()
        } else {
            r.error_message.clone().unwrap_or_default()
        };
        Self {
            device: r.device_id.to_string(),
            outcome,
            detail,
        }
    }
}

fn compact(value: &Value) -> String {
    let rendered = value.to_string();
    if rendered.len() > 60 {
        format!("{}...", &rendered[..57])
    } else {
        rendered
    }
}

/// Render a whole group result in the chosen format, appending the
/// aggregate counts in table mode.
pub fn render_group_result(format: &crate::cli::OutputFormat, result: &GroupResult) -> String {
    match format {
        crate::cli::OutputFormat::Table => {
            let table = crate::output::render_list(
                format,
                &result.results,
                |r| ResultRow::from(r),
                |r| r.device_id.to_string(),
            );
            format!(
                "{table}\n{} ok, {} failed, {} skipped",
                result.success_count, result.failure_count, result.skipped_count
            )
        }
        _ => crate::output::render_single(format, result, |_| String::new()),
    }
}
