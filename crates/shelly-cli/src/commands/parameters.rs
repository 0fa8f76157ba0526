//! Parameter command handlers.

use std::time::Duration;

use tabled::Tabled;
use tokio_util::sync::CancellationToken;

use shelly_core::groups::{ExecuteOptions, GroupRequest};
use shelly_core::SetOptions;

use crate::cli::{GlobalOpts, ParametersArgs, ParametersCommand};
use crate::commands::{
    group_exit_code, operation_exit_code, parse_value, render_group_result, ResultRow,
};
use crate::context::AppContext;
use crate::error::{exit_code, CliError};
use crate::output;

#[derive(Clone, Tabled, serde::Serialize)]
struct ParameterRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Access")]
    access: String,
    #[tabled(rename = "API")]
    api: String,
}

pub async fn handle(
    ctx: &AppContext,
    args: ParametersArgs,
    global: &GlobalOpts,
) -> Result<i32, CliError> {
    let cancel = CancellationToken::new();

    match args.command {
        ParametersCommand::List { device } => {
            match device {
                Some(id) => {
                    let device = ctx.resolve_device(&id)?;
                    let surface = ctx.engine.supported(&device);
                    let rows: Vec<ParameterRow> = surface
                        .parameters
                        .iter()
                        .map(|name| {
                            let descriptor = ctx.engine.describe(&device, name);
                            ParameterRow {
                                name: name.clone(),
                                kind: descriptor
                                    .as_ref()
                                    .map(|d| d.param_type.as_str().to_string())
                                    .unwrap_or_default(),
                                access: descriptor
                                    .as_ref()
                                    .map(|d| {
                                        if d.read_only { "ro" } else { "rw" }.to_string()
                                    })
                                    .unwrap_or_default(),
                                api: descriptor.map(|d| d.api).unwrap_or_default(),
                            }
                        })
                        .collect();
                    println!(
                        "{}",
                        output::render_list(&global.output, &rows, |r| r.clone(), |r| r
                            .name
                            .clone())
                    );
                    println!("operations: {}", surface.operations.join(", "));
                }
                None => {
                    // Every logical name any definition or the mapping knows.
                    let snapshot = ctx.catalog.snapshot();
                    let mut names: Vec<String> = snapshot
                        .definitions
                        .values()
                        .flat_map(|def| def.parameters.keys().cloned())
                        .collect();
                    names.extend(snapshot.mapping.mappings.keys().cloned());
                    names.sort();
                    names.dedup();
                    for name in names {
                        println!("{name}");
                    }
                }
            }
            Ok(exit_code::SUCCESS)
        }

        ParametersCommand::Get { device, name } => {
            let device = ctx.resolve_device(&device)?;
            let result = ctx.engine.get(&device, &name, &cancel).await;
            println!(
                "{}",
                output::render_single(&global.output, &result, |r| {
                    format!("{}", ResultRow::from(r).detail)
                })
            );
            Ok(operation_exit_code(&result))
        }

        ParametersCommand::Set {
            device,
            name,
            value,
            reboot_if_needed,
        } => {
            let device = ctx.resolve_device(&device)?;
            let result = ctx
                .engine
                .set(
                    &device,
                    &name,
                    parse_value(&value),
                    SetOptions { reboot_if_needed },
                    &cancel,
                )
                .await;
            let row = ResultRow::from(&result);
            println!(
                "{}",
                output::render_single(&global.output, &result, |_| format!(
                    "{}: {}",
                    row.outcome, row.detail
                ))
            );
            Ok(operation_exit_code(&result))
        }

        ParametersCommand::Apply {
            group,
            name,
            value,
            reboot_if_needed,
            timeout,
        } => {
            let request = GroupRequest::SetParameter {
                name,
                value: parse_value(&value),
                reboot_if_needed,
            };
            let opts = ExecuteOptions {
                confirm: global.yes,
                per_device_timeout: timeout.map(Duration::from_secs),
                cancel,
            };
            let result = ctx.executor().execute(&group, request, opts).await?;
            println!("{}", render_group_result(&global.output, &result));
            Ok(group_exit_code(&result))
        }
    }
}
