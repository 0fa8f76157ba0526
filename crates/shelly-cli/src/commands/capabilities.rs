//! Capability command handlers.

use tabled::Tabled;
use tokio_util::sync::CancellationToken;

use shelly_core::CapabilityDefinition;

use crate::cli::{CapabilitiesArgs, CapabilitiesCommand, GlobalOpts};
use crate::context::AppContext;
use crate::error::{exit_code, CliError};
use crate::output;

#[derive(Tabled)]
struct CapabilityRow {
    #[tabled(rename = "Type")]
    device_type: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Gen")]
    generation: String,
    #[tabled(rename = "APIs")]
    apis: usize,
    #[tabled(rename = "Parameters")]
    parameters: usize,
}

impl From<&CapabilityDefinition> for CapabilityRow {
    fn from(def: &CapabilityDefinition) -> Self {
        Self {
            device_type: def.device_type.clone(),
            name: def.name.clone(),
            generation: def.generation.to_string(),
            apis: def.apis.len(),
            parameters: def.parameters.len(),
        }
    }
}

fn detail(def: &CapabilityDefinition) -> String {
    let mut lines = vec![
        format!("Type:       {}", def.device_type),
        format!("Name:       {}", def.name),
        format!("Generation: {}", def.generation),
        format!("Synonyms:   {}", def.type_mappings.join(", ")),
        "APIs:".to_string(),
    ];
    for api in def.apis.keys() {
        lines.push(format!("  {api}"));
    }
    lines.push("Parameters:".to_string());
    for (name, p) in &def.parameters {
        let access = if p.read_only { "ro" } else { "rw" };
        lines.push(format!(
            "  {name} ({}, {access}) via {} at {}",
            p.param_type.as_str(),
            p.api,
            p.parameter_path
        ));
    }
    lines.join("\n")
}

pub async fn handle(
    ctx: &AppContext,
    args: CapabilitiesArgs,
    global: &GlobalOpts,
) -> Result<i32, CliError> {
    let cancel = CancellationToken::new();

    match args.command {
        CapabilitiesCommand::List => {
            let snapshot = ctx.catalog.snapshot();
            let definitions: Vec<CapabilityDefinition> = snapshot
                .definitions
                .values()
                .map(|d| (**d).clone())
                .collect();
            println!(
                "{}",
                output::render_list(&global.output, &definitions, |d| CapabilityRow::from(d), |d| d
                    .device_type
                    .clone())
            );
            Ok(exit_code::SUCCESS)
        }

        CapabilitiesCommand::Show { device_type } => {
            let definition =
                ctx.catalog
                    .get(&device_type)
                    .ok_or(CliError::UnknownCapability { device_type })?;
            println!(
                "{}",
                output::render_single(&global.output, &*definition, detail)
            );
            Ok(exit_code::SUCCESS)
        }

        CapabilitiesCommand::Discover { device } => {
            let scanner = ctx.scanner()?;
            let mapping = ctx.catalog.snapshot().mapping.clone();

            let targets = match device {
                Some(id) => vec![ctx.resolve_device(&id)?],
                // One representative per device type.
                None => {
                    let mut seen = std::collections::BTreeSet::new();
                    ctx.registry
                        .snapshot()
                        .into_iter()
                        .filter(|d| seen.insert(d.device_type.clone()))
                        .collect()
                }
            };

            let mut discovered = Vec::new();
            for device in targets {
                match scanner.discover(&device, &mapping, &cancel).await {
                    Ok(definition) => {
                        ctx.catalog.upsert(definition.clone())?;
                        discovered.push(definition);
                    }
                    Err(e) => eprintln!("{}: {e}", device.id),
                }
            }
            println!(
                "{}",
                output::render_list(&global.output, &discovered, |d| CapabilityRow::from(d), |d| d
                    .device_type
                    .clone())
            );
            Ok(exit_code::SUCCESS)
        }

        CapabilitiesCommand::Refresh { force } => {
            let scanner = ctx.scanner()?;
            let representatives = ctx.registry.snapshot();
            let report = ctx
                .catalog
                .refresh(&scanner, &representatives, force, &cancel)
                .await?;
            println!(
                "{}",
                output::render_single(&global.output, &report, |r| format!(
                    "deleted: {}\npreserved: {}\ndiscovered: {}\nfailed: {}",
                    r.deleted.join(", "),
                    r.preserved.join(", "),
                    r.discovered.join(", "),
                    r.failed.len()
                ))
            );
            Ok(exit_code::SUCCESS)
        }

        CapabilitiesCommand::CheckParameter { name } => {
            let supporting = ctx.catalog.devices_supporting(&name);
            if supporting.is_empty() {
                println!("no known device type supports '{name}'");
            } else {
                for device_type in supporting {
                    println!("{device_type}");
                }
            }
            Ok(exit_code::SUCCESS)
        }

        CapabilitiesCommand::Standardize { dry_run } => {
            let report = ctx.catalog.standardize(dry_run)?;
            println!(
                "{}",
                output::render_single(&global.output, &report, |r| {
                    let mut lines: Vec<String> = r
                        .renames
                        .iter()
                        .map(|rename| {
                            format!("{}: {} -> {}", rename.device_type, rename.from, rename.to)
                        })
                        .collect();
                    if lines.is_empty() {
                        lines.push("nothing to rename".to_string());
                    } else if r.dry_run {
                        lines.push("(dry run, nothing written)".to_string());
                    }
                    lines.join("\n")
                })
            );
            Ok(exit_code::SUCCESS)
        }
    }
}
