//! Group command handlers.

use std::time::Duration;

use tabled::Tabled;
use tokio_util::sync::CancellationToken;

use shelly_core::groups::{ExecuteOptions, Group, GroupRequest};
use shelly_core::MacAddr;

use crate::cli::{GlobalOpts, GroupsArgs, GroupsCommand};
use crate::commands::{group_exit_code, parse_kv_args, render_group_result};
use crate::context::AppContext;
use crate::error::{exit_code, CliError};
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct GroupRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Devices")]
    devices: usize,
    #[tabled(rename = "Tags")]
    tags: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&Group> for GroupRow {
    fn from(g: &Group) -> Self {
        Self {
            name: g.name.clone(),
            devices: g.device_ids.len(),
            tags: g.tags.join(", "),
            description: g.description.clone().unwrap_or_default(),
        }
    }
}

fn detail(g: &Group) -> String {
    let mut lines = vec![
        format!("Name:        {}", g.name),
        format!(
            "Description: {}",
            g.description.as_deref().unwrap_or("-")
        ),
        format!("Tags:        {}", if g.tags.is_empty() { "-".into() } else { g.tags.join(", ") }),
        "Devices:".to_string(),
    ];
    for id in &g.device_ids {
        lines.push(format!("  {id}"));
    }
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    ctx: &AppContext,
    args: GroupsArgs,
    global: &GlobalOpts,
) -> Result<i32, CliError> {
    match args.command {
        GroupsCommand::Create {
            name,
            description,
            devices,
            tags,
        } => {
            let mut group = Group::new(name);
            group.description = description;
            group.tags = tags;
            for id in devices {
                group.add_device(MacAddr::new(&id));
            }
            let created = ctx.groups.create(group)?;
            println!("{}", output::render_single(&global.output, &*created, detail));
            Ok(exit_code::SUCCESS)
        }

        GroupsCommand::List => {
            let groups: Vec<Group> = ctx.groups.list().iter().map(|g| (**g).clone()).collect();
            println!(
                "{}",
                output::render_list(&global.output, &groups, |g| GroupRow::from(g), |g| g.name.clone())
            );
            Ok(exit_code::SUCCESS)
        }

        GroupsCommand::Show { name } => {
            let group = ctx
                .groups
                .get(&name)
                .ok_or(CliError::UnknownGroup { name })?;
            println!("{}", output::render_single(&global.output, &*group, detail));
            Ok(exit_code::SUCCESS)
        }

        GroupsCommand::Update {
            name,
            description,
            tags,
        } => {
            let group = ctx
                .groups
                .get(&name)
                .ok_or_else(|| CliError::UnknownGroup { name: name.clone() })?;
            let mut updated = (*group).clone();
            if description.is_some() {
                updated.description = description;
            }
            if !tags.is_empty() {
                updated.tags = tags;
            }
            let updated = ctx.groups.update(updated)?;
            println!("{}", output::render_single(&global.output, &*updated, detail));
            Ok(exit_code::SUCCESS)
        }

        GroupsCommand::Delete { name } => {
            if ctx.groups.delete(&name)? {
                println!("deleted {name}");
                Ok(exit_code::SUCCESS)
            } else {
                Err(CliError::UnknownGroup { name })
            }
        }

        GroupsCommand::AddDevice { group, id } => {
            ctx.groups.add_device(&group, MacAddr::new(&id))?;
            println!("added {id} to {group}");
            Ok(exit_code::SUCCESS)
        }

        GroupsCommand::RemoveDevice { group, id } => {
            if ctx.groups.remove_device(&group, &MacAddr::new(&id))? {
                println!("removed {id} from {group}");
            } else {
                println!("{id} was not in {group}");
            }
            Ok(exit_code::SUCCESS)
        }

        GroupsCommand::Operate {
            group,
            verb,
            args,
            timeout,
            only_with_updates,
        } => {
            let request = if verb == "update_firmware" && only_with_updates {
                GroupRequest::UpdateFirmware {
                    only_with_updates: true,
                }
            } else {
                GroupRequest::Operate {
                    verb,
                    args: parse_kv_args(&args)?,
                }
            };
            let opts = ExecuteOptions {
                confirm: global.yes,
                per_device_timeout: timeout.map(Duration::from_secs),
                cancel: CancellationToken::new(),
            };
            let result = ctx.executor().execute(&group, request, opts).await?;
            println!("{}", render_group_result(&global.output, &result));
            Ok(group_exit_code(&result))
        }
    }
}
