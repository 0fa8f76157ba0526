//! Device command handlers.

use tabled::Tabled;
use tokio_util::sync::CancellationToken;

use shelly_core::{Device, MacAddr};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::context::AppContext;
use crate::error::{exit_code, CliError};
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
pub struct DeviceRow {
    #[tabled(rename = "MAC")]
    pub mac: String,
    #[tabled(rename = "Type")]
    pub device_type: String,
    #[tabled(rename = "Gen")]
    pub generation: String,
    #[tabled(rename = "IP")]
    pub ip: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Firmware")]
    pub firmware: String,
    #[tabled(rename = "Via")]
    pub via: String,
}

impl From<&Device> for DeviceRow {
    fn from(d: &Device) -> Self {
        Self {
            mac: d.id.to_string(),
            device_type: d.device_type.clone(),
            generation: d.generation.to_string(),
            ip: d.ip_address.clone().unwrap_or_else(|| "-".into()),
            name: d.name.clone().unwrap_or_default(),
            firmware: d.firmware_version.clone().unwrap_or_default(),
            via: d.discovery_method.to_string(),
        }
    }
}

fn detail(d: &Device) -> String {
    let mut lines = vec![
        format!("MAC:       {}", d.id),
        format!("Type:      {}", d.device_type),
        format!("Gen:       {}", d.generation),
        format!("IP:        {}", d.ip_address.as_deref().unwrap_or("-")),
        format!("Name:      {}", d.name.as_deref().unwrap_or("-")),
        format!("Hostname:  {}", d.hostname.as_deref().unwrap_or("-")),
        format!("Firmware:  {}", d.firmware_version.as_deref().unwrap_or("-")),
        format!("Via:       {}", d.discovery_method),
        format!("Last seen: {}", d.last_seen_at.to_rfc3339()),
    ];
    if let Some(eco) = d.eco_mode_enabled {
        lines.push(format!("Eco mode:  {eco}"));
    }
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    ctx: &AppContext,
    args: DevicesArgs,
    global: &GlobalOpts,
) -> Result<i32, CliError> {
    match args.command {
        DevicesCommand::List => {
            let devices: Vec<Device> = ctx
                .registry
                .snapshot()
                .iter()
                .map(|d| (**d).clone())
                .collect();
            println!(
                "{}",
                output::render_list(&global.output, &devices, |d| DeviceRow::from(d), |d| d
                    .id
                    .to_string())
            );
            Ok(exit_code::SUCCESS)
        }

        DevicesCommand::Show { id } => {
            let device = ctx.resolve_device(&id)?;
            println!("{}", output::render_single(&global.output, &*device, detail));
            Ok(exit_code::SUCCESS)
        }

        DevicesCommand::Refresh => {
            let discovery = ctx.discovery()?;
            let refreshed = discovery.refresh_known(&CancellationToken::new()).await;
            let devices: Vec<Device> = refreshed.iter().map(|d| (**d).clone()).collect();
            println!(
                "{}",
                output::render_list(&global.output, &devices, |d| DeviceRow::from(d), |d| d
                    .id
                    .to_string())
            );
            Ok(exit_code::SUCCESS)
        }

        DevicesCommand::Delete { id } => {
            let mac = MacAddr::new(&id);
            if ctx.registry.delete(&mac)? {
                println!("deleted {mac}");
                Ok(exit_code::SUCCESS)
            } else {
                Err(CliError::UnknownDevice { id })
            }
        }
    }
}
