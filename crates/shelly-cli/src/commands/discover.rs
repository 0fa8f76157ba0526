//! `shellyctl discover` -- run a discovery pass and show what was found.

use tokio_util::sync::CancellationToken;

use crate::cli::{DiscoverArgs, GlobalOpts};
use crate::commands::devices::DeviceRow;
use crate::context::AppContext;
use crate::error::{exit_code, CliError};
use crate::output;

pub async fn handle(
    ctx: &AppContext,
    args: DiscoverArgs,
    global: &GlobalOpts,
) -> Result<i32, CliError> {
    let discovery = ctx.discovery()?;
    let cancel = CancellationToken::new();

    // Ctrl-C stops outstanding probes; devices already found stay.
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_on_signal.cancel();
        }
    });

    let networks = (!args.networks.is_empty()).then_some(args.networks.as_slice());
    let observed = discovery.discover(networks, &args.ips, &cancel).await?;

    let devices: Vec<_> = observed.iter().map(|d| (**d).clone()).collect();
    println!(
        "{}",
        output::render_list(&global.output, &devices, |d| DeviceRow::from(d), |d| d
            .id
            .to_string())
    );
    Ok(exit_code::SUCCESS)
}
