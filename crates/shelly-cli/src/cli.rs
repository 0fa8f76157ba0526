//! Clap derive structures for the `shellyctl` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// shellyctl -- fleet control for Shelly smart devices
#[derive(Debug, Parser)]
#[command(
    name = "shellyctl",
    version,
    about = "Discover, inspect, and control fleets of Shelly devices",
    long_about = "Manages mixed-generation Shelly fleets: multi-protocol discovery,\n\
        per-model capability catalogues, logical parameter reads/writes that\n\
        translate to the right wire call per hardware generation, and\n\
        concurrent group operations with per-device accounting.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Settings file (default: ./shellyctl.toml)
    #[arg(long, env = "SHELLY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Confirm destructive operations against all-devices
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// YAML
    Yaml,
    /// Plain text, one identifier per line (scripting)
    Plain,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Find devices on the network
    Discover(DiscoverArgs),

    /// Manage known devices
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Manage device groups
    #[command(alias = "g")]
    Groups(GroupsArgs),

    /// Read and write logical parameters
    #[command(alias = "params", alias = "p")]
    Parameters(ParametersArgs),

    /// Inspect and rebuild capability definitions
    #[command(alias = "caps")]
    Capabilities(CapabilitiesArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── discover ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// CIDR blocks to probe (repeatable; overrides configured networks)
    #[arg(long = "network", short = 'n')]
    pub networks: Vec<String>,

    /// Probe specific addresses instead of sweeping
    #[arg(long = "ip")]
    pub ips: Vec<String>,
}

// ── devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List known devices
    #[command(alias = "ls")]
    List,

    /// Show one device in full
    Show {
        /// Device MAC (any common format)
        id: String,
    },

    /// Re-probe known devices and refresh their records
    Refresh,

    /// Remove a device from the registry
    #[command(alias = "rm")]
    Delete {
        /// Device MAC
        id: String,
    },
}

// ── groups ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GroupsArgs {
    #[command(subcommand)]
    pub command: GroupsCommand,
}

#[derive(Debug, Subcommand)]
pub enum GroupsCommand {
    /// Create a group
    Create {
        name: String,

        #[arg(long, short = 'd')]
        description: Option<String>,

        /// Member MACs (repeatable)
        #[arg(long = "device")]
        devices: Vec<String>,

        /// Tags (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// List groups
    #[command(alias = "ls")]
    List,

    /// Show one group
    Show { name: String },

    /// Update description or tags
    Update {
        name: String,

        #[arg(long, short = 'd')]
        description: Option<String>,

        /// Replace the tag set (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Delete a group
    #[command(alias = "rm")]
    Delete { name: String },

    /// Add a device to a group
    AddDevice { group: String, id: String },

    /// Remove a device from a group
    RemoveDevice { group: String, id: String },

    /// Run a control verb on every member ("all-devices" targets the
    /// whole registry and asks for --yes on destructive verbs)
    Operate {
        group: String,

        /// Verb: on, off, toggle, brightness, status, reboot,
        /// check_updates, update_firmware
        verb: String,

        /// Verb arguments as key=value (repeatable)
        #[arg(long = "arg", short = 'a')]
        args: Vec<String>,

        /// Per-device deadline in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// For update_firmware: skip devices reporting no update
        #[arg(long)]
        only_with_updates: bool,
    },
}

// ── parameters ───────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ParametersArgs {
    #[command(subcommand)]
    pub command: ParametersCommand,
}

#[derive(Debug, Subcommand)]
pub enum ParametersCommand {
    /// List parameters a device supports (or every known name)
    #[command(alias = "ls")]
    List {
        /// Device MAC
        #[arg(long)]
        device: Option<String>,
    },

    /// Read a parameter from a device
    Get { device: String, name: String },

    /// Write a parameter on a device
    Set {
        device: String,
        name: String,
        /// Value; parsed as JSON first, else taken as a string
        value: String,

        /// Reboot the device afterwards when the parameter requires it
        #[arg(long)]
        reboot_if_needed: bool,
    },

    /// Apply a parameter to every member of a group
    Apply {
        group: String,
        name: String,
        value: String,

        #[arg(long)]
        reboot_if_needed: bool,

        /// Per-device deadline in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

// ── capabilities ─────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CapabilitiesArgs {
    #[command(subcommand)]
    pub command: CapabilitiesCommand,
}

#[derive(Debug, Subcommand)]
pub enum CapabilitiesCommand {
    /// List known capability definitions
    #[command(alias = "ls")]
    List,

    /// Show one definition in full
    Show {
        /// Device type (SKU)
        device_type: String,
    },

    /// Probe a device (or one representative per type) and rebuild
    /// definitions
    Discover {
        /// Device MAC; omit to probe one representative of each type
        #[arg(long)]
        device: Option<String>,
    },

    /// Delete generated definitions and rebuild them from live devices
    Refresh {
        /// Also overwrite hand-edited files
        #[arg(long)]
        force: bool,
    },

    /// Which device types support a logical parameter
    CheckParameter { name: String },

    /// Apply legacy-to-canonical parameter renames across the catalogue
    Standardize {
        /// Report the diff without writing
        #[arg(long)]
        dry_run: bool,
    },
}

// ── completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
