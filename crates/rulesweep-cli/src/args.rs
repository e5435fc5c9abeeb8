use std::path::PathBuf;

use chrono::NaiveDateTime;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

use rulesweep_core::model::Vendor;
use rulesweep_core::util::time::parse_timestamp;

#[derive(Debug, Parser)]
#[command(
    name = "rulesweep",
    version,
    about = "Firewall rule lifecycle classification and reorder impact analysis"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Output format
    #[arg(long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Write output to a file instead of stdout
    #[arg(long, global = true)]
    pub out: Option<PathBuf>,

    /// Log level; RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run every lifecycle stage and write snapshots and reports
    Analyze(AnalyzeArgs),
    /// Print duplicate groups of a rule table
    Duplicates(DuplicatesArgs),
    /// Deny rules bypassed by moving an allow rule down
    Impact(ImpactArgs),
    /// Continue a run from its persisted snapshots
    Resume(ResumeArgs),
}

#[derive(Debug, ClapArgs)]
pub struct Settings {
    /// Firewall vendor family (paloalto, secui)
    #[arg(long)]
    pub vendor: Vendor,

    /// JSON analysis configuration
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Reference time for every date check (default: now)
    #[arg(long, value_parser = parse_as_of)]
    pub as_of: Option<NaiveDateTime>,
}

#[derive(Debug, ClapArgs)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub settings: Settings,

    /// Rule table (JSON array of rows)
    #[arg(long)]
    pub rules: PathBuf,

    /// Request-metadata table
    #[arg(long)]
    pub requests: Option<PathBuf>,

    /// Usage table
    #[arg(long)]
    pub usage: Option<PathBuf>,

    /// Directory for snapshots and reports
    #[arg(long)]
    pub out_dir: PathBuf,
}

#[derive(Debug, ClapArgs)]
pub struct DuplicatesArgs {
    #[arg(long)]
    pub vendor: Vendor,

    #[arg(long)]
    pub rules: PathBuf,
}

#[derive(Debug, ClapArgs)]
pub struct ImpactArgs {
    #[command(flatten)]
    pub settings: Settings,

    #[arg(long)]
    pub rules: PathBuf,

    /// Object tables used to expand named groups
    #[arg(long)]
    pub objects: Option<PathBuf>,

    /// Name of the allow rule being moved
    #[arg(long)]
    pub rule: String,

    /// Partition (vsys) holding the rule; required when the name is not unique
    #[arg(long)]
    pub partition: Option<String>,

    /// New sequence position
    #[arg(long)]
    pub to: u32,
}

#[derive(Debug, ClapArgs)]
pub struct ResumeArgs {
    #[command(flatten)]
    pub settings: Settings,

    #[arg(long)]
    pub out_dir: PathBuf,

    /// Needed only if the first stage never completed
    #[arg(long)]
    pub rules: Option<PathBuf>,

    #[arg(long)]
    pub requests: Option<PathBuf>,

    #[arg(long)]
    pub usage: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

fn parse_as_of(raw: &str) -> Result<NaiveDateTime, String> {
    parse_timestamp(raw).ok_or_else(|| format!("unreadable timestamp: {raw}"))
}
