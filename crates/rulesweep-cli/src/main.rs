use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::debug;

use rulesweep_core::config::AnalysisConfig;
use rulesweep_core::duplicates::{self, DuplicateArtifact};
use rulesweep_core::impact::ImpactAnalyzer;
use rulesweep_core::lifecycle::{Workflow, WorkflowInputs};
use rulesweep_core::overlap::ObjectCatalog;
use rulesweep_core::report::{Report, render};
use rulesweep_core::snapshot::SnapshotStore;
use rulesweep_core::table::Table;
use rulesweep_core::table::convert::rules_from_table;
use rulesweep_core::Error;

mod args;
mod telemetry;

use args::{Args, Command, OutputFormat, Settings};

/// Exit code for a relocation the impact analysis does not support.
const EXIT_UNSUPPORTED: u8 = 2;

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = telemetry::init_tracing(&args.log_level, args.log_json) {
        eprintln!("warning: logging disabled: {e}");
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            match err.downcast_ref::<Error>() {
                Some(Error::UnsupportedDirection { .. }) => ExitCode::from(EXIT_UNSUPPORTED),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let output = match &args.command {
        Command::Analyze(cmd) => {
            let inputs = WorkflowInputs {
                rules: Some(Table::load(&cmd.rules)?),
                requests: load_optional(cmd.requests.as_deref())?,
                usage: load_optional(cmd.usage.as_deref())?,
            };
            let store = SnapshotStore::create(&cmd.out_dir, cmd.settings.vendor)
                .with_context(|| format!("failed to prepare {}", cmd.out_dir.display()))?;
            let mut workflow =
                Workflow::new(cmd.settings.vendor, load_config(&cmd.settings)?).with_store(store);
            let report = workflow.run(&inputs)?;
            render_report(report, &cmd.out_dir, args.format)?
        }
        Command::Resume(cmd) => {
            let inputs = WorkflowInputs {
                rules: load_optional(cmd.rules.as_deref())?,
                requests: load_optional(cmd.requests.as_deref())?,
                usage: load_optional(cmd.usage.as_deref())?,
            };
            let store = SnapshotStore::new(&cmd.out_dir, cmd.settings.vendor);
            let mut workflow = Workflow::resume(store, load_config(&cmd.settings)?)?;
            let report = workflow.run(&inputs)?;
            render_report(report, &cmd.out_dir, args.format)?
        }
        Command::Duplicates(cmd) => {
            let rules = rules_from_table(&Table::load(&cmd.rules)?, cmd.vendor)?;
            let artifact = DuplicateArtifact::new(duplicates::detect(&rules, cmd.vendor), Vec::new());
            match args.format {
                OutputFormat::Json => serde_json::to_string_pretty(&artifact)?,
                OutputFormat::Text => render::render_duplicates(&artifact),
            }
        }
        Command::Impact(cmd) => {
            let config = load_config(&cmd.settings)?;
            let rules = rules_from_table(&Table::load(&cmd.rules)?, cmd.settings.vendor)?;
            let catalog = match &cmd.objects {
                Some(path) => ObjectCatalog::load(path)?,
                None => ObjectCatalog::new(),
            };
            let report = ImpactAnalyzer::new(&rules, &catalog, config.max_group_depth)
                .analyze(cmd.partition.as_deref(), &cmd.rule, cmd.to)?;
            match args.format {
                OutputFormat::Json => serde_json::to_string_pretty(&report)?,
                OutputFormat::Text => render::render_impact(&report),
            }
        }
    };

    match &args.out {
        Some(path) => std::fs::write(path, &output)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => print!("{output}"),
    }
    Ok(())
}

fn load_optional(path: Option<&Path>) -> Result<Option<Table>> {
    path.map(Table::load).transpose()
}

fn load_config(settings: &Settings) -> Result<AnalysisConfig> {
    let mut config = match &settings.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(as_of) = settings.as_of {
        config.as_of = Some(as_of);
    }
    debug!(as_of = ?config.as_of, "configuration resolved");
    Ok(config)
}

fn render_report(report: &Report, out_dir: &Path, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(&json!({
                "tool": report.tool,
                "vendor": report.vendor,
                "generated_at": report.generated_at,
                "rules": report.final_table.len(),
                "summary": report.summary,
                "out_dir": out_dir.display().to_string(),
            }))?
        }
        OutputFormat::Text => render::render_text(report),
    })
}
