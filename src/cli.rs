use crate::{
    config::{self, Config},
    install::{self, ConflictKind, InstallReport},
    launch, locate,
    plan::ConflictPolicy,
    snapshot::{self, SnapshotReport},
};
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(
    name = "balmora",
    version,
    about = "Mod installer and snapshot tool for Morrowind/OpenMW data directories"
)]
struct Cli {
    /// Config file to use instead of the default location.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Merge an extracted mod into the game's data directory.
    Install {
        /// Root of the extracted mod tree.
        path: PathBuf,
        /// Override the configured conflict policy for this install.
        #[arg(long, value_enum)]
        policy: Option<ConflictPolicy>,
    },
    /// Show which subdirectory of a mod tree would be installed, without
    /// touching anything.
    Locate { path: PathBuf },
    /// Snapshot the live game directory under a label.
    Save {
        label: String,
        /// Free-form note stored with the snapshot.
        #[arg(long)]
        reason: Option<String>,
    },
    /// Replace the live game directory with a saved snapshot.
    Restore { label: String },
    /// List saved snapshots.
    Snapshots,
    /// Launch the game and return immediately.
    Start,
    /// Launch the game's launcher.
    Launcher,
    /// Run the navmesh generation tool.
    Navmesh,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_create(cli.config.as_deref())?;
    let format = cli.format;

    match cli.command {
        CliCommand::Install { path, policy } => {
            let report = install::install_mod(&config, &path, policy)?;
            render_install(&report, format);
        }
        CliCommand::Locate { path } => {
            let data_dir = config.data_files_dir()?;
            let marker_dirs = locate::harvest_marker_dirs(data_dir)?;
            let markers = locate::Markers::new(marker_dirs, &config.marker_file_patterns)?;
            let data_root = locate::locate_data_root(&path, &markers)?;
            render_value(&Located { data_root }, format, |located| {
                println!("{}", located.data_root.display());
            });
        }
        CliCommand::Save { label, reason } => {
            let report = snapshot::save(&config, &label, reason.as_deref())?;
            render_value(&report, format, render_snapshot_line);
        }
        CliCommand::Restore { label } => {
            let report = snapshot::restore(&config, &label)?;
            render_value(&report, format, |report| {
                println!("restored {:?} ({} files)", report.label, report.file_count);
            });
        }
        CliCommand::Snapshots => {
            let reports = snapshot::list(&config)?;
            render_value(&reports, format, |reports| {
                if reports.is_empty() {
                    println!("no snapshots");
                }
                for report in reports {
                    render_snapshot_line(report);
                }
            });
        }
        CliCommand::Start => {
            launch::spawn_detached(config::require_command(
                &config.game_command,
                "game_command",
            )?)?;
        }
        CliCommand::Launcher => {
            launch::spawn_detached(config::require_command(
                &config.launcher_command,
                "launcher_command",
            )?)?;
        }
        CliCommand::Navmesh => {
            launch::spawn_detached(config::require_command(
                &config.navmesh_command,
                "navmesh_command",
            )?)?;
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct Located {
    data_root: PathBuf,
}

fn render_value<T: Serialize>(value: &T, format: OutputFormat, text: impl Fn(&T)) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Text => text(value),
    }
}

fn render_snapshot_line(report: &SnapshotReport) {
    let when = report.saved_at.as_deref().unwrap_or("unverified");
    println!(
        "{:<24} {:>6} files {:>12} bytes  {}",
        report.label, report.file_count, report.total_bytes, when
    );
}

fn render_install(report: &InstallReport, format: OutputFormat) {
    render_value(report, format, |report| {
        if let Some(root) = &report.data_root {
            println!("data root: {}", root.display());
        }
        println!(
            "copied {}, skipped {}, conflicts {}, errors {}",
            report.copied,
            report.skipped,
            report.conflicts.len(),
            report.errors.len()
        );
        for conflict in &report.conflicts {
            match conflict.kind {
                ConflictKind::Case => println!(
                    "  case conflict: {} vs existing {}{}",
                    conflict.source,
                    conflict.existing.join(", "),
                    if conflict.resolved {
                        " (content overwritten)"
                    } else {
                        ""
                    }
                ),
                ConflictKind::Multiple => println!(
                    "  destination already inconsistent: {} matches {}",
                    conflict.source,
                    conflict.existing.join(", ")
                ),
            }
        }
        for failure in &report.errors {
            println!("  failed: {}: {}", failure.relative, failure.message);
        }
    });
}
