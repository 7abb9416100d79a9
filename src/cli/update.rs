//! Download and install the configured databases.
//!
//! ```bash
//! geoip-refresh update                                # every configured database
//! geoip-refresh update --only GeoLite2-City           # just one
//! geoip-refresh update --max-parallel 3 --timeout 60  # faster, stricter
//! geoip-refresh update --format json                  # machine-readable report
//! ```
//!
//! The command exits non-zero if any database failed. Databases that did update
//! stay updated; the others keep their previous files.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tracing::{error, warn};

use super::common::{CommandContext, OutputFormat};
use crate::core::{GeoipError, stage_suggestion};
use crate::refresh::{Refresher, RunReport};
use crate::utils::progress::MultiProgress;

/// Exit status after a second Ctrl-C (128 + SIGINT).
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// What a Ctrl-C does given the current cancellation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// First signal: skip databases that have not started.
    Cancel,
    /// Cancellation was already requested: stop immediately.
    Abort,
}

fn request_cancellation(flag: &AtomicBool) -> Interrupt {
    if flag.swap(true, Ordering::SeqCst) {
        Interrupt::Abort
    } else {
        Interrupt::Cancel
    }
}

/// Arguments of `geoip-refresh update`.
#[derive(Args, Debug, Default)]
pub struct UpdateCommand {
    /// Only update these editions (repeatable)
    #[arg(long, value_name = "EDITION")]
    pub only: Vec<String>,

    /// License key, overriding the configuration file
    #[arg(long, env = "MAXMIND_LICENSE_KEY", hide_env_values = true)]
    pub license_key: Option<String>,

    /// Per-attempt download timeout in seconds (0 disables it)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Number of databases to update concurrently
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_parallel: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl UpdateCommand {
    /// Run the pipeline over the selected databases and print the report.
    ///
    /// # Errors
    ///
    /// Configuration problems, an unknown `--only` edition, or
    /// [`GeoipError::RunFailed`] when at least one database failed.
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let config = ctx.load_config().await?;
        let requests = config.to_requests(self.license_key.as_deref(), &self.only)?;

        let show_progress = ctx.show_progress && self.format == OutputFormat::Text;
        let max_parallel = self.max_parallel.map(|n| usize::try_from(n).unwrap_or(usize::MAX));
        let settings =
            config.refresh_settings(self.timeout, max_parallel, MultiProgress::new(show_progress));
        let refresher = Refresher::new(settings)?;

        let flag = refresher.cancellation_flag();
        let interrupt = tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if request_cancellation(&flag) == Interrupt::Abort {
                    error!("Interrupted again: aborting");
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
                warn!(
                    "Interrupted: finishing running databases and skipping the rest (press Ctrl-C again to abort)"
                );
            }
        });

        if self.format == OutputFormat::Text {
            println!("{}", "Updating GeoIP databases".bold());
        }
        let report = refresher.run(requests).await;
        interrupt.abort();

        match self.format {
            OutputFormat::Text => print!("{}", render_text(&report)),
            OutputFormat::Json => println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialize report")?
            ),
        }

        if report.succeeded() {
            Ok(())
        } else {
            Err(GeoipError::RunFailed {
                failed: report.failed_count(),
                total: report.outcomes.len(),
            }
            .into())
        }
    }
}

/// One section per database followed by a summary line.
#[must_use]
pub fn render_text(report: &RunReport) -> String {
    let mut out = String::new();

    if report.outcomes.is_empty() {
        let _ = writeln!(out, "\n{}", "No databases selected.".yellow());
        return out;
    }

    for outcome in &report.outcomes {
        let _ = writeln!(out, "\nUpdating: {}", outcome.identifier.bold());
        if outcome.succeeded {
            let _ = writeln!(out, "{}", format!("{} updated.", outcome.identifier).green());
            if let Some(installed) = &outcome.installed {
                let _ = writeln!(
                    out,
                    "  {} ({} bytes, sha256 {})",
                    installed.path.display(),
                    installed.bytes,
                    installed.sha256
                );
            }
        } else {
            let message = outcome.error_message.as_deref().unwrap_or("unknown error");
            let _ = writeln!(out, "{}", format!("Error: {message}").red());
            if let Some(suggestion) = outcome.stage.and_then(stage_suggestion) {
                let _ = writeln!(out, "  {}: {suggestion}", "suggestion".green());
            }
        }
    }

    let summary = format!(
        "{} updated, {} failed",
        report.succeeded_count(),
        report.failed_count()
    );
    let _ = writeln!(
        out,
        "\n{}",
        if report.succeeded() {
            summary.green().bold()
        } else {
            summary.red().bold()
        }
    );
    out
}
