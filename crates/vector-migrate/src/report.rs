//! Console summaries printed by the CLI.

use console::{style, Style, Term};
use std::fmt::Write as _;
use std::io;

use crate::connectors::CollectionInfo;
use crate::pipeline::{MigrationFailure, MigrationResult};

/// Writes run summaries to a terminal.
pub struct Report {
    term: Term,
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}

impl Report {
    /// Reports to stdout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            term: Term::stdout(),
        }
    }

    /// Prints the summary of a completed run.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal cannot be written.
    pub fn print_success(&self, result: &MigrationResult) -> io::Result<()> {
        self.term.write_line(&render_success(result))
    }

    /// Prints the summary of a failed run.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal cannot be written.
    pub fn print_failure(&self, failure: &MigrationFailure) -> io::Result<()> {
        self.term.write_line(&render_failure(failure))
    }

    /// Prints a source collection descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal cannot be written.
    pub fn print_schema(&self, source_type: &str, info: &CollectionInfo) -> io::Result<()> {
        self.term.write_line(&render_schema(source_type, info))
    }
}

/// Summary of a completed run.
#[must_use]
pub fn render_success(result: &MigrationResult) -> String {
    let bold = Style::new().bold();
    let mut out = String::new();

    let headline = if result.dry_run {
        "Dry run complete (nothing written)"
    } else {
        "Migration complete"
    };
    let _ = writeln!(out, "\n{}", style(headline).green().bold());
    let _ = writeln!(out, "   {} {}", bold.apply_to("Collection:   "), result.collection);
    let _ = writeln!(out, "   {} {}", bold.apply_to("Source points:"), result.source_count);
    let _ = writeln!(out, "   {} {}", bold.apply_to("Target points:"), result.target_count);
    let _ = writeln!(out, "   {} {}", bold.apply_to("Vector size:  "), result.dimension);
    let _ = writeln!(
        out,
        "   {} {:.1}s",
        bold.apply_to("Duration:     "),
        result.duration_seconds
    );
    let _ = write!(
        out,
        "   {} {:.0} pts/sec",
        bold.apply_to("Throughput:   "),
        result.throughput()
    );

    if result.mismatch {
        let _ = write!(
            out,
            "\n\n{} Count mismatch: source {} vs target {}",
            style("WARNING:").yellow().bold(),
            result.source_count,
            result.target_count
        );
    }
    out
}

/// Summary of a failed run, with what an operator needs to judge a restart.
#[must_use]
pub fn render_failure(failure: &MigrationFailure) -> String {
    let bold = Style::new().bold();
    let state = &failure.state;
    let elapsed = (chrono::Utc::now() - state.started_at)
        .to_std()
        .map_or(0.0, |d| d.as_secs_f64());
    let throughput = if elapsed > 0.0 {
        state.migrated_count as f64 / elapsed
    } else {
        0.0
    };

    let mut out = String::new();
    let _ = writeln!(
        out,
        "\n{} Migration failed during {}",
        style("ERROR:").red().bold(),
        failure.phase
    );
    let _ = writeln!(
        out,
        "   {} {} ({})",
        bold.apply_to("Error kind:   "),
        failure.error.kind(),
        failure.error.code()
    );
    let _ = writeln!(out, "   {} {}", bold.apply_to("Cause:        "), failure.error);
    let _ = writeln!(out, "   {} {}", bold.apply_to("Last offset:  "), state.offset);
    let _ = writeln!(out, "   {} {}", bold.apply_to("Scanned to:   "), state.scanned_offset);
    let _ = writeln!(out, "   {} {}", bold.apply_to("Source points:"), state.total_count);
    let _ = writeln!(out, "   {} {}", bold.apply_to("Written:      "), state.migrated_count);
    let _ = writeln!(out, "   {} {:.1}s", bold.apply_to("Duration:     "), elapsed);
    let _ = writeln!(out, "   {} {:.0} pts/sec", bold.apply_to("Throughput:   "), throughput);
    let _ = write!(
        out,
        "{}",
        style("Writes are idempotent upserts: rerun from the start once the cause is fixed.")
            .dim()
    );
    out
}

/// Descriptor and count of a source collection.
#[must_use]
pub fn render_schema(source_type: &str, info: &CollectionInfo) -> String {
    let bold = Style::new().bold();
    let mut out = String::new();
    let _ = writeln!(out, "{}", style("Source collection").cyan().bold());
    let _ = writeln!(out, "   {} {}", bold.apply_to("Source type:"), source_type);
    let _ = writeln!(out, "   {} {}", bold.apply_to("Collection: "), info.descriptor.name);
    let _ = writeln!(out, "   {} {}", bold.apply_to("Dimension:  "), info.descriptor.dimension);
    let _ = writeln!(out, "   {} {}", bold.apply_to("Distance:   "), info.descriptor.distance);
    let _ = write!(out, "   {} {} points", bold.apply_to("Count:      "), info.count);
    out
}
