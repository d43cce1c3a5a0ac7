//! Console echo of report results
//!
//! The generated table is echoed to the terminal alongside the run
//! summary: the single-source audit, entities with substituted data,
//! and any storage-report lines that failed to parse. The artifacts on
//! disk are authoritative; this output exists so a scheduled run's log
//! shows what was shipped.

use crate::engine::{ReportOutcome, RunSummary};
use crate::rows::{NoBaselineStyle, ReportRow};
use crate::storage::TrendPoint;
use colored::Colorize;

pub struct DisplayManager;

impl Default for DisplayManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayManager {
    pub fn new() -> Self {
        Self
    }

    pub fn display_outcome(&self, outcome: &ReportOutcome) {
        println!("\n{}", "=".repeat(80).bright_cyan());
        self.display_table(&outcome.rows, outcome.policy);
        println!("{}", "=".repeat(80).bright_cyan());

        for file in &outcome.files {
            println!(
                "{} {}",
                "Wrote".bright_white().bold(),
                file.display().to_string().bright_green()
            );
        }

        self.display_summary(&outcome.summary);
    }

    /// Print the rows as an aligned table.
    fn display_table(&self, rows: &[ReportRow], policy: NoBaselineStyle) {
        let rendered: Vec<Vec<String>> = rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.render(policy)).collect())
            .collect();

        let columns = rendered.iter().map(|r| r.len()).max().unwrap_or(0);
        let mut widths = vec![0usize; columns];
        for row in &rendered {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        for row in &rendered {
            let line = row
                .iter()
                .enumerate()
                .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
                .collect::<Vec<_>>()
                .join("  ");
            println!("{}", line.trim_end());
        }
    }

    pub fn display_summary(&self, summary: &RunSummary) {
        if !summary.single_source.is_empty() {
            println!(
                "\n{}",
                "Entities present in only one source:".bright_yellow().bold()
            );
            for (key, tag) in &summary.single_source {
                println!("   {} {}", tag.to_string().bright_cyan(), key);
            }
        }

        if !summary.skipped_entities.is_empty() {
            println!(
                "\n{} {}",
                "Skipped entities:".bright_white(),
                summary.skipped_entities.join(", ")
            );
        }

        if !summary.partial_entities.is_empty() {
            println!(
                "\n{}",
                "Entities with substituted (zero) data:".bright_red().bold()
            );
            for entity in &summary.partial_entities {
                println!("   {entity}");
            }
        }

        if summary.malformed_lines > 0 {
            println!(
                "\n{} {}",
                "Malformed storage report lines skipped:".bright_red(),
                summary.malformed_lines.to_string().bright_white().bold()
            );
        }

        if summary.aggregate_mismatch {
            println!(
                "\n{}",
                "Warning: summed totals disagree with the source aggregate"
                    .bright_red()
                    .bold()
            );
        }

        if summary.is_clean() {
            println!("\n{} run {}", "Clean".bright_green().bold(), summary.run_id);
        } else {
            println!("\n{} run {}", "Flagged".bright_yellow().bold(), summary.run_id);
        }
    }

    /// Quarter-over-quarter size series for one entity.
    pub fn display_trend(&self, label: &str, points: &[TrendPoint]) {
        println!(
            "\n{} {}",
            "Storage trend for".bright_white().bold(),
            label.bright_cyan().bold()
        );
        if points.is_empty() {
            println!("   no archived reports mention this entity");
            return;
        }
        for point in points {
            println!(
                "   {}  {}",
                point.date.to_string().bright_white(),
                format!("{:.2} GB", point.gigabytes).bright_green()
            );
        }
    }
}
