//! Typed report rows
//!
//! The row builder assembles the full row sequence for one report:
//! title, year and quarter labels, column header, one row per entity
//! sorted by the primary metric, and a trailing totals row. Cells carry
//! an explicit type so the writer never has to re-parse strings to
//! guess whether a value is a percentage or a number.
//!
//! Rendering rules live here so the delimited and styled artifacts
//! cannot disagree on a rendered magnitude: percent = fraction x 100 at
//! two decimals, numerics thousands-grouped, byte sizes in decimal
//! gigabytes.

use crate::delta::{percent_change, vector_changes, PercentChange};
use crate::models::{MetricKind, MetricSchema, MetricVector};
use crate::period::PeriodWindow;
use crate::storage::GIGABYTE;

/// How a missing baseline is rendered. One policy per report run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoBaselineStyle {
    /// Render as an empty cell.
    Empty,
    /// Render as "N/A".
    NotAvailable,
}

impl NoBaselineStyle {
    /// Parse the `report.no_baseline` config value; anything
    /// unrecognized falls back to empty rendering (validation rejects
    /// it earlier).
    pub fn from_config(value: &str) -> Self {
        match value {
            "na" => NoBaselineStyle::NotAvailable,
            _ => NoBaselineStyle::Empty,
        }
    }

    pub fn render(&self) -> &'static str {
        match self {
            NoBaselineStyle::Empty => "",
            NoBaselineStyle::NotAvailable => "N/A",
        }
    }
}

/// One typed report cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Label(String),
    Integer(i64),
    Decimal { value: f64, unit: Option<&'static str> },
    Percent(PercentChange),
    Link { url: String, text: String },
}

impl Cell {
    pub fn label(text: impl Into<String>) -> Self {
        Cell::Label(text.into())
    }

    pub fn link(url: impl Into<String>, text: impl Into<String>) -> Self {
        Cell::Link {
            url: url.into(),
            text: text.into(),
        }
    }

    /// The rendered text used for the delimited artifact, console echo,
    /// and column auto-sizing.
    pub fn render(&self, policy: NoBaselineStyle) -> String {
        match self {
            Cell::Label(s) => s.clone(),
            Cell::Integer(v) => commify(&v.to_string()),
            Cell::Decimal { value, unit } => {
                let body = commify(&format!("{value:.2}"));
                match unit {
                    Some(unit) => format!("{body} {unit}"),
                    None => body,
                }
            }
            Cell::Percent(PercentChange::NoBaseline) => policy.render().to_string(),
            Cell::Percent(PercentChange::Change(f)) => render_percent(*f),
            Cell::Link { text, .. } => text.clone(),
        }
    }
}

pub type ReportRow = Vec<Cell>;

/// Thousands-group the integer part of a numeric string; the sign and
/// any fractional part pass through untouched.
pub fn commify(number: &str) -> String {
    let (sign, rest) = match number.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", number),
    };
    let (int_part, frac) = match rest.find('.') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    };
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}{grouped}{frac}")
}

/// Render a fractional change as a percent string, e.g. 0.25 ->
/// "25.00%" and -1.0 -> "-100.00%".
pub fn render_percent(fraction: f64) -> String {
    format!("{}%", commify(&format!("{:.2}", fraction * 100.0)))
}

struct Entry {
    lead: Vec<Cell>,
    current: MetricVector,
    previous: MetricVector,
}

/// Assembles the ordered row sequence for one report.
pub struct ReportRowBuilder {
    title: String,
    year_label: String,
    quarter_label: String,
    lead_headers: Vec<&'static str>,
    schema: MetricSchema,
    sort_column: usize,
    entries: Vec<Entry>,
}

impl ReportRowBuilder {
    pub fn new(
        title: impl Into<String>,
        window: &PeriodWindow,
        lead_headers: Vec<&'static str>,
        schema: MetricSchema,
        sort_column: usize,
    ) -> Self {
        debug_assert!(sort_column < schema.arity());
        Self {
            title: title.into(),
            year_label: window.year_label(),
            quarter_label: window.quarter_label(),
            lead_headers,
            schema,
            sort_column,
            entries: Vec::new(),
        }
    }

    /// Append one entity. `lead` must have one cell per lead header;
    /// both vectors must match the schema arity.
    pub fn push_entity(&mut self, lead: Vec<Cell>, current: MetricVector, previous: MetricVector) {
        debug_assert_eq!(lead.len(), self.lead_headers.len());
        debug_assert_eq!(current.arity(), self.schema.arity());
        debug_assert_eq!(previous.arity(), self.schema.arity());
        self.entries.push(Entry {
            lead,
            current,
            previous,
        });
    }

    pub fn data_columns(&self) -> usize {
        self.lead_headers.len() + 2 * self.schema.arity()
    }

    /// Produce the full row sequence: preamble, header, sorted entity
    /// rows, totals.
    pub fn build(mut self) -> Vec<ReportRow> {
        let arity = self.schema.arity();
        let data_columns = self.data_columns();
        let mut rows = Vec::with_capacity(self.entries.len() + 5);

        rows.push(vec![Cell::label(self.title.clone())]);
        rows.push(vec![Cell::label("Year:"), Cell::label(&self.year_label)]);
        rows.push(vec![
            Cell::label("Quarter:"),
            Cell::label(&self.quarter_label),
        ]);

        let mut header: ReportRow = self
            .lead_headers
            .iter()
            .map(|h| Cell::label(*h))
            .collect();
        for column in &self.schema.columns {
            header.push(Cell::label(column.name));
            header.push(Cell::label("Chg from prev qtr"));
        }
        rows.push(header);

        // stable sort: ties keep insertion order
        let sort_column = self.sort_column;
        self.entries
            .sort_by(|a, b| b.current.get(sort_column).cmp(&a.current.get(sort_column)));

        let mut totals_current = MetricVector::zero(arity);
        let mut totals_previous = MetricVector::zero(arity);

        for entry in self.entries {
            totals_current.add_assign(&entry.current);
            totals_previous.add_assign(&entry.previous);

            let changes = vector_changes(&entry.previous, &entry.current);
            let mut row = entry.lead;
            for (i, column) in self.schema.columns.iter().enumerate() {
                row.push(metric_cell(column.kind, entry.current.get(i)));
                row.push(Cell::Percent(changes[i]));
            }
            rows.push(row);
        }

        // totals are summed first, then one delta on the sums
        let mut totals: ReportRow = Vec::with_capacity(data_columns);
        for i in 0..self.lead_headers.len() {
            totals.push(Cell::label(if i < 2 { "All" } else { "" }));
        }
        for (i, column) in self.schema.columns.iter().enumerate() {
            totals.push(metric_cell(column.kind, totals_current.get(i)));
            totals.push(Cell::Percent(percent_change(
                totals_previous.get(i),
                totals_current.get(i),
            )));
        }
        rows.push(totals);

        rows
    }
}

fn metric_cell(kind: MetricKind, value: u64) -> Cell {
    match kind {
        MetricKind::Count => Cell::Integer(value as i64),
        MetricKind::Bytes => Cell::Decimal {
            value: value as f64 / GIGABYTE,
            unit: Some("GB"),
        },
    }
}
