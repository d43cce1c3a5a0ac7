//! Dual-format report writer
//!
//! One logical row stream feeds two synchronized artifacts: a delimited
//! table and a styled spreadsheet. Each appended row writes the
//! delimited line immediately and records the rendered cells for the
//! spreadsheet's auto-sizing pass. Cell typing comes from the row
//! builder ([`crate::rows::Cell`]), so the writer never re-parses a
//! string to guess whether it is a percentage or a number.
//!
//! Styling: negative percent changes render red bold, positive green
//! bold, numeric cells bold and thousands-grouped. On close the
//! spreadsheet columns and rows are auto-sized from the rendered cell
//! widths (scaled by font size) starting at a configurable header
//! offset, and the title row is merged across the full column span.
//!
//! The writer owns both output handles for its lifetime; `close`
//! consumes it, so finalizing twice cannot compile.

use crate::delta::PercentChange;
use crate::rows::{Cell, NoBaselineStyle};
use anyhow::{Context, Result};
use rust_xlsxwriter::{Color, Format, FormatAlign, Url, Workbook};
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_FONT_SIZE: f64 = 10.0;
const TITLE_FONT_SIZE: f64 = 12.0;
/// Extra character columns added to the widest rendered cell.
const WIDTH_PADDING: usize = 3;
/// Extra points added to the tallest font in a row.
const HEIGHT_PADDING: f64 = 4.0;

struct LoggedCell {
    text: String,
    font_size: f64,
}

struct Formats {
    title: Format,
    header: Format,
    number: Format,
    percent_increase: Format,
    percent_decrease: Format,
    percent_flat: Format,
}

impl Formats {
    fn new() -> Self {
        Self {
            title: Format::new()
                .set_bold()
                .set_font_size(TITLE_FONT_SIZE)
                .set_align(FormatAlign::Center),
            header: Format::new().set_bold(),
            number: Format::new().set_bold().set_num_format("#,##0"),
            percent_increase: Format::new()
                .set_bold()
                .set_font_color(Color::Green)
                .set_num_format("#,##0.00%"),
            percent_decrease: Format::new()
                .set_bold()
                .set_font_color(Color::Red)
                .set_num_format("#,##0.00%"),
            percent_flat: Format::new().set_num_format("#,##0.00%"),
        }
    }

    fn decimal(&self, unit: Option<&str>) -> Format {
        let num_format = match unit {
            Some(unit) => format!("#,##0.00\" {unit}\""),
            None => "#,##0.00".to_string(),
        };
        Format::new().set_bold().set_num_format(&num_format)
    }
}

pub struct ReportWriter {
    csv_path: PathBuf,
    xlsx_path: PathBuf,
    csv: csv::Writer<std::fs::File>,
    workbook: Workbook,
    formats: Formats,
    policy: NoBaselineStyle,
    header_offset: usize,
    row_log: Vec<Vec<LoggedCell>>,
    title: Option<String>,
    max_cols: u16,
}

impl ReportWriter {
    /// Open both artifacts under `dir` with the shared base name
    /// `stem`. `header_offset` is the number of leading preamble rows
    /// excluded from auto-sizing.
    pub fn new(
        dir: &Path,
        stem: &str,
        policy: NoBaselineStyle,
        header_offset: usize,
    ) -> Result<Self> {
        let csv_path = dir.join(format!("{stem}.csv"));
        let xlsx_path = dir.join(format!("{stem}.xlsx"));

        let csv = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(&csv_path)
            .with_context(|| format!("Failed to create {}", csv_path.display()))?;

        let mut workbook = Workbook::new();
        workbook.add_worksheet();

        debug!(
            csv = %csv_path.display(),
            xlsx = %xlsx_path.display(),
            "Opened report artifacts"
        );

        Ok(Self {
            csv_path,
            xlsx_path,
            csv,
            workbook,
            formats: Formats::new(),
            policy,
            header_offset,
            row_log: Vec::new(),
            title: None,
            max_cols: 0,
        })
    }

    /// Append the column-header row; label cells render bold.
    pub fn add_header_row(&mut self, cells: &[Cell]) -> Result<()> {
        self.append(cells, true)
    }

    /// Append one logical row to both artifacts. The delimited line is
    /// written out immediately; the styled representation is finalized
    /// at close.
    pub fn add_row(&mut self, cells: &[Cell]) -> Result<()> {
        self.append(cells, false)
    }

    fn append(&mut self, cells: &[Cell], header: bool) -> Result<()> {
        let row = self.row_log.len() as u32;
        let is_title = row == 0 && cells.len() == 1 && matches!(cells[0], Cell::Label(_));
        let font_size = if is_title {
            TITLE_FONT_SIZE
        } else {
            DEFAULT_FONT_SIZE
        };

        let worksheet = self.workbook.worksheet_from_index(0)?;
        let mut record: Vec<String> = Vec::with_capacity(cells.len());
        let mut logged: Vec<LoggedCell> = Vec::with_capacity(cells.len());

        for (i, cell) in cells.iter().enumerate() {
            let col = i as u16;
            let text = cell.render(self.policy);
            match cell {
                Cell::Label(s) => {
                    if is_title {
                        worksheet.write_string_with_format(row, col, s, &self.formats.title)?;
                    } else if header {
                        worksheet.write_string_with_format(row, col, s, &self.formats.header)?;
                    } else {
                        worksheet.write_string(row, col, s)?;
                    }
                }
                Cell::Integer(v) => {
                    worksheet.write_number_with_format(
                        row,
                        col,
                        *v as f64,
                        &self.formats.number,
                    )?;
                }
                Cell::Decimal { value, unit } => {
                    worksheet.write_number_with_format(
                        row,
                        col,
                        *value,
                        &self.formats.decimal(*unit),
                    )?;
                }
                Cell::Percent(PercentChange::NoBaseline) => {
                    worksheet.write_string(row, col, &text)?;
                }
                Cell::Percent(PercentChange::Change(f)) => {
                    let format = if *f < 0.0 {
                        &self.formats.percent_decrease
                    } else if *f > 0.0 {
                        &self.formats.percent_increase
                    } else {
                        &self.formats.percent_flat
                    };
                    worksheet.write_number_with_format(row, col, *f, format)?;
                }
                Cell::Link { url, text: label } => {
                    worksheet.write_url(row, col, Url::new(url).set_text(label))?;
                }
            }
            record.push(text.clone());
            logged.push(LoggedCell { text, font_size });
        }

        self.csv
            .write_record(&record)
            .context("Failed to write delimited report row")?;
        self.csv.flush().context("Failed to flush delimited report")?;

        if is_title {
            self.title = Some(record[0].clone());
        }
        self.max_cols = self.max_cols.max(cells.len() as u16);
        self.row_log.push(logged);
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.row_log.len()
    }

    /// Finalize both artifacts: flush the delimited file, auto-size the
    /// spreadsheet, merge the title row, and save. Returns the output
    /// paths in `[csv, xlsx]` order.
    pub fn close(mut self) -> Result<Vec<PathBuf>> {
        self.csv.flush().context("Failed to flush delimited report")?;

        let worksheet = self.workbook.worksheet_from_index(0)?;

        // column widths from the widest rendered cell, scaled by that
        // cell's font size relative to the base size
        for col in 0..self.max_cols as usize {
            let mut width = 1.0f64;
            for logged in self.row_log.iter().skip(self.header_offset) {
                let Some(cell) = logged.get(col) else { continue };
                let chars = cell.text.trim().chars().count();
                let base = if chars == 0 { 1 } else { chars + WIDTH_PADDING };
                let scaled = (base as f64 * cell.font_size / DEFAULT_FONT_SIZE).round();
                width = width.max(scaled);
            }
            worksheet.set_column_width(col as u16, width)?;
        }

        // row heights from the tallest font in the row
        for (row, logged) in self.row_log.iter().enumerate().skip(self.header_offset) {
            let tallest = logged
                .iter()
                .map(|c| c.font_size)
                .fold(DEFAULT_FONT_SIZE, f64::max);
            worksheet.set_row_height(row as u32, tallest + HEIGHT_PADDING)?;
        }

        if let Some(title) = &self.title {
            if self.max_cols > 1 {
                worksheet.merge_range(0, 0, 0, self.max_cols - 1, title, &self.formats.title)?;
            }
        }

        self.workbook
            .save(&self.xlsx_path)
            .with_context(|| format!("Failed to save {}", self.xlsx_path.display()))?;

        debug!(rows = self.row_log.len(), cols = self.max_cols, "Closed report artifacts");
        Ok(vec![self.csv_path, self.xlsx_path])
    }

    pub fn files(&self) -> Vec<PathBuf> {
        vec![self.csv_path.clone(), self.xlsx_path.clone()]
    }
}
