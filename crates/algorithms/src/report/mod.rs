//! Per-region tables and delimited export
//!
//! Assembles reduction or derived values into a rectangular table (one
//! row per region, one column per statistic key) and writes it as
//! delimited text. Cells stay `Option<f64>` until rendering, so the
//! null policy is an export decision: `N/A` and `0.00` never collapse
//! into each other by accident.

use std::io;
use std::path::Path;

use tracing::info;

use crate::aggregate::RegionReduction;
use zonalis_core::{Error, RegionSet, Result};

/// How a rendered table shows a null (uncomputable) value.
#[derive(Debug, Clone, PartialEq)]
pub enum NullPolicy {
    /// Render nulls as a marker text, keeping them distinct from zero.
    Propagate { text: String },
    /// Render nulls as zero. Use only when the consumer treats missing
    /// and zero alike; the distinction is lost in the output.
    ZeroFill,
}

impl Default for NullPolicy {
    fn default() -> Self {
        NullPolicy::Propagate {
            text: "N/A".to_string(),
        }
    }
}

/// Rendering options for delimited export.
#[derive(Debug, Clone)]
pub struct TableOptions {
    pub null_policy: NullPolicy,
    /// Decimal places of numeric cells.
    pub precision: usize,
    /// Field delimiter byte.
    pub delimiter: u8,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            null_policy: NullPolicy::default(),
            precision: 2,
            delimiter: b',',
        }
    }
}

/// A per-region table: rows in region order, columns by explicit key.
///
/// A key missing from a region entirely renders the same as a null
/// value; selection mistakes show up as visible `N/A` columns instead
/// of silently shrinking the table.
#[derive(Debug, Clone)]
pub struct RegionTable {
    columns: Vec<String>,
    rows: Vec<(String, Vec<Option<f64>>)>,
}

impl RegionTable {
    /// Table over reduction results, in batch order.
    pub fn from_reductions(reductions: &[RegionReduction], columns: &[&str]) -> Self {
        let rows = reductions
            .iter()
            .map(|r| {
                let cells = columns.iter().map(|key| r.value(key)).collect();
                (r.region().to_string(), cells)
            })
            .collect();
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    /// Table over the derived attributes already attached to regions.
    pub fn from_regions(regions: &RegionSet, columns: &[&str]) -> Self {
        let rows = regions
            .iter()
            .map(|region| {
                let cells = columns
                    .iter()
                    .map(|key| region.derived(key).flatten())
                    .collect();
                (region.name().to_string(), cells)
            })
            .collect();
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell by row index and column key, flattened like
    /// [`RegionReduction::value`](crate::aggregate::RegionReduction::value).
    pub fn cell(&self, row: usize, column: &str) -> Option<f64> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.1.get(col).copied().flatten()
    }

    /// Write the table as delimited text, header first.
    pub fn write_csv<W: io::Write>(&self, writer: W, options: &TableOptions) -> Result<()> {
        let mut out = csv::WriterBuilder::new()
            .delimiter(options.delimiter)
            .from_writer(writer);

        out.write_record(
            std::iter::once("region").chain(self.columns.iter().map(String::as_str)),
        )
        .map_err(csv_error)?;

        for (region, cells) in &self.rows {
            let rendered: Vec<String> = cells.iter().map(|c| render_cell(*c, options)).collect();
            out.write_record(
                std::iter::once(region.as_str()).chain(rendered.iter().map(String::as_str)),
            )
            .map_err(csv_error)?;
        }
        out.flush()?;
        Ok(())
    }

    /// The table as one delimited string.
    pub fn to_csv_string(&self, options: &TableOptions) -> Result<String> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf, options)?;
        String::from_utf8(buf).map_err(|e| Error::Other(e.to_string()))
    }

    /// Write the table to a file.
    pub fn write_csv_path<P: AsRef<Path>>(&self, path: P, options: &TableOptions) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        self.write_csv(file, options)?;
        info!(
            path = %path.as_ref().display(),
            rows = self.rows.len(),
            columns = self.columns.len(),
            "wrote region table"
        );
        Ok(())
    }
}

fn render_cell(value: Option<f64>, options: &TableOptions) -> String {
    match value {
        Some(v) => format!("{:.*}", options.precision, v),
        None => match &options.null_policy {
            NullPolicy::Propagate { text } => text.clone(),
            NullPolicy::ZeroFill => format!("{:.*}", options.precision, 0.0),
        },
    }
}

fn csv_error(e: csv::Error) -> Error {
    Error::Other(e.to_string())
}
