//! CSV projection of the permit log.
//!
//! Every cell, headings included, is wrapped in double quotes and embedded
//! quotes are doubled, so free text containing commas, quotes or line breaks
//! survives a round trip through any standard CSV reader.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::permit::{Permit, SHEET_COLUMNS};

/// Prefix of every export file name.
pub const EXPORT_FILE_PREFIX: &str = "Permit_Log";

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

fn line<'a>(cells: impl IntoIterator<Item = &'a str>) -> String {
    cells.into_iter().map(quote).collect::<Vec<_>>().join(",")
}

/// Render `permits` as CSV: a heading row, then one row per permit in the
/// given order.
pub fn to_csv(permits: &[Permit]) -> String {
    let mut lines = Vec::with_capacity(permits.len() + 1);
    lines.push(line(SHEET_COLUMNS));
    lines.extend(permits.iter().map(|p| line(p.sheet_row())));
    lines.join("\n")
}

/// `Permit_Log_<project>_<YYYY-MM-DD>.csv`
///
/// Path separators in the project key are replaced so the name stays a
/// single path component.
pub fn export_file_name(project: &str, date: NaiveDate) -> String {
    let project: String = project
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    format!(
        "{EXPORT_FILE_PREFIX}_{project}_{}.csv",
        date.format("%Y-%m-%d")
    )
}

/// Write the export for `project` into `dir` and return the file path.
pub fn write_export(
    dir: &Path,
    project: &str,
    permits: &[Permit],
    date: NaiveDate,
) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(project, date));
    std::fs::write(&path, to_csv(permits))?;
    tracing::info!(
        "Exported {} permit(s) for '{project}' to {}",
        permits.len(),
        path.display()
    );
    Ok(path)
}
