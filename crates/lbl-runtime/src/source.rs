use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use lbl_core::LabelRow;
use thiserror::Error;

/// Header names of the two required columns. Matched case-insensitively after trimming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelColumns {
    pub image: String,
    pub label: String,
}

impl Default for LabelColumns {
    fn default() -> Self {
        Self {
            image: "image".to_string(),
            label: "label".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceFormatError {
    #[error("read label source {path}: {message}")]
    Read { path: String, message: String },
    #[error("unsupported label source {0:?} (expected .csv, .xlsx, .xlsm, .xls or .ods)")]
    UnsupportedFormat(String),
    #[error("label source has no header row")]
    Empty,
    #[error("label source is missing required column {0:?}")]
    MissingColumn(String),
    #[error("row {row}: empty {column:?} cell")]
    EmptyCell { row: usize, column: String },
}

/// Reads label rows from a CSV file or the first worksheet of a spreadsheet.
pub fn read_label_rows(
    path: &Path,
    columns: &LabelColumns,
) -> Result<Vec<LabelRow>, SourceFormatError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let table = match ext.as_str() {
        "csv" => read_csv_table(path)?,
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_workbook_table(path)?,
        _ => return Err(SourceFormatError::UnsupportedFormat(path.display().to_string())),
    };
    rows_from_table(table, columns)
}

/// Turns raw cell rows into label rows. The first non-blank row is the header.
///
/// Fully blank rows are skipped. Row numbers in errors are 1-based and count every input row.
pub fn rows_from_table<I>(table: I, columns: &LabelColumns) -> Result<Vec<LabelRow>, SourceFormatError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut rows = table
        .into_iter()
        .enumerate()
        .filter(|(_, cells)| cells.iter().any(|c| !c.trim().is_empty()));

    let (_, header) = rows.next().ok_or(SourceFormatError::Empty)?;
    let image_col = find_column(&header, &columns.image)?;
    let label_col = find_column(&header, &columns.label)?;

    let mut out = Vec::new();
    for (i, cells) in rows {
        let row = i + 1;
        let cell = |col: usize, name: &str| -> Result<String, SourceFormatError> {
            let v = cells.get(col).map(|s| s.trim()).unwrap_or("");
            if v.is_empty() {
                return Err(SourceFormatError::EmptyCell {
                    row,
                    column: name.to_string(),
                });
            }
            Ok(v.to_string())
        };
        let image = cell(image_col, &columns.image)?;
        let label = cell(label_col, &columns.label)?;
        out.push(LabelRow::new(image, label));
    }
    Ok(out)
}

fn find_column(header: &[String], name: &str) -> Result<usize, SourceFormatError> {
    let wanted = normalize_header(name);
    header
        .iter()
        .position(|h| normalize_header(h) == wanted)
        .ok_or_else(|| SourceFormatError::MissingColumn(name.to_string()))
}

fn normalize_header(h: &str) -> String {
    h.trim_start_matches('\u{feff}').trim().to_lowercase()
}

fn read_csv_table(path: &Path) -> Result<Vec<Vec<String>>, SourceFormatError> {
    let read_err = |e: csv::Error| SourceFormatError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    };
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(read_err)?;

    let mut table = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(read_err)?;
        table.push(record.iter().map(str::to_string).collect());
    }
    Ok(table)
}

fn read_workbook_table(path: &Path) -> Result<Vec<Vec<String>>, SourceFormatError> {
    let read_err = |message: String| SourceFormatError::Read {
        path: path.display().to_string(),
        message,
    };
    let mut workbook = open_workbook_auto(path).map_err(|e| read_err(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SourceFormatError::Empty)?
        .map_err(|e| read_err(e.to_string()))?;
    Ok(range
        .rows()
        .map(|r| r.iter().map(cell_text).collect())
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        // Spreadsheets store numeric identifiers as floats; `1001.0` is image `1001`.
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let t = table(&[&[" Image ", "LABEL"], &["car1", "scratch"]]);
        let rows = rows_from_table(t, &LabelColumns::default()).unwrap();
        assert_eq!(rows, vec![LabelRow::new("car1", "scratch")]);
    }

    #[test]
    fn extra_columns_and_order_do_not_matter() {
        let t = table(&[
            &["notes", "label", "image"],
            &["", "dent", "car2"],
            &["x", "scratch", "car1"],
        ]);
        let rows = rows_from_table(t, &LabelColumns::default()).unwrap();
        assert_eq!(
            rows,
            vec![LabelRow::new("car2", "dent"), LabelRow::new("car1", "scratch")]
        );
    }

    #[test]
    fn missing_column_is_a_format_error() {
        let t = table(&[&["image", "class"], &["car1", "scratch"]]);
        let err = rows_from_table(t, &LabelColumns::default()).unwrap_err();
        assert!(matches!(err, SourceFormatError::MissingColumn(ref c) if c == "label"));
    }

    #[test]
    fn blank_rows_skipped_but_partial_rows_rejected() {
        let t = table(&[
            &["", ""],
            &["image", "label"],
            &["car1", "scratch"],
            &["", ""],
            &["car3", " "],
        ]);
        let err = rows_from_table(t, &LabelColumns::default()).unwrap_err();
        assert!(matches!(err, SourceFormatError::EmptyCell { row: 5, ref column } if column == "label"));
    }

    #[test]
    fn short_rows_count_as_empty_cells() {
        let t = table(&[&["image", "label"], &["car1"]]);
        let err = rows_from_table(t, &LabelColumns::default()).unwrap_err();
        assert!(matches!(err, SourceFormatError::EmptyCell { row: 2, .. }));
    }

    #[test]
    fn empty_table_has_no_header() {
        let t = table(&[&["", " "]]);
        assert!(matches!(
            rows_from_table(t, &LabelColumns::default()),
            Err(SourceFormatError::Empty)
        ));
    }

    #[test]
    fn bom_prefixed_header_matches() {
        let t = table(&[&["\u{feff}image", "label"], &["a", "b"]]);
        assert_eq!(rows_from_table(t, &LabelColumns::default()).unwrap().len(), 1);
    }

    #[test]
    fn float_cells_render_as_integers() {
        assert_eq!(cell_text(&Data::Float(1001.0)), "1001");
        assert_eq!(cell_text(&Data::Float(1.5)), "1.5");
        assert_eq!(cell_text(&Data::Empty), "");
    }
}
