//! Run report: one spreadsheet row per record with a clickable document link.

use indexmap::IndexSet;
use rust_xlsxwriter::{Format, Formula, Workbook, XlsxError};

use crate::results::OutputRecord;

pub const SHEET_NAME: &str = "PDF Links";
pub const PDF_NAME_COLUMN: &str = "pdfName";
pub const PDF_URL_COLUMN: &str = "pdfUrl";
pub const ERROR_COLUMN: &str = "error";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to build workbook: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("report has {columns} columns, more than a worksheet holds")]
    TooWide { columns: usize },
}

pub type ReportResult<T> = Result<T, ReportError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportCell {
    Empty,
    Text(String),
    /// Rendered as `HYPERLINK(url, text)`.
    Link { url: String, text: String },
}

/// Tabular form of the exported records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<ReportCell>>,
}

impl ReportTable {
    /// Header is the union of row fields in first-seen order, followed by
    /// `pdfName`, `pdfUrl` and `error`.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a OutputRecord>) -> Self {
        let records: Vec<&OutputRecord> = records.into_iter().collect();

        let fields: IndexSet<&str> = records
            .iter()
            .copied()
            .flat_map(|r| r.fields.field_names())
            .collect();

        let mut columns: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        columns.extend([PDF_NAME_COLUMN, PDF_URL_COLUMN, ERROR_COLUMN].map(String::from));

        let rows = records
            .iter()
            .map(|record| {
                let mut cells: Vec<ReportCell> = fields
                    .iter()
                    .map(|f| match record.fields.display_value(f) {
                        Some(text) => ReportCell::Text(text),
                        None => ReportCell::Empty,
                    })
                    .collect();
                cells.push(ReportCell::Text(record.pdf_name.clone()));
                cells.push(match record.document_url() {
                    Some(url) => ReportCell::Link {
                        url: url.to_string(),
                        text: format!("{}.pdf", record.pdf_name),
                    },
                    None => ReportCell::Empty,
                });
                cells.push(match record.error_reason() {
                    Some(reason) => ReportCell::Text(reason.to_string()),
                    None => ReportCell::Empty,
                });
                cells
            })
            .collect();

        Self { columns, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// `HYPERLINK("<url>","<text>")` with embedded quotes doubled.
pub fn hyperlink_formula(url: &str, text: &str) -> String {
    format!(
        "HYPERLINK(\"{}\",\"{}\")",
        url.replace('"', "\"\""),
        text.replace('"', "\"\"")
    )
}

/// Serialize the table as an xlsx workbook with a single "PDF Links" sheet.
pub fn write_xlsx(table: &ReportTable) -> ReportResult<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, name) in table.columns.iter().enumerate() {
        let col = column(col, table.columns.len())?;
        sheet.write_string_with_format(0, col, name, &header)?;
    }

    for (idx, cells) in table.rows.iter().enumerate() {
        let row = u32::try_from(idx + 1).map_err(|_| XlsxError::RowColumnLimitError)?;
        for (col, cell) in cells.iter().enumerate() {
            let col = column(col, table.columns.len())?;
            match cell {
                ReportCell::Empty => {}
                ReportCell::Text(text) => {
                    sheet.write_string(row, col, text)?;
                }
                ReportCell::Link { url, text } => {
                    sheet.write_formula(row, col, Formula::new(hyperlink_formula(url, text)))?;
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

fn column(index: usize, columns: usize) -> ReportResult<u16> {
    u16::try_from(index).map_err(|_| ReportError::TooWide { columns })
}
