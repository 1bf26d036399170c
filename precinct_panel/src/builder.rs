pub use crate::config::*;

/// A builder for sheets and workbooks.
///
/// Cells are given as text: empty strings become empty cells and anything
/// that reads as a number becomes a numeric cell, the way spreadsheet
/// readers hand them over.
///
/// ```
/// use precinct_panel::builder::{SheetBuilder, WorkbookBuilder};
/// use precinct_panel::CellValue;
///
/// let sheet = SheetBuilder::new("Governor")
///     .row(&["Precinct", "Reynolds (R)", "Hubbell (D)"])
///     .row(&["Ward 1", "120", ""])
///     .build();
/// assert_eq!(sheet.value(1, 1), &CellValue::Number(120.0));
/// assert_eq!(sheet.value(1, 2), &CellValue::Empty);
///
/// let workbook = WorkbookBuilder::new().sheet(sheet).build();
/// assert_eq!(workbook.sheets.len(), 1);
/// ```
pub struct SheetBuilder {
    _name: String,
    _rows: Vec<Vec<CellValue>>,
}

impl SheetBuilder {
    pub fn new(name: &str) -> SheetBuilder {
        SheetBuilder {
            _name: name.to_string(),
            _rows: Vec::new(),
        }
    }

    /// Adds a row of cells written as text.
    pub fn row(mut self, cells: &[&str]) -> SheetBuilder {
        self._rows.push(cells.iter().map(|s| text_cell(s)).collect());
        self
    }

    /// Adds a row of typed cells.
    pub fn cells(mut self, cells: Vec<CellValue>) -> SheetBuilder {
        self._rows.push(cells);
        self
    }

    pub fn build(self) -> Sheet {
        Sheet::new(&self._name, self._rows)
    }
}

fn text_cell(s: &str) -> CellValue {
    let t = s.trim();
    if t.is_empty() {
        CellValue::Empty
    } else if let Ok(f) = t.parse::<f64>() {
        CellValue::Number(f)
    } else {
        CellValue::Text(s.to_string())
    }
}

#[derive(Default)]
pub struct WorkbookBuilder {
    _sheets: Vec<Sheet>,
}

impl WorkbookBuilder {
    pub fn new() -> WorkbookBuilder {
        WorkbookBuilder::default()
    }

    pub fn sheet(mut self, sheet: Sheet) -> WorkbookBuilder {
        self._sheets.push(sheet);
        self
    }

    pub fn build(self) -> Workbook {
        Workbook {
            sheets: self._sheets,
        }
    }
}
