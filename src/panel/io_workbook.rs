// Reading election workbooks (xlsx and legacy xls) into the library's sheet model.

use std::io::Cursor;

use calamine::{DataType, Range, Reader, Xls, Xlsx};

use crate::panel::*;

fn cell_value(cell: &DataType) -> CellValue {
    match cell {
        DataType::Empty => CellValue::Empty,
        DataType::String(s) => CellValue::Text(s.clone()),
        DataType::Float(f) => CellValue::Number(*f),
        DataType::Int(i) => CellValue::Number(*i as f64),
        DataType::DateTime(f) => CellValue::Number(*f),
        DataType::Bool(b) => CellValue::Text(b.to_string()),
        DataType::Error(e) => {
            debug!("cell_value: error cell {:?} read as empty", e);
            CellValue::Empty
        }
    }
}

/// The range starts at its first used cell: the rows and columns before it are put back
/// so that positions match the spreadsheet.
fn range_to_sheet(name: &str, range: &Range<DataType>) -> Sheet {
    let (row0, col0) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));
    let mut rows: Vec<Vec<CellValue>> = vec![Vec::new(); row0];
    for row in range.rows() {
        let mut cells: Vec<CellValue> = vec![CellValue::Empty; col0];
        cells.extend(row.iter().map(cell_value));
        rows.push(cells);
    }
    Sheet::new(name, rows)
}

fn read_sheets<R: Reader>(mut workbook: R, unit: &str) -> PanelResult<Workbook>
where
    calamine::Error: From<R::Error>,
{
    let names: Vec<String> = workbook.sheet_names().to_vec();
    let mut sheets: Vec<Sheet> = Vec::new();
    for name in names.iter() {
        let range = match workbook.worksheet_range(name) {
            Some(r) => r
                .map_err(calamine::Error::from)
                .context(OpeningExcelSnafu { unit })?,
            None => continue,
        };
        debug!(
            "read_sheets: {}: sheet {:?}: {:?}",
            unit,
            name,
            range.get_size()
        );
        sheets.push(range_to_sheet(name, &range));
    }
    if sheets.is_empty() {
        return Err(PanelError::EmptyExcel {
            unit: unit.to_string(),
        });
    }
    Ok(Workbook { sheets })
}

/// Parses the bytes of a workbook. Zip containers are read as xlsx, anything else as xls.
pub fn parse_workbook(bytes: Vec<u8>, unit: &str) -> PanelResult<Workbook> {
    if bytes.starts_with(b"PK") {
        let workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
            .map_err(calamine::Error::from)
            .context(OpeningExcelSnafu { unit })?;
        read_sheets(workbook, unit)
    } else {
        let workbook: Xls<_> = Xls::new(Cursor::new(bytes))
            .map_err(calamine::Error::from)
            .context(OpeningExcelSnafu { unit })?;
        read_sheets(workbook, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_keep_their_scalar_value() {
        assert_eq!(cell_value(&DataType::Int(12)), CellValue::Number(12.0));
        assert_eq!(
            cell_value(&DataType::String("Ward 1".to_string())),
            CellValue::Text("Ward 1".to_string())
        );
        assert_eq!(cell_value(&DataType::Empty), CellValue::Empty);
    }

    #[test]
    fn ranges_keep_their_offset() {
        let mut range: Range<DataType> = Range::new((2, 1), (3, 2));
        range.set_value((2, 1), DataType::String("Precinct".to_string()));
        range.set_value((3, 2), DataType::Float(5.0));
        let sheet = range_to_sheet("Governor", &range);
        assert_eq!(sheet.label(2, 1), "Precinct");
        assert_eq!(sheet.value(3, 2), &CellValue::Number(5.0));
        assert!(sheet.value(0, 0).is_empty());
    }

    #[test]
    fn garbage_is_unreadable() {
        assert!(parse_workbook(b"PK not a zip".to_vec(), "Polk 2018").is_err());
        assert!(parse_workbook(b"plain text".to_vec(), "Polk 2018").is_err());
    }
}
