// File-backed workbook acquisition.

use std::error::Error;
use std::io::ErrorKind;

use precinct_panel::collaborators::{fetch_with_retries, FetchError, WorkbookSource};
use rayon::prelude::*;

use crate::panel::*;

pub const DEFAULT_RETRIES: u32 = 2;
const DEFAULT_PATTERN: &str = "{county}_{year}.xlsx";

/// Reads `<workbookDirectory>/<fileNamePattern>`.
pub struct FileWorkbookSource {
    directory: PathBuf,
    pattern: String,
}

impl FileWorkbookSource {
    pub fn new(root: &Path, sources: &SourceSettings) -> FileWorkbookSource {
        FileWorkbookSource {
            directory: io_common::resolve_path(root, &sources.workbook_directory),
            pattern: sources
                .file_name_pattern
                .clone()
                .unwrap_or_else(|| DEFAULT_PATTERN.to_string()),
        }
    }

    fn path_of(&self, county: &str, year: Year) -> PathBuf {
        self.directory
            .join(io_common::fill_pattern(&self.pattern, county, year))
    }
}

impl WorkbookSource for FileWorkbookSource {
    fn fetch(&self, county: &str, year: Year) -> Result<Vec<u8>, FetchError> {
        let path = self.path_of(county, year);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(FetchError::NotAvailable),
            Err(e) => Err(FetchError::Transient(format!("{}: {}", path.display(), e))),
        }
    }
}

fn load_unit(
    source: &dyn WorkbookSource,
    county: &str,
    year: Year,
    retries: u32,
) -> Result<UnitInput, Diagnostic> {
    let unit = format!("{} {}", county, year);
    let bytes = fetch_with_retries(source, county, year, retries).map_err(|e| {
        warn!("load_unit: {}: skipped: {}", unit, e);
        Diagnostic::from_error(Stage::Acquisition, &e).unit(county, year)
    })?;
    let workbook = io_workbook::parse_workbook(bytes, &unit).map_err(|e| {
        warn!("load_unit: {}: unreadable workbook: {}", unit, e);
        let message = match e.source() {
            Some(cause) => format!("{}: {}", e, cause),
            None => e.to_string(),
        };
        Diagnostic::new(Stage::Acquisition, DiagnosticKind::UnreadableWorkbook, message)
            .unit(county, year)
    })?;
    Ok(UnitInput {
        county: county.to_string(),
        year,
        workbook,
    })
}

/// Fetches and parses every `(county, year)` unit in parallel.
///
/// Units that cannot be fetched or read are skipped with a diagnostic.
pub fn load_units(
    source: &dyn WorkbookSource,
    counties: &[String],
    years: &[Year],
    retries: u32,
) -> (Vec<UnitInput>, Vec<Diagnostic>) {
    let pairs: Vec<(&str, Year)> = counties
        .iter()
        .flat_map(|c| years.iter().map(move |y| (c.as_str(), *y)))
        .collect();
    let loaded: Vec<Result<UnitInput, Diagnostic>> = pairs
        .par_iter()
        .map(|(county, year)| load_unit(source, county, *year, retries))
        .collect();
    let mut units: Vec<UnitInput> = Vec::new();
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    for r in loaded.into_iter() {
        match r {
            Ok(u) => units.push(u),
            Err(d) => diagnostics.push(d),
        }
    }
    info!(
        "load_units: {} of {} units loaded",
        units.len(),
        pairs.len()
    );
    (units, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl WorkbookSource for Fixed {
        fn fetch(&self, county: &str, _year: Year) -> Result<Vec<u8>, FetchError> {
            match county {
                "Polk" => Ok(b"not a workbook".to_vec()),
                "Story" => Err(FetchError::Transient("disk".to_string())),
                _ => Err(FetchError::NotAvailable),
            }
        }
    }

    #[test]
    fn failed_units_become_diagnostics() {
        let counties = vec!["Polk".to_string(), "Story".to_string(), "Linn".to_string()];
        let (units, diagnostics) = load_units(&Fixed, &counties, &[2018], 1);
        assert!(units.is_empty());
        let mut kinds: Vec<&str> = diagnostics.iter().map(|d| d.error_kind.label()).collect();
        kinds.sort();
        assert_eq!(
            kinds,
            vec!["NotAvailableError", "TransientFetchError", "UnreadableWorkbook"]
        );
        assert!(diagnostics.iter().all(|d| d.year == Some(2018)));
    }

    #[test]
    fn missing_files_are_not_available() {
        let sources = SourceSettings {
            counties: vec!["Polk".to_string()],
            years: vec![2018],
            workbook_directory: "no_such_directory".to_string(),
            file_name_pattern: Some("{county}-{year}.xls".to_string()),
            fetch_retries: None,
            boundary_directory: None,
            projects_file: None,
            demographics_file: None,
        };
        let source = FileWorkbookSource::new(Path::new("/nonexistent"), &sources);
        assert_eq!(
            source.path_of("Polk", 2018),
            PathBuf::from("/nonexistent/no_such_directory/Polk-2018.xls")
        );
        assert_eq!(source.fetch("Polk", 2018), Err(FetchError::NotAvailable));
    }
}
