//! The external collaborators of the pipeline.
//!
//! The library never touches files or the network: acquisition, demographics and
//! boundary geometry are provided through these traits.

use log::{debug, warn};

use crate::config::*;
use crate::geometry::{BoundaryHistory, BoundaryKind, BoundarySet};

#[derive(PartialEq, Debug, Clone)]
pub enum FetchError {
    /// The workbook is not published (yet).
    NotAvailable,
    /// A retryable failure.
    Transient(String),
}

/// Supplies the raw workbook bytes of a `(county, year)` unit.
pub trait WorkbookSource: Sync {
    fn fetch(&self, county: &str, year: Year) -> Result<Vec<u8>, FetchError>;
}

/// Supplies the demographics of a district. Absence is a valid answer.
pub trait DemographicSource: Sync {
    fn lookup(&self, district: &str, year: Year) -> Option<Demographics>;
}

/// Supplies boundary geometries keyed by geography id.
pub trait BoundarySource {
    fn boundaries(&self, kind: BoundaryKind, year: Year) -> Option<BoundarySet>;
}

/// A demographic source that knows nothing.
pub struct NoDemographics;

impl DemographicSource for NoDemographics {
    fn lookup(&self, _district: &str, _year: Year) -> Option<Demographics> {
        None
    }
}

/// Fetches a workbook, retrying transient failures up to `retries` extra times.
pub fn fetch_with_retries(
    source: &dyn WorkbookSource,
    county: &str,
    year: Year,
    retries: u32,
) -> Result<Vec<u8>, PipelineError> {
    let mut attempt = 0;
    loop {
        match source.fetch(county, year) {
            Ok(bytes) => return Ok(bytes),
            Err(FetchError::NotAvailable) => {
                return Err(PipelineError::NotAvailable {
                    county: county.to_string(),
                    year,
                })
            }
            Err(FetchError::Transient(message)) if attempt >= retries => {
                return Err(PipelineError::TransientFetch {
                    county: county.to_string(),
                    year,
                    message,
                })
            }
            Err(FetchError::Transient(message)) => {
                attempt += 1;
                warn!(
                    "fetch_with_retries: {} {}: attempt {} failed: {}",
                    county, year, attempt, message
                );
            }
        }
    }
}

/// Collects every published vintage of a boundary kind among the given years.
pub fn boundary_history(source: &dyn BoundarySource, kind: BoundaryKind, years: &[Year]) -> BoundaryHistory {
    let mut history = BoundaryHistory::new(kind);
    for year in years.iter() {
        if let Some(set) = source.boundaries(kind, *year) {
            debug!(
                "boundary_history: {} {}: {} shapes",
                kind.label(),
                year,
                set.shapes.len()
            );
            history.insert(set);
        }
    }
    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    impl WorkbookSource for Flaky {
        fn fetch(&self, county: &str, _year: Year) -> Result<Vec<u8>, FetchError> {
            if county == "Missing" {
                return Err(FetchError::NotAvailable);
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(FetchError::Transient("timeout".to_string()))
            } else {
                Ok(vec![1, 2, 3])
            }
        }
    }

    #[test]
    fn transient_failures_are_retried() {
        let source = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        assert_eq!(fetch_with_retries(&source, "Polk", 2018, 2), Ok(vec![1, 2, 3]));

        let source = Flaky {
            failures: 5,
            calls: AtomicU32::new(0),
        };
        let err = fetch_with_retries(&source, "Polk", 2018, 2).unwrap_err();
        assert_eq!(err.kind(), DiagnosticKind::TransientFetch);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn missing_workbooks_are_not_retried() {
        let source = Flaky {
            failures: 0,
            calls: AtomicU32::new(0),
        };
        let err = fetch_with_retries(&source, "Missing", 2018, 3).unwrap_err();
        assert_eq!(err.kind(), DiagnosticKind::NotAvailable);
    }

    struct OnlyEvenDecades;

    impl BoundarySource for OnlyEvenDecades {
        fn boundaries(&self, kind: BoundaryKind, year: Year) -> Option<BoundarySet> {
            if year % 10 == 2 {
                Some(BoundarySet {
                    kind,
                    year,
                    shapes: BTreeMap::new(),
                })
            } else {
                None
            }
        }
    }

    #[test]
    fn history_keeps_published_vintages() {
        let h = boundary_history(&OnlyEvenDecades, BoundaryKind::District, &[2012, 2014, 2016, 2022]);
        let years: Vec<Year> = h.vintages.keys().cloned().collect();
        assert_eq!(years, vec![2012, 2022]);
        assert_eq!(NoDemographics.lookup("12", 2018), None);
    }
}
