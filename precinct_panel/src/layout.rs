// Workbook layout resolution: which sheets hold which contest, and how each one is laid out.

use std::collections::BTreeMap;

use log::{debug, info, warn};

use crate::classify::parse_header;
use crate::config::*;
use crate::matching::Matchers;

/// Weight of an office found through a table of contents.
pub const TOC_WEIGHT: u32 = 4;
/// Weight of an office found in the sheet name.
pub const TITLE_WEIGHT: u32 = 2;
/// Weight of an office found in the title cells of the sheet.
pub const CONTENT_WEIGHT: u32 = 1;

#[derive(PartialEq, Debug, Clone, Default)]
pub struct LayoutReport {
    /// Descriptors of the contest sheets and of the unknown sheets, in workbook order.
    pub descriptors: Vec<SheetDescriptor>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(PartialEq, Debug, Clone, Copy)]
struct HeaderGuess {
    orientation: Orientation,
    header_row: usize,
    candidate_row: Option<usize>,
    race_column: Option<usize>,
}

impl HeaderGuess {
    const UNKNOWN: HeaderGuess = HeaderGuess {
        orientation: Orientation::Unknown,
        header_row: 0,
        candidate_row: None,
        race_column: None,
    };
}

#[derive(Debug, Default)]
struct HeaderSignals {
    has_precinct: bool,
    /// Candidates carrying a party or a vote type.
    qualified: usize,
    names: usize,
    keyword_cols: Vec<usize>,
}

impl HeaderSignals {
    fn qualifies(&self) -> bool {
        self.qualified > 0 || !self.keyword_cols.is_empty() || (self.has_precinct && self.names > 0)
    }

    fn is_vote_types_only(&self) -> bool {
        self.qualified == 0 && self.names == 0 && !self.keyword_cols.is_empty()
    }

    fn has_text_above(&self, sheet: &Sheet, above: usize) -> bool {
        self.keyword_cols
            .iter()
            .any(|c| !sheet.value(above, *c).is_empty())
    }
}

// Column 0 holds the precinct names of a header row, never a candidate.
fn header_signals(sheet: &Sheet, row: usize, m: &Matchers) -> HeaderSignals {
    let mut sig = HeaderSignals::default();
    let labels = row_labels(sheet, row);
    if labels.len() < 2 {
        return sig;
    }
    for (c, l) in labels.iter() {
        if m.is_precinct_label(l) {
            sig.has_precinct = true;
            continue;
        }
        if *c == 0 || matches!(sheet.value(row, *c), CellValue::Number(_)) {
            continue;
        }
        let parts = parse_header(l, m);
        match parts.candidate {
            Some(_) if parts.explicit_party || parts.tag != VoteColumnTag::CandidateName => {
                sig.qualified += 1
            }
            Some(_) => sig.names += 1,
            None if parts.tag != VoteColumnTag::Unknown => sig.keyword_cols.push(*c),
            None => {}
        }
    }
    sig
}

fn row_labels(sheet: &Sheet, row: usize) -> Vec<(usize, String)> {
    (0..sheet.width())
        .map(|c| (c, sheet.label(row, c)))
        .filter(|(_, l)| !l.is_empty())
        .collect()
}

/// Decides the orientation of a sheet and where its header sits.
fn detect_header(sheet: &Sheet, m: &Matchers) -> HeaderGuess {
    let scan = m.rules.header_scan_rows.min(sheet.height());

    // 1. A candidate column label: one row per candidate.
    for r in 0..scan {
        let labels = row_labels(sheet, r);
        if labels.iter().any(|(_, l)| m.is_candidate_label(l)) {
            return HeaderGuess {
                orientation: Orientation::CandidatesAsRows,
                header_row: r,
                candidate_row: None,
                race_column: labels
                    .iter()
                    .find(|(_, l)| m.is_race_label(l))
                    .map(|(c, _)| *c),
            };
        }
    }

    // 2. A header row of vote-type keywords or party-suffixed candidates.
    for r in 0..scan {
        let sig = header_signals(sheet, r, m);
        if !sig.qualifies() {
            continue;
        }
        let race_column = row_labels(sheet, r)
            .iter()
            .find(|(_, l)| m.is_race_label(l))
            .map(|(c, _)| *c);
        // Candidate names above a row of vote types only, spanning columns.
        if r + 1 < scan {
            let below = header_signals(sheet, r + 1, m);
            if below.is_vote_types_only() && below.has_text_above(sheet, r) {
                return HeaderGuess {
                    orientation: Orientation::CandidatesAsColumns,
                    header_row: r + 1,
                    candidate_row: Some(r),
                    race_column,
                };
            }
        }
        let candidate_row = if r > 0 && sig.is_vote_types_only() && sig.has_text_above(sheet, r - 1) {
            Some(r - 1)
        } else {
            None
        };
        return HeaderGuess {
            orientation: Orientation::CandidatesAsColumns,
            header_row: r,
            candidate_row,
            race_column,
        };
    }

    // 3. Candidates (with vote types or parties) listed down the first column.
    let first_match = (0..sheet.height()).find(|r| {
        let parts = parse_header(&sheet.label(*r, 0), m);
        parts.candidate.is_some()
            && (parts.explicit_party || parts.tag != VoteColumnTag::CandidateName)
    });
    if let Some(first) = first_match {
        let header = (0..first).rev().find(|r| row_labels(sheet, *r).len() >= 2);
        if let Some(h) = header {
            return HeaderGuess {
                orientation: Orientation::CandidatesAsRows,
                header_row: h,
                candidate_row: None,
                race_column: None,
            };
        }
    }
    HeaderGuess::UNKNOWN
}

fn is_toc_sheet(sheet: &Sheet, guess: &HeaderGuess, m: &Matchers) -> bool {
    if m.is_toc_label(&sheet.name) {
        return true;
    }
    if guess.orientation != Orientation::Unknown {
        return false;
    }
    let texts: Vec<String> = sheet
        .cells()
        .filter(|c| matches!(c.value, CellValue::Text(_)))
        .map(|c| c.label())
        .collect();
    let offices = texts.iter().filter(|t| m.office_for(t).is_some()).count();
    texts.len() >= 2 && offices * 2 >= texts.len()
}

/// Maps the rows of a table of contents to the sheets they describe.
fn read_toc(
    toc_index: usize,
    workbook: &Workbook,
    guesses: &[HeaderGuess],
    skipped: &[bool],
    m: &Matchers,
) -> BTreeMap<usize, String> {
    let toc = &workbook.sheets[toc_index];
    let mut mapped: BTreeMap<usize, String> = BTreeMap::new();
    let mut pending: Vec<String> = Vec::new();
    for r in 0..toc.height() {
        let labels = row_labels(toc, r);
        let entry = match labels.iter().find(|(_, l)| m.office_for(l).is_some()) {
            Some((_, l)) => l.clone(),
            None => continue,
        };
        // A sheet named in the row, else a 1-based sheet position.
        let by_name = labels.iter().find_map(|(_, l)| {
            workbook.sheets.iter().position(|s| {
                s.name.trim().eq_ignore_ascii_case(l.trim())
            })
        });
        let by_position = labels.iter().find_map(|(c, _)| match toc.value(r, *c) {
            CellValue::Number(f) if f.fract() == 0.0 && *f >= 1.0 => {
                let idx = *f as usize - 1;
                if idx < workbook.sheets.len() {
                    Some(idx)
                } else {
                    None
                }
            }
            _ => None,
        });
        match by_name.or(by_position).filter(|idx| *idx != toc_index) {
            Some(idx) => {
                mapped.entry(idx).or_insert(entry);
            }
            None => pending.push(entry),
        }
    }

    // Unreferenced entries go to the next contest sheets in workbook order.
    let mut free = (0..workbook.sheets.len()).filter(|idx| {
        *idx != toc_index && !skipped[*idx] && guesses[*idx].orientation != Orientation::Unknown
    });
    let mut leftovers = 0;
    for entry in pending.into_iter() {
        match free.find(|idx| !mapped.contains_key(idx)) {
            Some(idx) => {
                mapped.insert(idx, entry);
            }
            None => leftovers += 1,
        }
    }
    if leftovers > 0 {
        debug!(
            "read_toc: {} table of contents entries without a matching sheet",
            leftovers
        );
    }
    mapped
}

/// Resolves, for every sheet of a workbook, the office it reports and how it is laid out.
///
/// Non-contest sheets (tables of contents, turnout, summaries) and empty sheets are
/// skipped quietly. Sheets that cannot be associated with any office are returned
/// with an `Unknown` orientation and an `UnknownSheet` diagnostic.
pub fn resolve_layout(
    county: &str,
    year: Year,
    workbook: &Workbook,
    matchers: &Matchers,
) -> LayoutReport {
    let m = matchers;
    let guesses: Vec<HeaderGuess> = workbook
        .sheets
        .iter()
        .map(|s| detect_header(s, m))
        .collect();
    let tocs: Vec<bool> = workbook
        .sheets
        .iter()
        .zip(guesses.iter())
        .map(|(s, g)| is_toc_sheet(s, g, m))
        .collect();
    let skipped: Vec<bool> = workbook
        .sheets
        .iter()
        .zip(tocs.iter())
        .map(|(s, toc)| *toc || s.cells().next().is_none())
        .collect();

    let mut toc_map: BTreeMap<usize, String> = BTreeMap::new();
    for (idx, _) in tocs.iter().enumerate().filter(|(_, t)| **t) {
        for (k, v) in read_toc(idx, workbook, &guesses, &skipped, m).into_iter() {
            toc_map.entry(k).or_insert(v);
        }
    }

    let mut report = LayoutReport::default();
    for (idx, sheet) in workbook.sheets.iter().enumerate() {
        if skipped[idx] {
            debug!("resolve_layout: skipping sheet {:?}", sheet.name);
            continue;
        }
        let guess = guesses[idx];
        let toc_label = toc_map.get(&idx).cloned();
        let title_label = if m.office_for(&sheet.name).is_some() {
            Some(sheet.name.trim().to_string())
        } else {
            None
        };
        // An office in the title wins over a non-contest word ("Summary - Governor").
        if toc_label.is_none() && title_label.is_none() && m.is_non_contest_label(&sheet.name) {
            debug!("resolve_layout: non-contest sheet {:?}", sheet.name);
            continue;
        }
        let title_rows = if guess.orientation == Orientation::Unknown {
            m.rules.header_scan_rows.min(sheet.height())
        } else {
            guess.candidate_row.unwrap_or(guess.header_row)
        };
        let content_label = (0..title_rows)
            .flat_map(|r| row_labels(sheet, r).into_iter().map(|(_, l)| l))
            .find(|l| m.office_for(l).is_some());

        let mut confidence = 0;
        for (label, weight) in [
            (&toc_label, TOC_WEIGHT),
            (&title_label, TITLE_WEIGHT),
            (&content_label, CONTENT_WEIGHT),
        ]
        .iter()
        {
            if label.is_some() {
                confidence += weight;
            }
        }

        let chosen = toc_label
            .clone()
            .or_else(|| title_label.clone())
            .or_else(|| content_label.clone());
        let office = chosen.as_ref().and_then(|l| m.office_for(l));
        let district = office.as_ref().and_then(|o| {
            [&chosen, &toc_label, &title_label, &content_label]
                .iter()
                .filter_map(|l| l.as_ref())
                .filter(|l| m.office_for(l).as_ref() == Some(o))
                .find_map(|l| m.district_in(l))
        });
        let race_column = guess.race_column;

        if office.is_none() && race_column.is_none() {
            warn!(
                "resolve_layout: {} {}: no office found for sheet {:?}",
                county, year, sheet.name
            );
            report.diagnostics.push(
                Diagnostic::new(
                    Stage::Layout,
                    DiagnosticKind::UnknownSheet,
                    format!("no office could be associated with sheet {:?}", sheet.name),
                )
                .unit(county, year)
                .sheet(&sheet.name),
            );
            report.descriptors.push(SheetDescriptor {
                sheet_id: sheet.name.clone(),
                sheet_index: idx,
                inferred_office_label: None,
                office: None,
                district: None,
                orientation: Orientation::Unknown,
                confidence_score: confidence,
                header_row: guess.header_row,
                candidate_row: None,
                race_column: None,
            });
            continue;
        }

        debug!(
            "resolve_layout: sheet {:?}: office {:?} district {:?} orientation {:?} header {} confidence {}",
            sheet.name, office, district, guess.orientation, guess.header_row, confidence
        );
        report.descriptors.push(SheetDescriptor {
            sheet_id: sheet.name.clone(),
            sheet_index: idx,
            inferred_office_label: chosen,
            office,
            district,
            orientation: guess.orientation,
            confidence_score: confidence,
            header_row: guess.header_row,
            candidate_row: guess.candidate_row,
            race_column,
        });
    }
    info!(
        "resolve_layout: {} {}: {} sheets, {} contest sheets",
        county,
        year,
        workbook.sheets.len(),
        report.descriptors.iter().filter(|d| d.is_contest()).count()
    );
    report
}
