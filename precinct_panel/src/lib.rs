mod config;
use log::{debug, info, warn};
use rayon::prelude::*;

use std::collections::BTreeMap;

pub mod aggregate;
pub mod builder;
pub mod classify;
pub mod collaborators;
pub mod geometry;
pub mod layout;
pub mod manual;
pub mod matching;
pub mod merge;
pub mod rollup;
pub mod spatial;
pub mod temporal;

pub use crate::config::*;
pub use crate::matching::Matchers;

use crate::collaborators::DemographicSource;
use crate::geometry::{district_shape_key, precinct_shape_key, BoundaryHistory};
use crate::spatial::overlay;
use crate::temporal::{link_incumbency, LinkBoundaries, PriorCycle};

// **** Units ****

/// One `(county, year)` workbook, already parsed.
#[derive(PartialEq, Debug, Clone)]
pub struct UnitInput {
    pub county: String,
    pub year: Year,
    pub workbook: Workbook,
}

#[derive(PartialEq, Debug, Clone)]
pub struct UnitOutcome {
    pub county: String,
    pub year: Year,
    /// Empty when the unit is excluded.
    pub records: Vec<CanonicalPrecinctRecord>,
    pub diagnostics: Vec<Diagnostic>,
    /// Set when the unit could not be reconciled. Its records are not part of the panel.
    pub excluded: bool,
}

/// Runs layout resolution, classification and merging for one unit.
///
/// Data problems never escape this function: a sheet that cannot be classified is
/// skipped with a diagnostic, and a conflict between sheets excludes the unit.
pub fn process_unit(unit: &UnitInput, matchers: &Matchers) -> UnitOutcome {
    let county = unit.county.as_str();
    let year = unit.year;
    let layout = layout::resolve_layout(county, year, &unit.workbook, matchers);
    let mut diagnostics = layout.diagnostics;
    let mut candidate_records: Vec<CandidateVoteRecord> = Vec::new();

    for descriptor in layout.descriptors.iter() {
        if descriptor.office.is_none() && descriptor.race_column.is_none() {
            continue;
        }
        let sheet = match unit.workbook.sheets.get(descriptor.sheet_index) {
            Some(s) => s,
            None => continue,
        };
        match classify::classify_sheet(county, year, sheet, descriptor, matchers) {
            Ok(classified) => {
                debug!(
                    "process_unit: {} {}: sheet {:?}: {} candidate records",
                    county,
                    year,
                    descriptor.sheet_id,
                    classified.records.len()
                );
                candidate_records.extend(classified.records);
                diagnostics.extend(classified.diagnostics);
            }
            Err(err) => {
                warn!("process_unit: {} {}: {}", county, year, err);
                diagnostics.push(
                    Diagnostic::from_error(Stage::Classify, &err)
                        .unit(county, year)
                        .sheet(&descriptor.sheet_id),
                );
            }
        }
    }

    match merge::merge_unit(county, year, &candidate_records, matchers) {
        Ok(merged) => {
            diagnostics.extend(merged.diagnostics);
            info!(
                "process_unit: {} {}: {} precincts, {} diagnostics",
                county,
                year,
                merged.records.len(),
                diagnostics.len()
            );
            UnitOutcome {
                county: county.to_string(),
                year,
                records: merged.records,
                diagnostics,
                excluded: false,
            }
        }
        Err(err) => {
            warn!("process_unit: {} {}: unit excluded: {}", county, year, err);
            diagnostics.push(Diagnostic::from_error(Stage::Merge, &err).unit(county, year));
            UnitOutcome {
                county: county.to_string(),
                year,
                records: Vec::new(),
                diagnostics,
                excluded: true,
            }
        }
    }
}

/// Processes all the units in parallel. Outcomes come back in input order.
pub fn process_units(units: &[UnitInput], matchers: &Matchers) -> Vec<UnitOutcome> {
    units
        .par_iter()
        .map(|u| process_unit(u, matchers))
        .collect()
}

// **** Cycles ****

/// All the merged records of one tracked cycle.
#[derive(PartialEq, Debug, Clone)]
pub struct CycleSnapshot {
    pub year: Year,
    pub records: Vec<CanonicalPrecinctRecord>,
}

/// Groups unit outcomes into one snapshot per tracked cycle, in ascending year order.
///
/// Every tracked year gets a snapshot, possibly empty. Records of excluded units are
/// left out. The diagnostics of all the units are returned alongside.
pub fn assemble_cycles(years: &[Year], outcomes: Vec<UnitOutcome>) -> (Vec<CycleSnapshot>, Vec<Diagnostic>) {
    let mut by_year: BTreeMap<Year, Vec<CanonicalPrecinctRecord>> =
        years.iter().map(|y| (*y, Vec::new())).collect();
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    for outcome in outcomes.into_iter() {
        diagnostics.extend(outcome.diagnostics);
        if outcome.excluded {
            continue;
        }
        by_year.entry(outcome.year).or_default().extend(outcome.records);
    }
    let snapshots = by_year
        .into_iter()
        .map(|(year, mut records)| {
            records.sort_by(|a, b| {
                (a.county.as_str(), a.precinct_id.as_str())
                    .cmp(&(b.county.as_str(), b.precinct_id.as_str()))
            });
            diagnostics.extend(merge::check_district_spread(year, &records));
            CycleSnapshot { year, records }
        })
        .collect();
    (snapshots, diagnostics)
}

/// The read-only inputs shared by every cycle.
pub struct CycleContext<'a> {
    pub precincts: &'a BoundaryHistory,
    pub districts: &'a BoundaryHistory,
    pub projects: &'a [RenewableProject],
    pub demographics: &'a dyn DemographicSource,
}

/// One row of the canonical panel.
#[derive(PartialEq, Debug, Clone)]
pub struct PanelRow {
    pub record: CanonicalPrecinctRecord,
    /// One element per office slot.
    pub incumbency: Vec<Option<IncumbencyRecord>>,
    pub overlay: Option<SpatialOverlayResult>,
    pub demographics: Option<Demographics>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct CycleOutput {
    pub year: Year,
    pub rows: Vec<PanelRow>,
    pub district_results: Vec<ContestResult>,
    /// District shape key -> counts.
    pub district_overlay: BTreeMap<String, Option<SpatialOverlayResult>>,
    pub unmatched_project_count: u32,
    pub diagnostics: Vec<Diagnostic>,
}

/// Links one cycle to the previous tracked cycle and joins the overlay and demographics.
pub fn link_cycle(
    current: &CycleSnapshot,
    prior: Option<&CycleSnapshot>,
    context: &CycleContext,
    matchers: &Matchers,
) -> CycleOutput {
    let boundaries = LinkBoundaries {
        current_precincts: context.precincts.vintage_for(current.year),
        prior_districts: prior.and_then(|p| context.districts.vintage_for(p.year)),
    };
    let linked = link_incumbency(
        &current.records,
        prior.map(|p| PriorCycle {
            year: p.year,
            records: &p.records,
        }),
        boundaries,
        matchers,
    );
    let mut diagnostics = linked.diagnostics;

    let pair = CyclePair {
        previous: prior.map(|p| p.year),
        current: current.year,
    };
    let precinct_keys: Vec<String> = current
        .records
        .iter()
        .map(|r| precinct_shape_key(&r.county, &r.precinct_id))
        .collect();
    let mut precinct_overlay = overlay(context.projects, context.precincts, pair, &precinct_keys);
    diagnostics.append(&mut precinct_overlay.diagnostics);
    for d in diagnostics.iter_mut() {
        if d.year.is_none() {
            d.year = Some(current.year);
        }
    }

    let district_results = rollup::contest_results(&current.records);
    let district_keys: Vec<String> = district_results
        .iter()
        .filter_map(|c| c.district.as_ref().map(|d| district_shape_key(&c.office, d)))
        .collect();
    // Unmatched projects are already reported by the precinct overlay.
    let district_overlay = overlay(context.projects, context.districts, pair, &district_keys).results;

    let mut demographics: BTreeMap<&str, Option<Demographics>> = BTreeMap::new();
    for rec in current.records.iter() {
        if let Some(label) = rec.district_label.as_deref() {
            demographics
                .entry(label)
                .or_insert_with(|| context.demographics.lookup(label, current.year));
        }
    }
    let missing = demographics.values().filter(|d| d.is_none()).count();
    if missing > 0 {
        debug!(
            "link_cycle: {}: no demographics for {} of {} districts",
            current.year,
            missing,
            demographics.len()
        );
    }

    let rows: Vec<PanelRow> = current
        .records
        .iter()
        .zip(linked.incumbency.into_iter())
        .zip(precinct_keys.iter())
        .map(|((rec, incumbency), key)| PanelRow {
            record: rec.clone(),
            incumbency,
            overlay: precinct_overlay.results.get(key).cloned().flatten(),
            demographics: rec
                .district_label
                .as_deref()
                .and_then(|l| demographics.get(l).cloned().flatten()),
        })
        .collect();
    info!(
        "link_cycle: {} (previous: {:?}): {} rows, {} contests",
        current.year,
        pair.previous,
        rows.len(),
        district_results.len()
    );
    CycleOutput {
        year: current.year,
        rows,
        district_results,
        district_overlay,
        unmatched_project_count: precinct_overlay.unmatched_project_count,
        diagnostics,
    }
}

/// Links every cycle to its predecessor, in ascending year order.
pub fn link_all(snapshots: &[CycleSnapshot], context: &CycleContext, matchers: &Matchers) -> Vec<CycleOutput> {
    let mut ordered: Vec<&CycleSnapshot> = snapshots.iter().collect();
    ordered.sort_by_key(|s| s.year);
    ordered
        .iter()
        .enumerate()
        .map(|(idx, current)| {
            let prior = if idx == 0 { None } else { Some(ordered[idx - 1]) };
            link_cycle(current, prior, context, matchers)
        })
        .collect()
}
