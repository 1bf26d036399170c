// Merges the candidate records of one (county, year) unit into canonical precinct records.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use crate::aggregate::{collapse_slot, ContestRanking};
use crate::config::*;
use crate::matching::Matchers;

#[derive(PartialEq, Debug, Clone, Default)]
pub struct MergeOutcome {
    /// Sorted by county, then precinct id.
    pub records: Vec<CanonicalPrecinctRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

// (county, precinct id, slot index, district, candidate key)
type VoteKey = (String, String, usize, Option<String>, String);

// precinct -> slot -> district -> [(candidate key, tally)]
type Grouped = BTreeMap<(String, String), BTreeMap<usize, BTreeMap<Option<String>, Vec<(String, CandidateTally)>>>>;

#[derive(Debug, Clone)]
struct Reported {
    name: String,
    party: Party,
    votes: u64,
    sheet_id: String,
}

/// Merges the records of one unit.
///
/// Records keep the county they were read with, so a statewide workbook yields the
/// precincts of every county. Fails with `OfficeSlotConflict` when two sheets report different totals for the
/// same precinct, office and candidate.
pub fn merge_unit(
    county: &str,
    year: Year,
    records: &[CandidateVoteRecord],
    matchers: &Matchers,
) -> Result<MergeOutcome, PipelineError> {
    let m = matchers;
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    let mut dropped: BTreeMap<String, usize> = BTreeMap::new();
    let mut reported: BTreeMap<VoteKey, Reported> = BTreeMap::new();
    let mut raw_names: BTreeMap<(String, String), BTreeSet<String>> = BTreeMap::new();

    for rec in records.iter() {
        let slot = match m.slot_index(&rec.office) {
            Some(s) => s,
            None => {
                *dropped.entry(rec.office.clone()).or_insert(0) += 1;
                continue;
            }
        };
        let id = m.normalize_precinct(&rec.precinct_id, &rec.county);
        if id.is_empty() {
            continue;
        }
        raw_names
            .entry((rec.county.clone(), id.clone()))
            .or_default()
            .insert(rec.precinct_id.clone());
        let key = (
            rec.county.clone(),
            id.clone(),
            slot,
            rec.district.clone(),
            m.candidate_key(&rec.candidate_name),
        );
        match reported.get_mut(&key) {
            None => {
                reported.insert(
                    key,
                    Reported {
                        name: rec.candidate_name.clone(),
                        party: rec.party,
                        votes: rec.votes,
                        sheet_id: rec.sheet_id.clone(),
                    },
                );
            }
            Some(prev) if prev.votes == rec.votes => {
                // The same total reported twice: keep one.
                if prev.party == Party::Other && rec.party != Party::Other {
                    prev.party = rec.party;
                }
            }
            Some(prev) => {
                warn!(
                    "merge_unit: {} {}: conflicting totals for {:?} in precinct {:?}",
                    county, year, rec.candidate_name, id
                );
                return Err(PipelineError::OfficeSlotConflict {
                    precinct: id,
                    office: rec.office.clone(),
                    candidate: rec.candidate_name.clone(),
                    first: (prev.sheet_id.clone(), prev.votes),
                    second: (rec.sheet_id.clone(), rec.votes),
                });
            }
        }
    }
    for (office, count) in dropped.iter() {
        debug!(
            "merge_unit: {} {}: dropped {} records of untracked office {:?}",
            county, year, count, office
        );
    }

    // Spelling variants that normalization could not reconcile stay distinct.
    let mut skeletons: BTreeMap<(&String, String), Vec<&String>> = BTreeMap::new();
    for (rec_county, id) in raw_names.keys() {
        skeletons
            .entry((rec_county, m.precinct_skeleton(id)))
            .or_default()
            .push(id);
    }
    for ids in skeletons.values().filter(|ids| ids.len() > 1) {
        for other in ids.iter().skip(1) {
            let err = PipelineError::PrecinctIdentityConflict {
                first: ids[0].clone(),
                second: (*other).clone(),
            };
            warn!("merge_unit: {} {}: {}", county, year, err);
            diagnostics.push(Diagnostic::from_error(Stage::Merge, &err).unit(county, year));
        }
    }

    let ranking = ContestRanking::from_votes(reported.iter().map(|((_, _, slot, district, cand), r)| {
        (
            m.rules.tracked_offices[*slot].as_str(),
            district.as_deref(),
            cand.as_str(),
            r.votes,
        )
    }));

    let mut grouped: Grouped = BTreeMap::new();
    for ((rec_county, id, slot, district, cand), r) in reported.into_iter() {
        grouped
            .entry((rec_county, id))
            .or_default()
            .entry(slot)
            .or_default()
            .entry(district)
            .or_default()
            .push((
                cand,
                CandidateTally {
                    name: r.name,
                    party: r.party,
                    votes: r.votes,
                },
            ));
    }

    let office_count = m.rules.tracked_offices.len();
    let district_slot = m
        .rules
        .district_office
        .as_ref()
        .and_then(|o| m.slot_index(o));
    let mut out: Vec<CanonicalPrecinctRecord> = Vec::new();
    for ((rec_county, id), per_slot) in grouped.into_iter() {
        let mut slots: Vec<Option<OfficeSlot>> = vec![None; office_count];
        let mut split_slots: Vec<(usize, OfficeSlot)> = Vec::new();
        for (slot, per_district) in per_slot.into_iter() {
            let office = &m.rules.tracked_offices[slot];
            // A precinct split between districts keeps the district with most votes in its slot.
            let mut contests: Vec<(Option<String>, Vec<(String, CandidateTally)>)> =
                per_district.into_iter().collect();
            contests.sort_by(|a, b| {
                let va: u64 = a.1.iter().map(|(_, t)| t.votes).sum();
                let vb: u64 = b.1.iter().map(|(_, t)| t.votes).sum();
                vb.cmp(&va).then_with(|| a.0.cmp(&b.0))
            });
            let mut contests = contests.into_iter();
            if let Some((district, tallies)) = contests.next() {
                let order = ranking.order_of(office, district.as_deref());
                slots[slot] = Some(collapse_slot(office, district.as_deref(), &tallies, order));
            }
            for (district, tallies) in contests {
                let order = ranking.order_of(office, district.as_deref());
                let other = collapse_slot(office, district.as_deref(), &tallies, order);
                let kept = slots[slot]
                    .as_ref()
                    .and_then(|s| s.district.clone())
                    .unwrap_or_default();
                let dropped_district = other.district.clone().unwrap_or_default();
                let message = format!(
                    "precinct {:?} reports {} in districts {} and {}; district {} ({} votes) is left out of the canonical row",
                    id, office, kept, dropped_district, dropped_district, other.total_votes
                );
                warn!("merge_unit: {} {}: {}", rec_county, year, message);
                diagnostics.push(
                    Diagnostic::new(Stage::Merge, DiagnosticKind::SplitDistrictPrecinct, message)
                        .unit(&rec_county, year),
                );
                split_slots.push((slot, other));
            }
        }
        let district_label = district_slot
            .and_then(|s| slots[s].as_ref())
            .and_then(|s| s.district.clone());
        out.push(CanonicalPrecinctRecord {
            precinct_id: id,
            county: rec_county,
            year,
            district_label,
            slots,
            split_slots,
        });
    }
    debug!(
        "merge_unit: {} {}: {} precinct records",
        county,
        year,
        out.len()
    );
    Ok(MergeOutcome {
        records: out,
        diagnostics,
    })
}

/// Flags district contests whose candidates have votes in every precinct of a cycle.
///
/// A district covers part of the state only, so a candidate present everywhere
/// usually means a district column was attributed to every precinct. Cycles from a
/// single county are not checked: a county often lies in one district.
pub fn check_district_spread(year: Year, records: &[CanonicalPrecinctRecord]) -> Vec<Diagnostic> {
    let counties: BTreeSet<&str> = records.iter().map(|r| r.county.as_str()).collect();
    if counties.len() < 2 {
        return Vec::new();
    }
    // (office, district, candidate) -> precincts with votes
    let mut spread: BTreeMap<(&str, &str, String), usize> = BTreeMap::new();
    for rec in records.iter() {
        let mut seen: BTreeSet<(&str, &str, String)> = BTreeSet::new();
        let all_slots = rec
            .slots
            .iter()
            .flatten()
            .chain(rec.split_slots.iter().map(|(_, s)| s));
        for slot in all_slots {
            let district = match slot.district.as_deref() {
                Some(d) => d,
                None => continue,
            };
            for t in slot.tallies.iter().filter(|t| t.votes > 0) {
                seen.insert((slot.office_name.as_str(), district, t.name.trim().to_uppercase()));
            }
        }
        for key in seen.into_iter() {
            *spread.entry(key).or_insert(0) += 1;
        }
    }
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    for ((office, district, candidate), count) in spread.into_iter() {
        if count == records.len() {
            let message = format!(
                "{} district {}: {} has votes in all {} precincts of {} counties",
                office,
                district,
                candidate,
                count,
                counties.len()
            );
            warn!("check_district_spread: {}: {}", year, message);
            let mut d = Diagnostic::new(Stage::Merge, DiagnosticKind::SuspiciousDistrictSpread, message);
            d.year = Some(year);
            diagnostics.push(d);
        }
    }
    diagnostics
}
