// District rollup: contest-level results summed over the precinct records.

use std::collections::BTreeMap;

use crate::config::*;

fn district_order(d: &Option<String>) -> (Option<u32>, Option<String>) {
    (d.as_ref().and_then(|s| s.parse::<u32>().ok()), d.clone())
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Candidate totals and shares per `(year, office, district)`.
///
/// Contests come out in year order, then in tracked office order, then by district number.
pub fn contest_results(records: &[CanonicalPrecinctRecord]) -> Vec<ContestResult> {
    // (year, slot, district) -> (office, candidate key -> tally)
    type Contest = (String, BTreeMap<String, CandidateTally>);
    let mut contests: BTreeMap<(Year, usize, (Option<u32>, Option<String>)), Contest> =
        BTreeMap::new();
    for rec in records.iter() {
        // Split precincts also count toward their other districts.
        let all_slots = rec
            .slots
            .iter()
            .enumerate()
            .filter_map(|(idx, s)| s.as_ref().map(|s| (idx, s)))
            .chain(rec.split_slots.iter().map(|(idx, s)| (*idx, s)));
        for (idx, slot) in all_slots {
            let (_, tallies) = contests
                .entry((rec.year, idx, district_order(&slot.district)))
                .or_insert_with(|| (slot.office_name.clone(), BTreeMap::new()));
            for t in slot.tallies.iter() {
                let entry = tallies
                    .entry(t.name.trim().to_uppercase())
                    .or_insert_with(|| CandidateTally {
                        name: t.name.clone(),
                        party: t.party,
                        votes: 0,
                    });
                entry.votes += t.votes;
                if entry.party == Party::Other && t.party != Party::Other {
                    entry.party = t.party;
                }
            }
        }
    }

    contests
        .into_iter()
        .map(|((year, _, (_, district)), (office, tallies))| {
            let total_votes: u64 = tallies.values().map(|t| t.votes).sum();
            let mut candidates: Vec<CandidateShare> = tallies
                .into_values()
                .map(|t| CandidateShare {
                    share: if total_votes == 0 {
                        0.0
                    } else {
                        round1(100.0 * t.votes as f64 / total_votes as f64)
                    },
                    name: t.name,
                    party: t.party,
                    votes: t.votes,
                })
                .collect();
            candidates.sort_by(|a, b| b.votes.cmp(&a.votes).then_with(|| a.name.cmp(&b.name)));
            ContestResult {
                year,
                office,
                district,
                total_votes,
                candidates,
            }
        })
        .collect()
}

/// Finds the result of one contest.
pub fn find_contest<'a>(
    results: &'a [ContestResult],
    office: &str,
    district: Option<&str>,
) -> Option<&'a ContestResult> {
    results
        .iter()
        .find(|c| c.office == office && c.district.as_deref() == district)
}
