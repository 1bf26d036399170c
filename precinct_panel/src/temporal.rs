// Temporal linking: incumbency and vote deltas against the previous tracked cycle.

use std::collections::HashMap;

use log::{debug, info};
use rayon::prelude::*;

use crate::config::*;
use crate::geometry::{district_shape_key, precinct_shape_key, split_district_key, BoundarySet};
use crate::matching::Matchers;
use crate::rollup::{contest_results, find_contest};

/// The merged records of the previous tracked cycle. Read only.
#[derive(Debug, Clone, Copy)]
pub struct PriorCycle<'a> {
    pub year: Year,
    pub records: &'a [CanonicalPrecinctRecord],
}

/// Boundary data used when a precinct has no direct match in the previous cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkBoundaries<'a> {
    /// Precinct shapes in force for the current cycle.
    pub current_precincts: Option<&'a BoundarySet>,
    /// District shapes in force for the previous cycle.
    pub prior_districts: Option<&'a BoundarySet>,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct LinkOutcome {
    /// One entry per current record, one element per office slot. `None` where the
    /// office is not contested in the precinct.
    pub incumbency: Vec<Vec<Option<IncumbencyRecord>>>,
    pub diagnostics: Vec<Diagnostic>,
}

struct Linker<'a> {
    prior_year: Year,
    prior_index: HashMap<(String, String), &'a CanonicalPrecinctRecord>,
    prior_contests: Vec<ContestResult>,
    boundaries: LinkBoundaries<'a>,
    matchers: &'a Matchers,
}

fn delta_i64(current: u64, prior: u64) -> i64 {
    current as i64 - prior as i64
}

impl<'a> Linker<'a> {
    fn is_incumbent_running(&self, slot: &OfficeSlot, winner: &CandidateShare) -> bool {
        let winner_key = self.matchers.person_key(&winner.name);
        !winner_key.is_empty()
            && slot
                .tallies
                .iter()
                .any(|t| self.matchers.person_key(&t.name) == winner_key)
    }

    fn matched(&self, slot: &OfficeSlot, prior_slot: &OfficeSlot) -> IncumbencyRecord {
        let winner = find_contest(
            &self.prior_contests,
            &prior_slot.office_name,
            prior_slot.district.as_deref(),
        )
        .and_then(|c| c.winner());
        let winner = match winner {
            Some(w) => w,
            None => {
                return IncumbencyRecord {
                    status: LinkStatus::Matched,
                    ..IncumbencyRecord::NO_PRIOR_DATA
                }
            }
        };
        let party = winner.party;
        let prior_votes = prior_slot.votes_for(party);
        let prior_share = prior_slot.share_for(party);
        let current_share = slot.share_for(party);
        IncumbencyRecord {
            incumbent_party: Some(party),
            is_candidate_incumbent: Some(self.is_incumbent_running(slot, winner)),
            prior_votes: Some(prior_votes),
            prior_share,
            vote_delta: Some(delta_i64(slot.votes_for(party), prior_votes)),
            share_delta: match (current_share, prior_share) {
                (Some(c), Some(p)) => Some(c - p),
                _ => None,
            },
            status: LinkStatus::Matched,
        }
    }

    /// The prior contest governing the location of a precinct whose identity changed.
    fn governing_contest(&self, rec: &CanonicalPrecinctRecord, slot: &OfficeSlot) -> Option<&ContestResult> {
        let shape = self
            .boundaries
            .current_precincts?
            .shapes
            .get(&precinct_shape_key(&rec.county, &rec.precinct_id))?;
        let point = shape.representative_point()?;
        if slot.district.is_none() {
            // Statewide office: one contest covers every precinct.
            return find_contest(&self.prior_contests, &slot.office_name, None);
        }
        let prefix = district_shape_key(&slot.office_name, "");
        let districts = self.boundaries.prior_districts?;
        let district = districts
            .shapes
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .find(|(_, g)| g.contains_point(point))
            .and_then(|(k, _)| split_district_key(k))
            .map(|(_, d)| d)?;
        find_contest(&self.prior_contests, &slot.office_name, Some(district))
    }

    fn link_record(
        &self,
        rec: &CanonicalPrecinctRecord,
    ) -> (Vec<Option<IncumbencyRecord>>, Vec<Diagnostic>) {
        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let prior = self
            .prior_index
            .get(&(rec.county.clone(), rec.precinct_id.clone()));
        let links = rec
            .slots
            .iter()
            .enumerate()
            .map(|(idx, slot)| {
                let slot = slot.as_ref()?;
                if let Some(prior_rec) = prior {
                    // A direct match, but the office was not contested there last cycle.
                    return Some(match prior_rec.slots.get(idx).and_then(|s| s.as_ref()) {
                        Some(prior_slot) => self.matched(slot, prior_slot),
                        None => IncumbencyRecord::NO_PRIOR_DATA,
                    });
                }
                let contest = self.governing_contest(rec, slot);
                let winner = match contest.and_then(|c| c.winner()) {
                    Some(w) => w,
                    None => return Some(IncumbencyRecord::NO_PRIOR_DATA),
                };
                let geography = match contest.and_then(|c| c.district.as_ref()) {
                    Some(d) => format!("{} district {}", slot.office_name, d),
                    None => format!("{} statewide", slot.office_name),
                };
                let err = PipelineError::BoundaryMismatch {
                    geography: format!("precinct {:?}", rec.precinct_id),
                    reason: format!(
                        "no {} record; incumbency of {} taken from {}",
                        self.prior_year, slot.office_name, geography
                    ),
                };
                diagnostics.push(
                    Diagnostic::from_error(Stage::Temporal, &err).unit(&rec.county, rec.year),
                );
                Some(IncumbencyRecord {
                    incumbent_party: Some(winner.party),
                    is_candidate_incumbent: Some(self.is_incumbent_running(slot, winner)),
                    status: LinkStatus::BoundaryChanged,
                    ..IncumbencyRecord::NO_PRIOR_DATA
                })
            })
            .collect();
        (links, diagnostics)
    }
}

/// Links every record of a cycle to the previous tracked cycle.
///
/// Without a previous cycle every populated slot is `NoPriorData`.
pub fn link_incumbency(
    current: &[CanonicalPrecinctRecord],
    prior: Option<PriorCycle>,
    boundaries: LinkBoundaries,
    matchers: &Matchers,
) -> LinkOutcome {
    let prior = match prior {
        Some(p) => p,
        None => {
            debug!("link_incumbency: no previous cycle");
            return LinkOutcome {
                incumbency: current
                    .iter()
                    .map(|r| {
                        r.slots
                            .iter()
                            .map(|s| s.as_ref().map(|_| IncumbencyRecord::NO_PRIOR_DATA))
                            .collect()
                    })
                    .collect(),
                diagnostics: Vec::new(),
            };
        }
    };
    let linker = Linker {
        prior_year: prior.year,
        prior_index: prior
            .records
            .iter()
            .map(|r| ((r.county.clone(), r.precinct_id.clone()), r))
            .collect(),
        prior_contests: contest_results(prior.records),
        boundaries,
        matchers,
    };
    let linked: Vec<(Vec<Option<IncumbencyRecord>>, Vec<Diagnostic>)> =
        current.par_iter().map(|r| linker.link_record(r)).collect();
    let mut outcome = LinkOutcome::default();
    for (links, diags) in linked.into_iter() {
        outcome.incumbency.push(links);
        outcome.diagnostics.extend(diags);
    }
    info!(
        "link_incumbency: {} records linked against {}, {} boundary fallbacks",
        current.len(),
        prior.year,
        outcome.diagnostics.len()
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{BoundaryKind, Coord, Geometry, Polygon};
    use std::collections::BTreeMap;

    fn matchers() -> Matchers {
        Matchers::new(&PipelineRules::default()).unwrap()
    }

    fn slot(office: &str, district: Option<&str>, tallies: &[(&str, Party, u64)]) -> OfficeSlot {
        let ranking: Vec<String> = Vec::new();
        let tallies: Vec<(String, CandidateTally)> = tallies
            .iter()
            .map(|(n, p, v)| {
                (
                    n.to_uppercase(),
                    CandidateTally {
                        name: n.to_string(),
                        party: *p,
                        votes: *v,
                    },
                )
            })
            .collect();
        crate::aggregate::collapse_slot(office, district, &tallies, &ranking)
    }

    fn record(id: &str, year: Year, governor: Option<OfficeSlot>, senate: Option<OfficeSlot>) -> CanonicalPrecinctRecord {
        CanonicalPrecinctRecord {
            precinct_id: id.to_string(),
            county: "Polk".to_string(),
            year,
            district_label: senate.as_ref().and_then(|s| s.district.clone()),
            slots: vec![None, None, None, governor, senate, None],
            split_slots: Vec::new(),
        }
    }

    fn square(x0: f64, y0: f64, side: f64) -> Geometry {
        Geometry::Polygon(Polygon::new(vec![
            Coord::new(x0, y0),
            Coord::new(x0 + side, y0),
            Coord::new(x0 + side, y0 + side),
            Coord::new(x0, y0 + side),
        ]))
    }

    #[test]
    fn matched_precincts_get_deltas() {
        let m = matchers();
        let prior = vec![record(
            "1",
            2014,
            Some(slot("Governor", None, &[("Terry Branstad", Party::Republican, 600), ("Jack Hatch", Party::Democratic, 400)])),
            None,
        )];
        let current = vec![record(
            "1",
            2018,
            Some(slot("Governor", None, &[("Kim Reynolds / Adam Gregg", Party::Republican, 450), ("Fred Hubbell", Party::Democratic, 550)])),
            None,
        )];
        let out = link_incumbency(
            &current,
            Some(PriorCycle { year: 2014, records: &prior }),
            LinkBoundaries::default(),
            &m,
        );
        let link = out.incumbency[0][3].clone().unwrap();
        assert_eq!(link.status, LinkStatus::Matched);
        assert_eq!(link.incumbent_party, Some(Party::Republican));
        assert_eq!(link.is_candidate_incumbent, Some(false));
        assert_eq!(link.prior_votes, Some(600));
        assert_eq!(link.vote_delta, Some(450 - 600));
        assert_eq!(link.prior_share, Some(0.6));
        let share_delta = link.share_delta.unwrap();
        assert!((share_delta - (0.45 - 0.6)).abs() < 1e-12);
        assert!(out.incumbency[0][0].is_none());
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn incumbent_names_are_normalized() {
        let m = matchers();
        let prior = vec![record(
            "1",
            2016,
            None,
            Some(slot("State Senate", Some("12"), &[("Sen. Ann Q. Roe", Party::Democratic, 60), ("Bob Poe", Party::Republican, 40)])),
        )];
        let current = vec![record(
            "1",
            2018,
            None,
            Some(slot("State Senate", Some("12"), &[("Ann Roe", Party::Democratic, 70), ("Cy Doe", Party::Republican, 30)])),
        )];
        let out = link_incumbency(
            &current,
            Some(PriorCycle { year: 2016, records: &prior }),
            LinkBoundaries::default(),
            &m,
        );
        let link = out.incumbency[0][4].clone().unwrap();
        assert_eq!(link.is_candidate_incumbent, Some(true));
        assert_eq!(link.incumbent_party, Some(Party::Democratic));
        assert_eq!(link.vote_delta, Some(10));
    }

    #[test]
    fn new_precinct_without_geometry_has_no_prior_data() {
        let m = matchers();
        let prior = vec![record(
            "1",
            2016,
            Some(slot("Governor", None, &[("A", Party::Democratic, 5)])),
            None,
        )];
        let current = vec![record(
            "99",
            2018,
            Some(slot("Governor", None, &[("B", Party::Democratic, 5)])),
            None,
        )];
        let out = link_incumbency(
            &current,
            Some(PriorCycle { year: 2016, records: &prior }),
            LinkBoundaries::default(),
            &m,
        );
        let link = out.incumbency[0][3].clone().unwrap();
        assert_eq!(link, IncumbencyRecord::NO_PRIOR_DATA);
        assert_eq!(link.vote_delta, None);
        assert_eq!(link.share_delta, None);
    }

    #[test]
    fn first_cycle_has_no_prior_data() {
        let m = matchers();
        let current = vec![record(
            "1",
            2016,
            Some(slot("Governor", None, &[("A", Party::Democratic, 5)])),
            None,
        )];
        let out = link_incumbency(&current, None, LinkBoundaries::default(), &m);
        assert_eq!(out.incumbency[0][3], Some(IncumbencyRecord::NO_PRIOR_DATA));
        assert_eq!(out.incumbency[0][4], None);
    }

    #[test]
    fn boundary_fallback_uses_the_governing_district() {
        let m = matchers();
        let prior = vec![
            record(
                "OLD 1",
                2016,
                None,
                Some(slot("State Senate", Some("7"), &[("Ann Roe", Party::Democratic, 60), ("Bob Poe", Party::Republican, 40)])),
            ),
            record(
                "OLD 2",
                2016,
                None,
                Some(slot("State Senate", Some("8"), &[("Dee Fox", Party::Democratic, 10), ("Ed Lamb", Party::Republican, 90)])),
            ),
        ];
        let current = vec![record(
            "NEW 1",
            2018,
            None,
            Some(slot("State Senate", Some("8"), &[("Ed Lamb", Party::Republican, 55), ("Flo Hart", Party::Democratic, 45)])),
        )];
        let mut precinct_shapes = BTreeMap::new();
        precinct_shapes.insert(precinct_shape_key("Polk", "NEW 1"), square(12.0, 2.0, 1.0));
        let precincts = BoundarySet {
            kind: BoundaryKind::Precinct,
            year: 2018,
            shapes: precinct_shapes,
        };
        let mut district_shapes = BTreeMap::new();
        district_shapes.insert(district_shape_key("State Senate", "7"), square(0.0, 0.0, 10.0));
        district_shapes.insert(district_shape_key("State Senate", "8"), square(10.0, 0.0, 10.0));
        let districts = BoundarySet {
            kind: BoundaryKind::District,
            year: 2012,
            shapes: district_shapes,
        };
        let out = link_incumbency(
            &current,
            Some(PriorCycle { year: 2016, records: &prior }),
            LinkBoundaries {
                current_precincts: Some(&precincts),
                prior_districts: Some(&districts),
            },
            &m,
        );
        let link = out.incumbency[0][4].clone().unwrap();
        assert_eq!(link.status, LinkStatus::BoundaryChanged);
        assert_eq!(link.incumbent_party, Some(Party::Republican));
        assert_eq!(link.is_candidate_incumbent, Some(true));
        assert_eq!(link.prior_votes, None);
        assert_eq!(link.vote_delta, None);
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].error_kind, DiagnosticKind::BoundaryMismatch);
    }
}
