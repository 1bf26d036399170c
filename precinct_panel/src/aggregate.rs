// Collapses the candidates of a contest into the D / R / other slot fields.

use std::collections::BTreeMap;

use crate::config::*;

/// Candidate order of every contest `(office, district)`, by contest-wide votes.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct ContestRanking {
    order: BTreeMap<(String, Option<String>), Vec<String>>,
}

impl ContestRanking {
    /// Ranks the candidates of each contest: most votes first, ties by name.
    ///
    /// `entries` are `(office, district, candidate key, votes)` tuples, summed per candidate.
    pub fn from_votes<'a>(
        entries: impl Iterator<Item = (&'a str, Option<&'a str>, &'a str, u64)>,
    ) -> ContestRanking {
        let mut sums: BTreeMap<(String, Option<String>), BTreeMap<String, u64>> = BTreeMap::new();
        for (office, district, candidate, votes) in entries {
            *sums
                .entry((office.to_string(), district.map(|d| d.to_string())))
                .or_default()
                .entry(candidate.to_string())
                .or_insert(0) += votes;
        }
        let order = sums
            .into_iter()
            .map(|(contest, per_candidate)| {
                let mut ranked: Vec<(String, u64)> = per_candidate.into_iter().collect();
                ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                (contest, ranked.into_iter().map(|(c, _)| c).collect())
            })
            .collect();
        ContestRanking { order }
    }

    pub fn order_of(&self, office: &str, district: Option<&str>) -> &[String] {
        self.order
            .get(&(office.to_string(), district.map(|d| d.to_string())))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// Builds the slot of one precinct.
///
/// `tallies` pairs each candidate key with its votes in the precinct. The highest ranked
/// Democrat fills the D fields, the highest ranked Republican the R fields, and everyone
/// else (minor parties, write-ins, further major-party candidates) goes to `other_votes`.
pub fn collapse_slot(
    office: &str,
    district: Option<&str>,
    tallies: &[(String, CandidateTally)],
    ranking: &[String],
) -> OfficeSlot {
    let rank_of = |key: &str| ranking.iter().position(|k| k == key).unwrap_or(usize::MAX);
    let mut ordered: Vec<&(String, CandidateTally)> = tallies.iter().collect();
    ordered.sort_by(|a, b| {
        rank_of(&a.0)
            .cmp(&rank_of(&b.0))
            .then_with(|| b.1.votes.cmp(&a.1.votes))
            .then_with(|| a.0.cmp(&b.0))
    });

    let mut slot = OfficeSlot {
        office_name: office.to_string(),
        district: district.map(|d| d.to_string()),
        d_votes: 0,
        d_candidate: None,
        r_votes: 0,
        r_candidate: None,
        other_votes: 0,
        total_votes: 0,
        tallies: Vec::new(),
    };
    for (_, t) in ordered.iter() {
        match t.party {
            Party::Democratic if slot.d_candidate.is_none() => {
                slot.d_candidate = Some(t.name.clone());
                slot.d_votes = t.votes;
            }
            Party::Republican if slot.r_candidate.is_none() => {
                slot.r_candidate = Some(t.name.clone());
                slot.r_votes = t.votes;
            }
            _ => slot.other_votes += t.votes,
        }
        slot.total_votes += t.votes;
    }
    let mut all: Vec<CandidateTally> = tallies.iter().map(|(_, t)| t.clone()).collect();
    all.sort_by(|a, b| a.name.cmp(&b.name));
    slot.tallies = all;
    slot
}
