// Column classification: turns one contest sheet into per-candidate vote records.

use std::collections::{BTreeMap, BTreeSet};

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;

use crate::config::*;
use crate::matching::Matchers;

lazy_static! {
    static ref PAREN_PARTY: Regex = Regex::new(r"^(.*?)\s*\(([^()]*)\)\s*(.*)$").unwrap();
    static ref TRAILING_CODE: Regex = Regex::new(r"^(.*\S)[\s,]+([A-Za-z])$").unwrap();
}

/// The name of the pseudo-candidate collecting write-in votes.
pub const WRITE_IN: &str = "Write-in";

/// A header decomposed into its candidate and vote-type parts.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct HeaderParts {
    pub candidate: Option<String>,
    pub party: Party,
    /// True when the party came from the header itself (parentheses or trailing code).
    pub explicit_party: bool,
    pub tag: VoteColumnTag,
}

impl HeaderParts {
    const UNKNOWN: HeaderParts = HeaderParts {
        candidate: None,
        party: Party::Other,
        explicit_party: false,
        tag: VoteColumnTag::Unknown,
    };
}

/// Decomposes `Name (P) - Vote Type`, `Name (P)`, `Name - Vote Type`, `Name P`
/// and bare keyword headers.
pub fn parse_header(text: &str, matchers: &Matchers) -> HeaderParts {
    let t = text.trim();
    if t.is_empty()
        || matchers.is_ignored_label(t)
        || matchers.is_precinct_label(t)
        || matchers.is_candidate_label(t)
        || matchers.is_party_label(t)
        || matchers.is_race_label(t)
    {
        return HeaderParts::UNKNOWN;
    }

    // A party in parentheses ends the candidate name.
    if let Some(caps) = PAREN_PARTY.captures(t) {
        let name = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        let code = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let rest = caps
            .get(3)
            .map(|m| {
                m.as_str()
                    .trim_start_matches(|c: char| c.is_whitespace() || "-–—:|".contains(c))
            })
            .unwrap_or("");
        if !name.is_empty() {
            let tag = if rest.is_empty() {
                VoteColumnTag::CandidateName
            } else {
                matchers.vote_tag(rest).unwrap_or(VoteColumnTag::CandidateName)
            };
            if matchers.is_write_in(name) {
                return write_in(tag);
            }
            return HeaderParts {
                candidate: Some(name.to_string()),
                party: matchers.party_for(code),
                explicit_party: true,
                tag,
            };
        }
    }

    let (head, suffix_tag) = matchers.split_vote_suffix(t);
    let tag = suffix_tag.unwrap_or(VoteColumnTag::CandidateName);

    if matchers.is_write_in(&head) {
        return write_in(tag);
    }
    if let Some(caps) = TRAILING_CODE.captures(&head) {
        let name = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        let code = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        if !name.is_empty() && matchers.vote_tag(name).is_none() {
            return HeaderParts {
                candidate: Some(name.to_string()),
                party: matchers.party_for(code),
                explicit_party: true,
                tag,
            };
        }
    }
    // A bare keyword: a vote-type column with no candidate.
    if let Some(keyword) = matchers.vote_tag(&head) {
        return HeaderParts {
            tag: keyword,
            ..HeaderParts::UNKNOWN
        };
    }
    HeaderParts {
        candidate: Some(head),
        party: Party::Other,
        explicit_party: false,
        tag,
    }
}

fn write_in(tag: VoteColumnTag) -> HeaderParts {
    HeaderParts {
        candidate: Some(WRITE_IN.to_string()),
        party: Party::Other,
        explicit_party: true,
        // The keyword itself is not a vote type of the pseudo-candidate.
        tag: if tag == VoteColumnTag::WriteIn {
            VoteColumnTag::CandidateName
        } else {
            tag
        },
    }
}

/// Reads a vote count. Empty cells are zero; negative or unreadable values are errors.
pub fn parse_votes(value: &CellValue) -> Result<u64, String> {
    let number = match value {
        CellValue::Empty => return Ok(0),
        CellValue::Number(f) => *f,
        CellValue::Text(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| *c != ',' && !c.is_whitespace())
                .collect();
            if cleaned.is_empty() || cleaned == "-" {
                return Ok(0);
            }
            cleaned
                .parse::<f64>()
                .map_err(|_| format!("{:?} is not a vote count", s))?
        }
    };
    if !number.is_finite() || number < 0.0 {
        return Err(format!("{} is not a vote count", number));
    }
    Ok(number.round() as u64)
}

/// The output of the classifier for one sheet.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct ClassifiedSheet {
    pub records: Vec<CandidateVoteRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

// One cell read from the sheet, before the vote-type columns are collapsed.
#[derive(Debug, Clone)]
struct Entry {
    county: String,
    precinct: String,
    office: String,
    district: Option<String>,
    candidate: String,
    party: Party,
    explicit_party: bool,
    tag: VoteColumnTag,
    votes: u64,
}

#[derive(Debug, Clone, Default)]
struct Collapsed {
    name: String,
    party: Option<(Party, bool)>,
    total: Option<u64>,
    partial_sum: u64,
    partial_count: usize,
}

struct SheetContext<'a> {
    county: &'a str,
    year: Year,
    sheet: &'a Sheet,
    descriptor: &'a SheetDescriptor,
    matchers: &'a Matchers,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> SheetContext<'a> {
    fn note(&mut self, stage: Stage, kind: DiagnosticKind, message: String) {
        self.diagnostics.push(
            Diagnostic::new(stage, kind, message)
                .unit(self.county, self.year)
                .sheet(&self.descriptor.sheet_id),
        );
    }

    fn votes_at(&mut self, row: usize, column: usize) -> u64 {
        match parse_votes(self.sheet.value(row, column)) {
            Ok(v) => v,
            Err(msg) => {
                self.note(
                    Stage::Classify,
                    DiagnosticKind::InvalidVoteCount,
                    format!("row {}, column {}: {}; counted as 0", row + 1, column + 1, msg),
                );
                0
            }
        }
    }

    /// Office and district of a row, from the race column or the sheet itself.
    fn contest_of_row(&self, row: usize) -> Option<(String, Option<String>)> {
        match self.descriptor.race_column {
            Some(c) => {
                let label = self.sheet.label(row, c);
                let office = self.matchers.office_for(&label)?;
                Some((office, self.matchers.district_in(&label)))
            }
            None => self
                .descriptor
                .office
                .clone()
                .map(|o| (o, self.descriptor.district.clone())),
        }
    }

    fn ambiguous(&self, reason: &str) -> PipelineError {
        PipelineError::AmbiguousLayout {
            sheet: self.descriptor.sheet_id.clone(),
            reason: reason.to_string(),
        }
    }

    fn is_county_total(&self, label: &str) -> bool {
        let m = self.matchers;
        m.is_total_label(label) || label.trim().eq_ignore_ascii_case(self.county.trim())
    }
}

/// Classifies one sheet following the orientation decided by the layout resolver.
pub fn classify_sheet(
    county: &str,
    year: Year,
    sheet: &Sheet,
    descriptor: &SheetDescriptor,
    matchers: &Matchers,
) -> Result<ClassifiedSheet, PipelineError> {
    let mut ctx = SheetContext {
        county,
        year,
        sheet,
        descriptor,
        matchers,
        diagnostics: Vec::new(),
    };
    if descriptor.office.is_none() && descriptor.race_column.is_none() {
        return Err(ctx.ambiguous("no office could be associated with the sheet"));
    }
    let entries = match descriptor.orientation {
        Orientation::CandidatesAsColumns => columns_entries(&mut ctx)?,
        Orientation::CandidatesAsRows => rows_entries(&mut ctx)?,
        Orientation::Unknown => {
            return Err(
                ctx.ambiguous("no header matches a vote-type or candidate pattern")
            )
        }
    };
    debug!(
        "classify_sheet: sheet {:?}: {} entries",
        descriptor.sheet_id,
        entries.len()
    );
    let records = collapse(&mut ctx, entries);
    Ok(ClassifiedSheet {
        records,
        diagnostics: ctx.diagnostics,
    })
}

fn find_label(sheet: &Sheet, row: usize, pred: impl Fn(&str) -> bool) -> Option<usize> {
    (0..sheet.width()).find(|c| pred(&sheet.label(row, *c)))
}

// ***** Candidates as columns *****

struct ColumnSpec {
    column: usize,
    candidate: String,
    party: Party,
    explicit_party: bool,
    tag: VoteColumnTag,
}

fn columns_entries(ctx: &mut SheetContext) -> Result<Vec<Entry>, PipelineError> {
    let sheet = ctx.sheet;
    let m = ctx.matchers;
    let h = ctx.descriptor.header_row;
    let precinct_col = find_label(sheet, h, |l| m.is_precinct_label(l)).unwrap_or(0);
    let race_col = ctx.descriptor.race_column;

    let mut specs: Vec<ColumnSpec> = Vec::new();
    let mut spanning: Option<String> = None;
    for c in 0..sheet.width() {
        if c == precinct_col || Some(c) == race_col {
            continue;
        }
        let header = sheet.label(h, c);
        if let Some(cr) = ctx.descriptor.candidate_row {
            // Candidate names span the vote-type columns below them.
            let above = sheet.label(cr, c);
            if !above.is_empty() {
                spanning = Some(above);
            }
            let name_parts = match spanning.as_ref() {
                Some(n) => parse_header(n, m),
                None => continue,
            };
            let candidate = match name_parts.candidate {
                Some(n) => n,
                None => continue,
            };
            if header.is_empty() || m.is_ignored_label(&header) {
                continue;
            }
            let tag = m.vote_tag(&header).unwrap_or(VoteColumnTag::Unknown);
            if tag == VoteColumnTag::Unknown {
                debug!("columns_entries: unrecognized vote type {:?}", header);
                continue;
            }
            specs.push(ColumnSpec {
                column: c,
                candidate,
                party: name_parts.party,
                explicit_party: name_parts.explicit_party,
                tag,
            });
        } else {
            let parts = parse_header(&header, m);
            match parts.candidate {
                Some(candidate) if parts.tag != VoteColumnTag::Unknown => specs.push(ColumnSpec {
                    column: c,
                    candidate,
                    party: parts.party,
                    explicit_party: parts.explicit_party,
                    tag: parts.tag,
                }),
                _ => {
                    if !header.is_empty() {
                        debug!("columns_entries: skipping column {:?}", header);
                    }
                }
            }
        }
    }
    if specs.is_empty() {
        return Err(ctx.ambiguous("no column names a candidate"));
    }

    let mut entries: Vec<Entry> = Vec::new();
    for r in (h + 1)..sheet.height() {
        let precinct = sheet.label(r, precinct_col);
        if precinct.is_empty() || m.is_precinct_label(&precinct) || m.is_ignored_label(&precinct) {
            continue;
        }
        if m.is_total_label(&precinct) {
            break;
        }
        if ctx.is_county_total(&precinct) {
            continue;
        }
        let (office, district) = match ctx.contest_of_row(r) {
            Some(c) => c,
            None => continue,
        };
        for spec in specs.iter() {
            let votes = ctx.votes_at(r, spec.column);
            entries.push(Entry {
                county: ctx.county.to_string(),
                precinct: precinct.clone(),
                office: office.clone(),
                district: district.clone(),
                candidate: spec.candidate.clone(),
                party: spec.party,
                explicit_party: spec.explicit_party,
                tag: spec.tag,
                votes,
            });
        }
    }
    Ok(entries)
}

// ***** Candidates as rows *****

// (column, county, precinct, vote type)
type PrecinctColumn = (usize, String, String, VoteColumnTag);

fn county_prefix(head: &str) -> Option<(&str, &str)> {
    let (prefix, rest) = head.split_once('-')?;
    let (prefix, rest) = (prefix.trim(), rest.trim());
    let is_name = !prefix.is_empty()
        && prefix.chars().any(|c| c.is_alphabetic())
        && prefix
            .chars()
            .all(|c| c.is_alphabetic() || c == ' ' || c == '.' || c == '\'');
    if is_name && !rest.is_empty() {
        Some((prefix, rest))
    } else {
        None
    }
}

/// Assigns a county to each precinct column.
///
/// A sheet covering several counties labels its precinct columns `County-Precinct`
/// and its county totals with the bare county name. Those totals are dropped and
/// each precinct is attributed to the county of its prefix. Any other sheet belongs
/// to the unit's county.
fn assign_counties(unit_county: &str, cols: Vec<(usize, String, VoteColumnTag)>) -> Vec<PrecinctColumn> {
    let prefixes: BTreeSet<String> = cols
        .iter()
        .filter_map(|(_, head, _)| county_prefix(head))
        .map(|(p, _)| p.to_uppercase())
        .collect();
    let is_county_total = |head: &str| county_prefix(head).is_none() && prefixes.contains(&head.trim().to_uppercase());
    let every_column_prefixed = cols
        .iter()
        .all(|(_, head, _)| county_prefix(head).is_some() || is_county_total(head));
    let foreign = !prefixes.contains(&unit_county.trim().to_uppercase());
    let has_totals = cols.iter().any(|(_, head, _)| is_county_total(head));
    let multi_county = every_column_prefixed && foreign && (prefixes.len() > 1 || has_totals);
    if !multi_county {
        return cols
            .into_iter()
            .map(|(c, head, tag)| (c, unit_county.to_string(), head, tag))
            .collect();
    }
    debug!(
        "assign_counties: sheet of {:?} covers {} counties",
        unit_county,
        prefixes.len()
    );
    let mut res: Vec<PrecinctColumn> = Vec::new();
    for (c, head, tag) in cols.into_iter() {
        match county_prefix(&head) {
            Some((county, _)) => res.push((c, county.to_string(), head.clone(), tag)),
            None => debug!("assign_counties: skipping county total column {:?}", head),
        }
    }
    res
}

fn rows_entries(ctx: &mut SheetContext) -> Result<Vec<Entry>, PipelineError> {
    let sheet = ctx.sheet;
    let m = ctx.matchers;
    let h = ctx.descriptor.header_row;
    let candidate_col = find_label(sheet, h, |l| m.is_candidate_label(l)).unwrap_or(0);
    let party_col = find_label(sheet, h, |l| m.is_party_label(l));
    let race_col = ctx.descriptor.race_column;

    // Precinct identity and vote type come from the column headers.
    let mut headers: Vec<(usize, String, VoteColumnTag)> = Vec::new();
    for c in 0..sheet.width() {
        if c == candidate_col || Some(c) == party_col || Some(c) == race_col {
            continue;
        }
        let label = sheet.label(h, c);
        if label.is_empty()
            || m.is_ignored_label(&label)
            || m.is_precinct_label(&label)
            || m.is_candidate_label(&label)
            || m.is_party_label(&label)
            || m.is_race_label(&label)
        {
            continue;
        }
        let (head, tag) = m.split_vote_suffix(&label);
        if ctx.is_county_total(&head) || ctx.is_county_total(&label) {
            debug!("rows_entries: skipping county total column {:?}", label);
            continue;
        }
        let tag = match tag {
            Some(t) => t,
            // A vote-type column without any precinct.
            None if m.vote_tag(&label).is_some() => continue,
            None => VoteColumnTag::CandidateName,
        };
        headers.push((c, head, tag));
    }
    let precinct_cols = assign_counties(ctx.county, headers);
    if precinct_cols.is_empty() {
        return Err(ctx.ambiguous("no column names a precinct"));
    }

    let mut entries: Vec<Entry> = Vec::new();
    let mut candidate_rows = 0;
    for r in (h + 1)..sheet.height() {
        let label = sheet.label(r, candidate_col);
        if label.is_empty() || m.is_total_label(&label) || m.is_ignored_label(&label) {
            continue;
        }
        let parts = parse_header(&label, m);
        let candidate = match parts.candidate {
            Some(c) => c,
            None => continue,
        };
        let (party, explicit_party) = match party_col {
            Some(pc) if !parts.explicit_party && !sheet.value(r, pc).is_empty() => {
                (m.party_for(&sheet.label(r, pc)), true)
            }
            _ => (parts.party, parts.explicit_party),
        };
        let (office, district) = match ctx.contest_of_row(r) {
            Some(c) => c,
            None => {
                debug!("rows_entries: row {} is not a tracked race", r + 1);
                continue;
            }
        };
        candidate_rows += 1;
        for (c, county, precinct, col_tag) in precinct_cols.iter() {
            let tag = if parts.tag != VoteColumnTag::CandidateName {
                parts.tag
            } else {
                *col_tag
            };
            let votes = ctx.votes_at(r, *c);
            entries.push(Entry {
                county: county.clone(),
                precinct: precinct.clone(),
                office: office.clone(),
                district: district.clone(),
                candidate: candidate.clone(),
                party,
                explicit_party,
                tag,
                votes,
            });
        }
    }
    if candidate_rows == 0 {
        return Err(ctx.ambiguous("no row names a candidate"));
    }
    Ok(entries)
}

// ***** Collapsing vote types *****

type EntryKey = (String, String, String, Option<String>, String);

fn collapse(ctx: &mut SheetContext, entries: Vec<Entry>) -> Vec<CandidateVoteRecord> {
    let m = ctx.matchers;
    let mut groups: BTreeMap<EntryKey, Collapsed> = BTreeMap::new();
    for e in entries.into_iter() {
        let key = (
            e.county.clone(),
            e.precinct.clone(),
            e.office.clone(),
            e.district.clone(),
            m.candidate_key(&e.candidate),
        );
        let g = groups.entry(key).or_insert_with(|| Collapsed {
            name: e.candidate.clone(),
            ..Collapsed::default()
        });
        // An explicit party wins over an inferred one.
        match g.party {
            None => g.party = Some((e.party, e.explicit_party)),
            Some((_, false)) if e.explicit_party => g.party = Some((e.party, true)),
            _ => {}
        }
        match e.tag {
            VoteColumnTag::Total | VoteColumnTag::CandidateName => {
                if g.total.is_none() {
                    g.total = Some(e.votes);
                } else {
                    debug!(
                        "collapse: second total column for {:?} in {:?} ignored",
                        e.candidate, e.precinct
                    );
                }
            }
            t if t.is_subordinate() => {
                g.partial_sum += e.votes;
                g.partial_count += 1;
            }
            _ => {}
        }
    }

    let mut discarded: BTreeSet<String> = BTreeSet::new();
    let mut mismatched: BTreeMap<String, (String, u64, u64)> = BTreeMap::new();
    let mut records: Vec<CandidateVoteRecord> = Vec::new();
    for ((county, precinct, office, district, _), g) in groups.into_iter() {
        let votes = match g.total {
            Some(total) => {
                if g.partial_count > 0 {
                    discarded.insert(g.name.clone());
                    if g.partial_sum != total {
                        mismatched
                            .entry(g.name.clone())
                            .or_insert((precinct.clone(), g.partial_sum, total));
                    }
                }
                total
            }
            None => g.partial_sum,
        };
        records.push(CandidateVoteRecord {
            precinct_id: precinct,
            county,
            year: ctx.year,
            office,
            district,
            candidate_name: g.name,
            party: g.party.map(|(p, _)| p).unwrap_or(Party::Other),
            votes,
            sheet_id: ctx.descriptor.sheet_id.clone(),
        });
    }

    for name in discarded.iter() {
        debug!(
            "collapse: sheet {:?}: subordinate columns of {:?} discarded in favor of the reported total",
            ctx.descriptor.sheet_id, name
        );
        ctx.note(
            Stage::Classify,
            DiagnosticKind::DiscardedSubordinateColumns,
            format!(
                "subordinate vote-type columns of {:?} discarded; the reported total is used",
                name
            ),
        );
    }
    for (name, (precinct, sum, total)) in mismatched.into_iter() {
        warn!(
            "collapse: sheet {:?}: {:?} in {:?}: subordinate columns sum to {} but the total is {}",
            ctx.descriptor.sheet_id, name, precinct, sum, total
        );
        ctx.note(
            Stage::Classify,
            DiagnosticKind::SubtotalMismatch,
            format!(
                "{:?} in precinct {:?}: subordinate columns sum to {} but the reported total is {}",
                name, precinct, sum, total
            ),
        );
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SheetBuilder;

    fn matchers() -> Matchers {
        Matchers::new(&PipelineRules::default()).unwrap()
    }

    fn columns_descriptor(office: &str, header_row: usize) -> SheetDescriptor {
        SheetDescriptor {
            sheet_id: "s1".to_string(),
            sheet_index: 0,
            inferred_office_label: Some(office.to_string()),
            office: Some(office.to_string()),
            district: None,
            orientation: Orientation::CandidatesAsColumns,
            confidence_score: 2,
            header_row,
            candidate_row: None,
            race_column: None,
        }
    }

    fn votes_of(records: &[CandidateVoteRecord], name: &str) -> u64 {
        records
            .iter()
            .filter(|r| r.candidate_name == name)
            .map(|r| r.votes)
            .sum()
    }

    #[test]
    fn headers_are_decomposed() {
        let m = matchers();
        let p = parse_header("Smith (D) - Election Day", &m);
        assert_eq!(p.candidate.as_deref(), Some("Smith"));
        assert_eq!(p.party, Party::Democratic);
        assert_eq!(p.tag, VoteColumnTag::InPerson);

        let p = parse_header("Jones (R) - Total", &m);
        assert_eq!(p.tag, VoteColumnTag::Total);
        assert_eq!(p.party, Party::Republican);

        let p = parse_header("Kim Reynolds R", &m);
        assert_eq!(p.candidate.as_deref(), Some("Kim Reynolds"));
        assert_eq!(p.party, Party::Republican);
        assert_eq!(p.tag, VoteColumnTag::CandidateName);

        let p = parse_header("Jake Porter (LIB)", &m);
        assert_eq!(p.party, Party::Other);

        let p = parse_header("Total Votes", &m);
        assert_eq!(p.candidate, None);
        assert_eq!(p.tag, VoteColumnTag::Total);

        let p = parse_header("Write-ins", &m);
        assert_eq!(p.candidate.as_deref(), Some(WRITE_IN));
        assert_eq!(p.party, Party::Other);

        assert_eq!(parse_header("Registered Voters", &m).candidate, None);
    }

    #[test]
    fn party_suffix_wins_over_keywords_in_the_name() {
        let m = matchers();
        let p = parse_header("Early (R)", &m);
        assert_eq!(p.candidate.as_deref(), Some("Early"));
        assert_eq!(p.tag, VoteColumnTag::CandidateName);
    }

    #[test]
    fn vote_cells() {
        assert_eq!(parse_votes(&CellValue::Number(12.0)), Ok(12));
        assert_eq!(parse_votes(&CellValue::Text(" 1,204 ".to_string())), Ok(1204));
        assert_eq!(parse_votes(&CellValue::Empty), Ok(0));
        assert!(parse_votes(&CellValue::Number(-3.0)).is_err());
        assert!(parse_votes(&CellValue::Text("n/a".to_string())).is_err());
    }

    #[test]
    fn total_column_is_used_verbatim() {
        let m = matchers();
        let sheet = SheetBuilder::new("Governor")
            .row(&[
                "Precinct",
                "Smith (D) - Election Day",
                "Smith (D) - Absentee",
                "Smith (D) - Total",
                "Jones (R) - Total",
            ])
            .row(&["Ward 1", "120", "30", "150", "100"])
            .build();
        let res = classify_sheet(
            "Polk",
            2018,
            &sheet,
            &columns_descriptor("Governor", 0),
            &m,
        )
        .unwrap();
        assert_eq!(res.records.len(), 2);
        assert_eq!(votes_of(&res.records, "Smith"), 150);
        assert_eq!(votes_of(&res.records, "Jones"), 100);
        let smith = res
            .records
            .iter()
            .find(|r| r.candidate_name == "Smith")
            .unwrap();
        assert_eq!(smith.party, Party::Democratic);
        assert_eq!(smith.precinct_id, "Ward 1");
        let discarded: Vec<&Diagnostic> = res
            .diagnostics
            .iter()
            .filter(|d| d.error_kind == DiagnosticKind::DiscardedSubordinateColumns)
            .collect();
        assert_eq!(discarded.len(), 1);
        assert!(discarded[0].message.contains("Smith"));
        assert!(!res
            .diagnostics
            .iter()
            .any(|d| d.error_kind == DiagnosticKind::SubtotalMismatch));
    }

    #[test]
    fn subordinate_columns_are_summed_without_total() {
        let m = matchers();
        let sheet = SheetBuilder::new("Governor")
            .row(&["Precinct", "Smith (D) - Election Day", "Smith (D) - Absentee", "Jones (R)"])
            .row(&["1", "120", "30", "90"])
            .row(&["2", "10", "5", "7"])
            .row(&["Total:", "130", "35", "97"])
            .build();
        let res = classify_sheet(
            "Polk",
            2018,
            &sheet,
            &columns_descriptor("Governor", 0),
            &m,
        )
        .unwrap();
        // The total row closes the precinct list.
        assert_eq!(res.records.len(), 4);
        assert_eq!(votes_of(&res.records, "Smith"), 165);
        assert_eq!(votes_of(&res.records, "Jones"), 97);
        assert!(res.diagnostics.is_empty());
    }

    #[test]
    fn subtotal_mismatch_is_reported() {
        let m = matchers();
        let sheet = SheetBuilder::new("Governor")
            .row(&["Precinct", "Smith (D) - Election Day", "Smith (D) - Total"])
            .row(&["1", "120", "100"])
            .build();
        let res = classify_sheet(
            "Polk",
            2018,
            &sheet,
            &columns_descriptor("Governor", 0),
            &m,
        )
        .unwrap();
        assert_eq!(votes_of(&res.records, "Smith"), 100);
        assert!(res
            .diagnostics
            .iter()
            .any(|d| d.error_kind == DiagnosticKind::SubtotalMismatch));
    }

    #[test]
    fn reported_total_equals_subordinate_sum() {
        // Dropping the total column and reclassifying gives the same totals.
        let m = matchers();
        let with_total = SheetBuilder::new("Governor")
            .row(&["Precinct", "Smith (D) - Election Day", "Smith (D) - Absentee", "Smith (D) - Total"])
            .row(&["1", "120", "30", "150"])
            .build();
        let without_total = SheetBuilder::new("Governor")
            .row(&["Precinct", "Smith (D) - Election Day", "Smith (D) - Absentee"])
            .row(&["1", "120", "30"])
            .build();
        let d = columns_descriptor("Governor", 0);
        let a = classify_sheet("Polk", 2018, &with_total, &d, &m).unwrap();
        let b = classify_sheet("Polk", 2018, &without_total, &d, &m).unwrap();
        assert_eq!(votes_of(&a.records, "Smith"), votes_of(&b.records, "Smith"));
    }

    #[test]
    fn two_row_headers_span_candidates() {
        let m = matchers();
        let sheet = SheetBuilder::new("US Senate")
            .row(&["", "Smith (D)", "", "Jones (R)", ""])
            .row(&["Precinct", "Election Day", "Absentee", "Election Day", "Absentee"])
            .row(&["1", "10", "2", "7", "1"])
            .build();
        let mut d = columns_descriptor("US Senate", 1);
        d.candidate_row = Some(0);
        let res = classify_sheet("Polk", 2018, &sheet, &d, &m).unwrap();
        assert_eq!(votes_of(&res.records, "Smith"), 12);
        assert_eq!(votes_of(&res.records, "Jones"), 8);
    }

    #[test]
    fn candidates_as_rows_with_race_titles() {
        let m = matchers();
        let sheet = SheetBuilder::new("Results")
            .row(&["RaceTitle", "CandidateName", "PoliticalPartyName", "Adair-1NW Total", "Adair-2SE Total", "Adair"])
            .row(&["Governor", "Kim Reynolds", "Republican Party", "200", "150", "350"])
            .row(&["Governor", "Fred Hubbell", "Democratic Party", "100", "120", "220"])
            .row(&["County Recorder", "Pat Doe", "Republican Party", "5", "5", "10"])
            .row(&["State Senator Dist. 9", "Ann Roe", "Democratic Party", "40", "50", "90"])
            .build();
        let d = SheetDescriptor {
            sheet_id: "Results".to_string(),
            sheet_index: 0,
            inferred_office_label: None,
            office: None,
            district: None,
            orientation: Orientation::CandidatesAsRows,
            confidence_score: 1,
            header_row: 0,
            candidate_row: None,
            race_column: Some(0),
        };
        let res = classify_sheet("Adair", 2018, &sheet, &d, &m).unwrap();
        // 3 tracked candidates x 2 precincts; the county total column is skipped.
        assert_eq!(res.records.len(), 6);
        assert_eq!(votes_of(&res.records, "Kim Reynolds"), 350);
        let roe: Vec<&CandidateVoteRecord> = res
            .records
            .iter()
            .filter(|r| r.candidate_name == "Ann Roe")
            .collect();
        assert_eq!(roe[0].office, "State Senate");
        assert_eq!(roe[0].district.as_deref(), Some("9"));
        assert_eq!(roe[0].party, Party::Democratic);
        assert_eq!(roe[0].precinct_id, "Adair-1NW");
    }

    #[test]
    fn unknown_orientation_is_ambiguous() {
        let m = matchers();
        let sheet = SheetBuilder::new("Governor")
            .row(&["Some", "Thing"])
            .build();
        let mut d = columns_descriptor("Governor", 0);
        d.orientation = Orientation::Unknown;
        let err = classify_sheet("Polk", 2018, &sheet, &d, &m).unwrap_err();
        assert_eq!(err.kind(), DiagnosticKind::AmbiguousLayout);
    }

    #[test]
    fn invalid_cells_count_as_zero_with_a_note() {
        let m = matchers();
        let sheet = SheetBuilder::new("Governor")
            .row(&["Precinct", "Smith (D)", "Jones (R)"])
            .row(&["1", "-4", "n/a"])
            .build();
        let res = classify_sheet(
            "Polk",
            2018,
            &sheet,
            &columns_descriptor("Governor", 0),
            &m,
        )
        .unwrap();
        assert_eq!(votes_of(&res.records, "Smith"), 0);
        assert_eq!(
            res.diagnostics
                .iter()
                .filter(|d| d.error_kind == DiagnosticKind::InvalidVoteCount)
                .count(),
            2
        );
    }
}
