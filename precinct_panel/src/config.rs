// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

/// An election year. Tracked cycles are the even years of general elections.
pub type Year = u16;

/// The content of a single spreadsheet cell, as handed over by the workbook reader.
///
/// The pipeline never looks at formatting, formulas or hyperlinks: only the
/// scalar value of the cell.
#[derive(PartialEq, Debug, Clone)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
}

impl CellValue {
    /// The text label of the cell. Integral numbers are rendered without decimals
    /// so that sheet references such as `3` or `3.0` read the same.
    pub fn label(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(f) if f.is_finite() && f.fract() == 0.0 => {
                format!("{}", *f as i64)
            }
            CellValue::Number(f) => format!("{}", f),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
        }
    }
}

/// A (row, column) position inside a sheet with its value. Read-only.
#[derive(PartialEq, Debug, Clone)]
pub struct RawCell {
    pub row: usize,
    pub column: usize,
    pub value: CellValue,
}

impl RawCell {
    pub fn label(&self) -> String {
        self.value.label()
    }
}

static EMPTY_CELL: CellValue = CellValue::Empty;

/// One worksheet: a name and a ragged 2-D grid of cells.
#[derive(PartialEq, Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<CellValue>>,
}

impl Sheet {
    pub fn new(name: &str, rows: Vec<Vec<CellValue>>) -> Sheet {
        Sheet {
            name: name.to_string(),
            rows,
        }
    }

    /// The value at a position. Positions outside the grid read as empty cells.
    pub fn value(&self, row: usize, column: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn label(&self, row: usize, column: usize) -> String {
        self.value(row, column).label()
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    /// All the non-empty cells, in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = RawCell> + '_ {
        self.rows.iter().enumerate().flat_map(|(row, cells)| {
            cells
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_empty())
                .map(move |(column, value)| RawCell {
                    row,
                    column,
                    value: value.clone(),
                })
        })
    }
}

/// A parsed workbook: the ordered sequence of its sheets.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

// ******** Layout and classification *********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Orientation {
    /// One column (or a block of columns) per candidate, one row per precinct.
    CandidatesAsColumns,
    /// One row per candidate, precincts laid out as columns.
    CandidatesAsRows,
    Unknown,
}

/// The decisions taken once per sheet by the layout resolver.
///
/// Never mutated after the resolver returns it: the classifier reads the
/// orientation and header positions from here instead of guessing again.
#[derive(PartialEq, Debug, Clone)]
pub struct SheetDescriptor {
    pub sheet_id: String,
    pub sheet_index: usize,
    /// The raw text the office was recognized from (TOC entry, sheet name or title cell).
    pub inferred_office_label: Option<String>,
    /// The canonical office name, if the sheet holds a single contest.
    pub office: Option<String>,
    pub district: Option<String>,
    pub orientation: Orientation,
    /// Audit only. Sum of the weights of the signals that matched.
    pub confidence_score: u32,
    pub header_row: usize,
    /// Row above the header holding candidate names that span several vote-type columns.
    pub candidate_row: Option<usize>,
    /// Column holding a race title on every row, for sheets that mix several contests.
    pub race_column: Option<usize>,
}

impl SheetDescriptor {
    pub fn is_contest(&self) -> bool {
        self.orientation != Orientation::Unknown
            && (self.office.is_some() || self.race_column.is_some())
    }
}

/// The classification of a column (or row) header.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum VoteColumnTag {
    InPerson,
    Absentee,
    Early,
    Provisional,
    Total,
    WriteIn,
    /// A candidate name without any vote-type qualifier: the value is the candidate total.
    CandidateName,
    Unknown,
}

impl VoteColumnTag {
    /// Partial vote-type columns, summed only when no reported total exists.
    pub fn is_subordinate(&self) -> bool {
        matches!(
            self,
            VoteColumnTag::InPerson
                | VoteColumnTag::Absentee
                | VoteColumnTag::Early
                | VoteColumnTag::Provisional
                | VoteColumnTag::WriteIn
        )
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Party {
    Democratic,
    Republican,
    Other,
}

impl Party {
    pub fn code(&self) -> &'static str {
        match self {
            Party::Democratic => "D",
            Party::Republican => "R",
            Party::Other => "OTHER",
        }
    }
}

impl Display for Party {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// The votes of one candidate in one precinct, after collapsing the vote-type columns.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct CandidateVoteRecord {
    pub precinct_id: String,
    pub county: String,
    pub year: Year,
    pub office: String,
    pub district: Option<String>,
    pub candidate_name: String,
    pub party: Party,
    pub votes: u64,
    pub sheet_id: String,
}

// ******** Canonical records *********

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct CandidateTally {
    pub name: String,
    pub party: Party,
    pub votes: u64,
}

/// The fields of one tracked office for one precinct.
///
/// Invariant: `d_votes + r_votes + other_votes == total_votes`.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct OfficeSlot {
    pub office_name: String,
    pub district: Option<String>,
    pub d_votes: u64,
    pub d_candidate: Option<String>,
    pub r_votes: u64,
    pub r_candidate: Option<String>,
    pub other_votes: u64,
    pub total_votes: u64,
    /// Every candidate behind the slot, sorted by name. Not part of the canonical output.
    pub tallies: Vec<CandidateTally>,
}

impl OfficeSlot {
    /// The votes that count for a party in this slot. Minor parties share the other bucket.
    pub fn votes_for(&self, party: Party) -> u64 {
        match party {
            Party::Democratic => self.d_votes,
            Party::Republican => self.r_votes,
            Party::Other => self.other_votes,
        }
    }

    pub fn share_for(&self, party: Party) -> Option<f64> {
        if self.total_votes == 0 {
            None
        } else {
            Some(self.votes_for(party) as f64 / self.total_votes as f64)
        }
    }
}

/// One row per (precinct, county, year), with one slot per tracked office.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct CanonicalPrecinctRecord {
    pub precinct_id: String,
    pub county: String,
    pub year: Year,
    pub district_label: Option<String>,
    pub slots: Vec<Option<OfficeSlot>>,
    /// Contests of a precinct split between districts, other than the one in the slot.
    /// Counted in the rollups, not in the canonical columns. `(slot index, contest)`.
    pub split_slots: Vec<(usize, OfficeSlot)>,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum LinkStatus {
    Matched,
    BoundaryChanged,
    NoPriorData,
}

impl LinkStatus {
    pub fn label(&self) -> &'static str {
        match self {
            LinkStatus::Matched => "matched",
            LinkStatus::BoundaryChanged => "boundary_changed",
            LinkStatus::NoPriorData => "no_prior_data",
        }
    }
}

/// Incumbency context attached to one office slot.
#[derive(PartialEq, Debug, Clone)]
pub struct IncumbencyRecord {
    pub incumbent_party: Option<Party>,
    pub is_candidate_incumbent: Option<bool>,
    pub prior_votes: Option<u64>,
    pub prior_share: Option<f64>,
    pub vote_delta: Option<i64>,
    pub share_delta: Option<f64>,
    pub status: LinkStatus,
}

impl IncumbencyRecord {
    pub const NO_PRIOR_DATA: IncumbencyRecord = IncumbencyRecord {
        incumbent_party: None,
        is_candidate_incumbent: None,
        prior_votes: None,
        prior_share: None,
        vote_delta: None,
        share_delta: None,
        status: LinkStatus::NoPriorData,
    };
}

// ******** Facilities and overlay *********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Technology {
    Wind,
    Solar,
}

#[derive(PartialEq, Debug, Clone)]
pub struct RenewableProject {
    pub project_id: String,
    pub technology: Technology,
    pub capacity_mw: f64,
    pub commissioned_year: Year,
    pub location: Option<crate::geometry::Geometry>,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct SpatialOverlayResult {
    pub prior_project_count: u32,
    pub prior_cumulative_mw: f64,
    pub new_project_count: u32,
    pub new_cumulative_mw: f64,
}

/// The two tracked cycles compared by the temporal linker and the spatial overlay.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct CyclePair {
    pub previous: Option<Year>,
    pub current: Year,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct Demographics {
    pub avg_income: Option<f64>,
    pub minority_share: Option<f64>,
    pub population: Option<u64>,
}

// ******** Rollups *********

#[derive(PartialEq, Debug, Clone)]
pub struct CandidateShare {
    pub name: String,
    pub party: Party,
    pub votes: u64,
    /// Percentage of the contest votes, rounded to one decimal.
    pub share: f64,
}

/// Contest-level results for one office in one district (or statewide).
#[derive(PartialEq, Debug, Clone)]
pub struct ContestResult {
    pub year: Year,
    pub office: String,
    pub district: Option<String>,
    pub total_votes: u64,
    /// Sorted by votes, ties by name.
    pub candidates: Vec<CandidateShare>,
}

impl ContestResult {
    pub fn winner(&self) -> Option<&CandidateShare> {
        self.candidates.first().filter(|c| c.votes > 0)
    }

    pub fn share_for(&self, party: Party) -> Option<f64> {
        if self.total_votes == 0 {
            return None;
        }
        let votes: u64 = self
            .candidates
            .iter()
            .filter(|c| c.party == party)
            .map(|c| c.votes)
            .sum();
        Some(votes as f64 / self.total_votes as f64)
    }
}

// ******** Diagnostics and errors *********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Stage {
    Acquisition,
    Layout,
    Classify,
    Merge,
    Temporal,
    Spatial,
    Demographics,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Acquisition => "acquisition",
            Stage::Layout => "layout",
            Stage::Classify => "classify",
            Stage::Merge => "merge",
            Stage::Temporal => "temporal",
            Stage::Spatial => "spatial",
            Stage::Demographics => "demographics",
        }
    }
}

/// The kind of anomaly recorded in the diagnostics table.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum DiagnosticKind {
    AmbiguousLayout,
    OfficeSlotConflict,
    PrecinctIdentityConflict,
    BoundaryMismatch,
    NotAvailable,
    TransientFetch,
    UnreadableWorkbook,
    UnknownSheet,
    DiscardedSubordinateColumns,
    SubtotalMismatch,
    InvalidVoteCount,
    UnmatchedProject,
    SplitDistrictPrecinct,
    SuspiciousDistrictSpread,
    InvalidRules,
}

impl DiagnosticKind {
    pub fn label(&self) -> &'static str {
        match self {
            DiagnosticKind::AmbiguousLayout => "AmbiguousLayoutError",
            DiagnosticKind::OfficeSlotConflict => "OfficeSlotConflictError",
            DiagnosticKind::PrecinctIdentityConflict => "PrecinctIdentityConflictError",
            DiagnosticKind::BoundaryMismatch => "BoundaryMismatchWarning",
            DiagnosticKind::NotAvailable => "NotAvailableError",
            DiagnosticKind::TransientFetch => "TransientFetchError",
            DiagnosticKind::UnreadableWorkbook => "UnreadableWorkbook",
            DiagnosticKind::UnknownSheet => "UnknownSheet",
            DiagnosticKind::DiscardedSubordinateColumns => "DiscardedSubordinateColumns",
            DiagnosticKind::SubtotalMismatch => "SubtotalMismatch",
            DiagnosticKind::InvalidVoteCount => "InvalidVoteCount",
            DiagnosticKind::UnmatchedProject => "UnmatchedProject",
            DiagnosticKind::SplitDistrictPrecinct => "SplitDistrictPrecinct",
            DiagnosticKind::SuspiciousDistrictSpread => "SuspiciousDistrictSpread",
            DiagnosticKind::InvalidRules => "InvalidRules",
        }
    }
}

/// One row of the diagnostics table.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Diagnostic {
    pub county: Option<String>,
    pub year: Option<Year>,
    pub sheet_id: Option<String>,
    pub stage: Stage,
    pub error_kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(stage: Stage, error_kind: DiagnosticKind, message: String) -> Diagnostic {
        Diagnostic {
            county: None,
            year: None,
            sheet_id: None,
            stage,
            error_kind,
            message,
        }
    }

    pub fn unit(mut self, county: &str, year: Year) -> Diagnostic {
        self.county = Some(county.to_string());
        self.year = Some(year);
        self
    }

    pub fn sheet(mut self, sheet_id: &str) -> Diagnostic {
        self.sheet_id = Some(sheet_id.to_string());
        self
    }

    pub fn from_error(stage: Stage, err: &PipelineError) -> Diagnostic {
        Diagnostic::new(stage, err.kind(), err.to_string())
    }
}

/// Errors raised by the pipeline stages.
///
/// None of them is fatal to a run: they are contained at the unit (or
/// geography) boundary and end up in the diagnostics table.
#[derive(PartialEq, Debug, Clone)]
pub enum PipelineError {
    /// No header of the sheet matches a vote-type or candidate pattern.
    AmbiguousLayout { sheet: String, reason: String },
    /// Two sheets report different totals for the same candidate in the same precinct.
    OfficeSlotConflict {
        precinct: String,
        office: String,
        candidate: String,
        first: (String, u64),
        second: (String, u64),
    },
    /// Two precinct names that look like variants of each other but cannot be merged.
    PrecinctIdentityConflict { first: String, second: String },
    /// A join had to fall back to district granularity.
    BoundaryMismatch { geography: String, reason: String },
    NotAvailable { county: String, year: Year },
    TransientFetch {
        county: String,
        year: Year,
        message: String,
    },
    /// The configuration cannot be turned into matchers.
    InvalidRules { message: String },
}

impl PipelineError {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            PipelineError::AmbiguousLayout { .. } => DiagnosticKind::AmbiguousLayout,
            PipelineError::OfficeSlotConflict { .. } => DiagnosticKind::OfficeSlotConflict,
            PipelineError::PrecinctIdentityConflict { .. } => {
                DiagnosticKind::PrecinctIdentityConflict
            }
            PipelineError::BoundaryMismatch { .. } => DiagnosticKind::BoundaryMismatch,
            PipelineError::NotAvailable { .. } => DiagnosticKind::NotAvailable,
            PipelineError::TransientFetch { .. } => DiagnosticKind::TransientFetch,
            PipelineError::InvalidRules { .. } => DiagnosticKind::InvalidRules,
        }
    }
}

impl Error for PipelineError {}

impl Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::AmbiguousLayout { sheet, reason } => {
                write!(f, "sheet {:?} has an ambiguous layout: {}", sheet, reason)
            }
            PipelineError::OfficeSlotConflict {
                precinct,
                office,
                candidate,
                first,
                second,
            } => write!(
                f,
                "precinct {:?}, office {:?}, candidate {:?}: sheet {:?} reports {} votes but sheet {:?} reports {}",
                precinct, office, candidate, first.0, first.1, second.0, second.1
            ),
            PipelineError::PrecinctIdentityConflict { first, second } => write!(
                f,
                "precinct names {:?} and {:?} look like variants of each other; kept as distinct precincts",
                first, second
            ),
            PipelineError::BoundaryMismatch { geography, reason } => {
                write!(f, "{}: {}", geography, reason)
            }
            PipelineError::NotAvailable { county, year } => {
                write!(f, "no workbook published for {} {}", county, year)
            }
            PipelineError::TransientFetch {
                county,
                year,
                message,
            } => write!(f, "fetching {} {} failed: {}", county, year, message),
            PipelineError::InvalidRules { message } => write!(f, "invalid rules: {}", message),
        }
    }
}

// ********* Configuration **********

/// The configurable vocabulary of the pipeline.
///
/// New office names, vote-type spellings or party codes are added here, never in code.
/// All text comparisons are case-insensitive and whitespace-insensitive.
#[derive(PartialEq, Debug, Clone)]
pub struct PipelineRules {
    /// Canonical office names, in slot order. Offices outside this list are dropped.
    pub tracked_offices: Vec<String>,
    /// Canonical office name -> accepted text variants (substring match, longest wins).
    pub office_aliases: Vec<(String, Vec<String>)>,
    /// The office whose district populates the `district_label` of a record.
    pub district_office: Option<String>,
    pub vote_type_aliases: Vec<(VoteColumnTag, Vec<String>)>,
    pub party_aliases: Vec<(Party, Vec<String>)>,
    pub precinct_labels: Vec<String>,
    pub candidate_labels: Vec<String>,
    pub party_labels: Vec<String>,
    pub race_labels: Vec<String>,
    /// Sheets whose name contains one of these are not contests (turnout, summary...).
    pub non_contest_labels: Vec<String>,
    pub toc_labels: Vec<String>,
    /// Row (or column) labels that close the precinct list.
    pub total_row_labels: Vec<String>,
    /// Metadata headers that are never candidates.
    pub ignored_labels: Vec<String>,
    /// Prefixes removed from precinct names before merging.
    pub precinct_prefixes: Vec<String>,
    /// Titles and suffixes removed from person names before comparing them.
    pub name_affixes: Vec<String>,
    /// How many rows from the top of a sheet may hold the header.
    pub header_scan_rows: usize,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Default for PipelineRules {
    fn default() -> Self {
        PipelineRules {
            tracked_offices: strings(&[
                "President",
                "US Senate",
                "US House",
                "Governor",
                "State Senate",
                "State House",
            ]),
            office_aliases: vec![
                ("President".to_string(), strings(&["president"])),
                (
                    "US Senate".to_string(),
                    strings(&[
                        "u.s. senator",
                        "us senator",
                        "united states senator",
                        "u.s. senate",
                        "us senate",
                    ]),
                ),
                (
                    "US House".to_string(),
                    strings(&[
                        "u.s. rep",
                        "us rep",
                        "united states representative",
                        "u.s. house",
                        "us house",
                    ]),
                ),
                ("Governor".to_string(), strings(&["governor"])),
                (
                    "State Senate".to_string(),
                    strings(&["state senator", "state senate"]),
                ),
                (
                    "State House".to_string(),
                    strings(&["state rep", "state representative", "state house"]),
                ),
            ],
            district_office: Some("State Senate".to_string()),
            vote_type_aliases: vec![
                (
                    VoteColumnTag::Total,
                    strings(&["total votes", "total", "totals", "grand total"]),
                ),
                (
                    VoteColumnTag::InPerson,
                    strings(&["election day", "polling", "polls", "in person", "in-person"]),
                ),
                (
                    VoteColumnTag::Absentee,
                    strings(&["absentee", "by mail", "mail-in", "mail"]),
                ),
                (
                    VoteColumnTag::Early,
                    strings(&["early voting", "early", "one stop"]),
                ),
                (VoteColumnTag::Provisional, strings(&["provisional"])),
                (
                    VoteColumnTag::WriteIn,
                    strings(&["write-ins", "write-in", "write in", "writein", "scattering"]),
                ),
            ],
            party_aliases: vec![
                (
                    Party::Democratic,
                    strings(&["d", "dem", "democrat", "democratic", "democratic party"]),
                ),
                (
                    Party::Republican,
                    strings(&["r", "rep", "gop", "republican", "republican party"]),
                ),
            ],
            precinct_labels: strings(&["precinct", "precinct name", "precincts", "pct"]),
            candidate_labels: strings(&["candidatename", "candidate name", "candidate"]),
            party_labels: strings(&["politicalpartyname", "party", "political party"]),
            race_labels: strings(&["racetitle", "race title", "race", "contest", "office"]),
            non_contest_labels: strings(&[
                "turnout",
                "summary",
                "registered voters",
                "statistics",
                "ballots cast",
            ]),
            toc_labels: strings(&["table of contents", "contents", "toc", "index"]),
            total_row_labels: strings(&[
                "total",
                "totals",
                "county total",
                "county totals",
                "grand total",
                "cumulative",
            ]),
            ignored_labels: strings(&[
                "registered voters",
                "ballots cast",
                "overvotes",
                "undervotes",
                "over votes",
                "under votes",
                "times cast",
                "times blank voted",
                "times over voted",
                "number of precincts",
                "precincts reporting",
                "turnout",
                "voter turnout",
            ]),
            precinct_prefixes: strings(&["precinct", "pct", "ward", "township", "twp"]),
            name_affixes: strings(&[
                "jr", "sr", "ii", "iii", "iv", "mr", "mrs", "ms", "dr", "hon", "rep", "sen",
            ]),
            header_scan_rows: 6,
        }
    }
}
