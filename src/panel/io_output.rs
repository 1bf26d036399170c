// The canonical table, the diagnostics table and the district results.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::panel::*;

/// A cell of the canonical table. `None` cells are nulls.
#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(untagged)]
enum Field {
    Text(String),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Bool(bool),
}

impl Field {
    fn to_csv(&self) -> String {
        match self {
            Field::Text(s) => s.clone(),
            Field::Unsigned(n) => n.to_string(),
            Field::Signed(n) => n.to_string(),
            Field::Float(f) => f.to_string(),
            Field::Bool(b) => b.to_string(),
        }
    }
}

/// One line of the JSON lines output. Keys follow the column order.
struct CanonicalLine<'a> {
    header: &'a [String],
    fields: Vec<Option<Field>>,
}

impl<'a> Serialize for CanonicalLine<'a> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.header.len()))?;
        for (k, f) in self.header.iter().zip(self.fields.iter()) {
            map.serialize_entry(k, f)?;
        }
        map.end()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CycleResultsJs<'a> {
    year: Year,
    unmatched_project_count: u32,
    contests: Vec<ContestJs<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContestJs<'a> {
    office: &'a str,
    district: Option<&'a str>,
    total_votes: u64,
    winner: Option<WinnerJs<'a>>,
    candidates: Vec<CandidateJs<'a>>,
    projects: Option<ProjectsJs>,
}

#[derive(Debug, Serialize)]
struct WinnerJs<'a> {
    name: &'a str,
    party: &'a str,
}

#[derive(Debug, Serialize)]
struct CandidateJs<'a> {
    name: &'a str,
    party: &'a str,
    votes: u64,
    share: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectsJs {
    prior_project_count: u32,
    prior_cumulative_mw: f64,
    new_project_count: u32,
    new_cumulative_mw: f64,
}

const OFFICE_COLUMNS: [&str; 14] = [
    "name",
    "d_votes",
    "d_candidate",
    "r_votes",
    "r_candidate",
    "other_votes",
    "total_votes",
    "incumbent_party",
    "is_incumbent_candidate",
    "prior_votes",
    "prior_share",
    "vote_delta",
    "share_delta",
    "link_status",
];

const TRAILING_COLUMNS: [&str; 7] = [
    "prior_project_count",
    "prior_cumulative_mw",
    "new_project_count",
    "new_cumulative_mw",
    "avg_income",
    "minority_share",
    "population",
];

pub fn canonical_header(num_offices: usize) -> Vec<String> {
    let mut header: Vec<String> = ["precinct_id", "county", "year", "district_label"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    for n in 1..=num_offices {
        for c in OFFICE_COLUMNS.iter() {
            header.push(format!("office_{}_{}", n, c));
        }
    }
    header.extend(TRAILING_COLUMNS.iter().map(|s| s.to_string()));
    header
}

fn office_fields(slot: Option<&OfficeSlot>, link: Option<&IncumbencyRecord>) -> Vec<Option<Field>> {
    let mut fields: Vec<Option<Field>> = match slot {
        Some(s) => vec![
            Some(Field::Text(s.office_name.clone())),
            Some(Field::Unsigned(s.d_votes)),
            s.d_candidate.clone().map(Field::Text),
            Some(Field::Unsigned(s.r_votes)),
            s.r_candidate.clone().map(Field::Text),
            Some(Field::Unsigned(s.other_votes)),
            Some(Field::Unsigned(s.total_votes)),
        ],
        None => vec![None; 7],
    };
    match link {
        Some(l) => fields.extend(vec![
            l.incumbent_party.map(|p| Field::Text(p.code().to_string())),
            l.is_candidate_incumbent.map(Field::Bool),
            l.prior_votes.map(Field::Unsigned),
            l.prior_share.map(Field::Float),
            l.vote_delta.map(Field::Signed),
            l.share_delta.map(Field::Float),
            Some(Field::Text(l.status.label().to_string())),
        ]),
        None => fields.extend(vec![None; 7]),
    }
    fields
}

fn row_fields(row: &PanelRow, num_offices: usize) -> Vec<Option<Field>> {
    let rec = &row.record;
    let mut fields: Vec<Option<Field>> = vec![
        Some(Field::Text(rec.precinct_id.clone())),
        Some(Field::Text(rec.county.clone())),
        Some(Field::Unsigned(rec.year as u64)),
        rec.district_label.clone().map(Field::Text),
    ];
    for idx in 0..num_offices {
        let slot = rec.slots.get(idx).and_then(|s| s.as_ref());
        let link = row.incumbency.get(idx).and_then(|l| l.as_ref());
        fields.extend(office_fields(slot, link));
    }
    let overlay = row.overlay.as_ref();
    fields.push(overlay.map(|o| Field::Unsigned(o.prior_project_count as u64)));
    fields.push(overlay.map(|o| Field::Float(o.prior_cumulative_mw)));
    fields.push(overlay.map(|o| Field::Unsigned(o.new_project_count as u64)));
    fields.push(overlay.map(|o| Field::Float(o.new_cumulative_mw)));
    let demographics = row.demographics.as_ref();
    fields.push(demographics.and_then(|d| d.avg_income).map(Field::Float));
    fields.push(demographics.and_then(|d| d.minority_share).map(Field::Float));
    fields.push(demographics.and_then(|d| d.population).map(Field::Unsigned));
    fields
}

fn csv_to_string<F>(write_rows: F) -> PanelResult<String>
where
    F: FnOnce(&mut csv::Writer<&mut Vec<u8>>) -> PanelResult<()>,
{
    let mut buf: Vec<u8> = Vec::new();
    {
        let mut wtr = csv::Writer::from_writer(&mut buf);
        write_rows(&mut wtr)?;
        wtr.flush().context(BufferingOutputSnafu {})?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// The canonical table of all the cycles, in year order.
pub fn render_canonical(
    cycles: &[CycleOutput],
    tracked_offices: &[String],
    format: OutputFormat,
    null_token: &str,
) -> PanelResult<String> {
    let num_offices = tracked_offices.len();
    let header = canonical_header(num_offices);
    let rows = cycles.iter().flat_map(|c| c.rows.iter());
    match format {
        OutputFormat::Csv => csv_to_string(|wtr| {
            wtr.write_record(&header).context(CsvWriteSnafu {})?;
            for row in rows {
                let cells: Vec<String> = row_fields(row, num_offices)
                    .iter()
                    .map(|f| match f {
                        Some(f) => f.to_csv(),
                        None => null_token.to_string(),
                    })
                    .collect();
                wtr.write_record(&cells).context(CsvWriteSnafu {})?;
            }
            Ok(())
        }),
        OutputFormat::JsonLines => {
            let mut out = String::new();
            for row in rows {
                let line = CanonicalLine {
                    header: &header,
                    fields: row_fields(row, num_offices),
                };
                out.push_str(&serde_json::to_string(&line).context(WritingJsonSnafu {})?);
                out.push('\n');
            }
            Ok(out)
        }
    }
}

pub fn render_diagnostics(diagnostics: &[Diagnostic]) -> PanelResult<String> {
    csv_to_string(|wtr| {
        wtr.write_record(&["county", "year", "sheet_id", "stage", "error_kind", "message"])
            .context(CsvWriteSnafu {})?;
        for d in diagnostics.iter() {
            wtr.write_record(&[
                d.county.clone().unwrap_or_default(),
                d.year.map(|y| y.to_string()).unwrap_or_default(),
                d.sheet_id.clone().unwrap_or_default(),
                d.stage.label().to_string(),
                d.error_kind.label().to_string(),
                d.message.clone(),
            ])
            .context(CsvWriteSnafu {})?;
        }
        Ok(())
    })
}

fn projects_js(overlay: Option<&SpatialOverlayResult>) -> Option<ProjectsJs> {
    overlay.map(|o| ProjectsJs {
        prior_project_count: o.prior_project_count,
        prior_cumulative_mw: o.prior_cumulative_mw,
        new_project_count: o.new_project_count,
        new_cumulative_mw: o.new_cumulative_mw,
    })
}

fn contest_js<'a>(contest: &'a ContestResult, cycle: &CycleOutput) -> ContestJs<'a> {
    let projects = contest.district.as_ref().and_then(|d| {
        cycle
            .district_overlay
            .get(&precinct_panel::geometry::district_shape_key(&contest.office, d))
            .and_then(|o| o.as_ref())
    });
    ContestJs {
        office: &contest.office,
        district: contest.district.as_deref(),
        total_votes: contest.total_votes,
        winner: contest.winner().map(|w| WinnerJs {
            name: &w.name,
            party: w.party.code(),
        }),
        candidates: contest
            .candidates
            .iter()
            .map(|c| CandidateJs {
                name: &c.name,
                party: c.party.code(),
                votes: c.votes,
                share: c.share,
            })
            .collect(),
        projects: projects_js(projects),
    }
}

pub fn render_district_results(cycles: &[CycleOutput]) -> PanelResult<String> {
    let js: Vec<CycleResultsJs> = cycles
        .iter()
        .map(|c| CycleResultsJs {
            year: c.year,
            unmatched_project_count: c.unmatched_project_count,
            contests: c
                .district_results
                .iter()
                .map(|r| contest_js(r, c))
                .collect(),
        })
        .collect();
    serde_json::to_string_pretty(&js).context(WritingJsonSnafu {})
}
