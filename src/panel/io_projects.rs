// The renewable facility inventory.

use std::collections::HashMap;

use precinct_panel::geometry::{Coord, Geometry};

use crate::panel::io_common::parse_optional;
use crate::panel::*;

const COLUMNS: [&str; 6] = [
    "project_id",
    "technology",
    "capacity_mw",
    "commissioned_year",
    "latitude",
    "longitude",
];

fn read_technology(s: &str) -> Option<Technology> {
    match s.trim().to_lowercase().as_str() {
        "wind" | "onshore wind" => Some(Technology::Wind),
        "solar" | "solar pv" | "pv" => Some(Technology::Solar),
        _ => None,
    }
}

/// Column name -> index, for the columns of the inventory.
fn column_indexes(headers: &csv::StringRecord, path: &str) -> PanelResult<HashMap<&'static str, usize>> {
    let mut indexes: HashMap<&'static str, usize> = HashMap::new();
    for name in COLUMNS.iter() {
        match headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name)) {
            Some(idx) => {
                indexes.insert(*name, idx);
            }
            None => whatever!("{}: missing column {}", path, name),
        }
    }
    Ok(indexes)
}

pub fn parse_projects<R: std::io::Read>(rdr: R, path: &str) -> BPanelResult<Vec<RenewableProject>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(rdr);
    let headers = reader
        .headers()
        .context(CsvOpenSnafu { path })?
        .clone();
    let idx = column_indexes(&headers, path)?;

    let mut res: Vec<RenewableProject> = Vec::new();
    for (i, line_r) in reader.records().enumerate() {
        // The header is line 1.
        let lineno = (i + 2) as u64;
        let line = line_r.context(CsvLineParseSnafu { path, lineno })?;
        let field = |name: &str| line.get(idx[name]).unwrap_or("").trim().to_string();
        let wrong = |column: &str| PanelError::CsvWrongValue {
            path: path.to_string(),
            lineno,
            column: column.to_string(),
            value: field(column),
        };

        let technology = read_technology(&field("technology")).ok_or_else(|| wrong("technology"))?;
        let capacity_mw = field("capacity_mw")
            .parse::<f64>()
            .ok()
            .filter(|mw| mw.is_finite() && *mw >= 0.0)
            .ok_or_else(|| wrong("capacity_mw"))?;
        let commissioned_year = field("commissioned_year")
            .parse::<Year>()
            .map_err(|_| wrong("commissioned_year"))?;
        let latitude = parse_optional::<f64>(&field("latitude")).map_err(|_| wrong("latitude"))?;
        let longitude = parse_optional::<f64>(&field("longitude")).map_err(|_| wrong("longitude"))?;
        let location = match (latitude, longitude) {
            (Some(lat), Some(lon)) => Some(Geometry::Point(Coord::new(lon, lat))),
            _ => None,
        };
        res.push(RenewableProject {
            project_id: field("project_id"),
            technology,
            capacity_mw,
            commissioned_year,
            location,
        });
    }
    info!("parse_projects: {}: {} projects", path, res.len());
    Ok(res)
}

pub fn read_projects(p: &Path) -> BPanelResult<Vec<RenewableProject>> {
    let path = p.display().to_string();
    let file = fs::File::open(p).context(OpeningFileSnafu { path: path.clone() })?;
    parse_projects(file, &path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_rows() {
        let contents = "\
project_id,technology,capacity_mw,commissioned_year,latitude,longitude
w1,Wind,150.5,2017,41.6,-93.6
s1,solar,5,2012,,
";
        let projects = parse_projects(contents.as_bytes(), "projects.csv").unwrap();
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].technology, Technology::Wind);
        assert_eq!(projects[0].capacity_mw, 150.5);
        assert_eq!(
            projects[0].location,
            Some(Geometry::Point(Coord::new(-93.6, 41.6)))
        );
        assert_eq!(projects[1].location, None);
        assert_eq!(projects[1].commissioned_year, 2012);
    }

    #[test]
    fn bad_rows_are_reported_with_their_line() {
        let contents = "\
project_id,technology,capacity_mw,commissioned_year,latitude,longitude
w1,wind,150,2017,41.6,-93.6
h1,hydro,20,2015,41.0,-93.0
";
        let err = parse_projects(contents.as_bytes(), "projects.csv").unwrap_err();
        assert!(matches!(*err, PanelError::CsvWrongValue { lineno: 3, .. }));

        let missing = "project_id,capacity_mw\nw1,3\n";
        assert!(parse_projects(missing.as_bytes(), "projects.csv").is_err());
    }
}
