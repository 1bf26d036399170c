// District demographics, read from a CSV table.

use std::collections::HashMap;

use precinct_panel::collaborators::DemographicSource;

use crate::panel::io_common::{district_number, parse_optional};
use crate::panel::*;

/// `district,year,avg_income,minority_share,population`
pub struct CsvDemographics {
    table: HashMap<(String, Year), Demographics>,
}

impl DemographicSource for CsvDemographics {
    fn lookup(&self, district: &str, year: Year) -> Option<Demographics> {
        self.table.get(&(district_number(district), year)).cloned()
    }
}

pub fn parse_demographics<R: std::io::Read>(rdr: R, path: &str) -> BPanelResult<CsvDemographics> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(rdr);
    let mut table: HashMap<(String, Year), Demographics> = HashMap::new();
    for (i, line_r) in reader.records().enumerate() {
        let lineno = (i + 2) as u64;
        let line = line_r.context(CsvLineParseSnafu { path, lineno })?;
        let field = |idx: usize| line.get(idx).unwrap_or("").trim();
        let wrong = |idx: usize, column: &str| PanelError::CsvWrongValue {
            path: path.to_string(),
            lineno,
            column: column.to_string(),
            value: field(idx).to_string(),
        };
        let district = district_number(field(0));
        let year = field(1).parse::<Year>().map_err(|_| wrong(1, "year"))?;
        let demographics = Demographics {
            avg_income: parse_optional::<f64>(field(2)).map_err(|_| wrong(2, "avg_income"))?,
            minority_share: parse_optional::<f64>(field(3)).map_err(|_| wrong(3, "minority_share"))?,
            population: parse_optional::<u64>(field(4)).map_err(|_| wrong(4, "population"))?,
        };
        if table.insert((district.clone(), year), demographics).is_some() {
            warn!(
                "parse_demographics: {}: district {} {} listed twice, last line kept",
                path, district, year
            );
        }
    }
    info!("parse_demographics: {}: {} districts", path, table.len());
    Ok(CsvDemographics { table })
}

pub fn read_demographics(p: &Path) -> BPanelResult<CsvDemographics> {
    let path = p.display().to_string();
    let file = fs::File::open(p).context(OpeningFileSnafu { path: path.clone() })?;
    parse_demographics(file, &path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_by_district_and_year() {
        let contents = "\
district,year,avg_income,minority_share,population
07,2018,61000.5,0.12,60100
8,2018,,NA,
";
        let d = parse_demographics(contents.as_bytes(), "demographics.csv").unwrap();
        let seven = d.lookup("7", 2018).unwrap();
        assert_eq!(seven.avg_income, Some(61000.5));
        assert_eq!(seven.population, Some(60100));
        assert_eq!(d.lookup("8", 2018), Some(Demographics::default()));
        assert_eq!(d.lookup("7", 2016), None);
        assert_eq!(d.lookup("9", 2018), None);
    }

    #[test]
    fn bad_years_are_rejected() {
        let contents = "district,year,avg_income,minority_share,population\n7,later,1,0.1,10\n";
        assert!(parse_demographics(contents.as_bytes(), "demographics.csv").is_err());
    }
}
