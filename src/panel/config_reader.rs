use crate::panel::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum OutputFormat {
    Csv,
    JsonLines,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::JsonLines => "jsonl",
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
    pub format: Option<String>,
    #[serde(rename = "nullToken")]
    pub null_token: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    pub counties: Vec<String>,
    pub years: Vec<Year>,
    #[serde(rename = "workbookDirectory")]
    pub workbook_directory: String,
    /// With `{county}` and `{year}` placeholders.
    #[serde(rename = "fileNamePattern")]
    pub file_name_pattern: Option<String>,
    #[serde(rename = "fetchRetries")]
    pub fetch_retries: Option<u32>,
    #[serde(rename = "boundaryDirectory")]
    pub boundary_directory: Option<String>,
    #[serde(rename = "projectsFile")]
    pub projects_file: Option<String>,
    #[serde(rename = "demographicsFile")]
    pub demographics_file: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OfficeSettings {
    pub tracked: Option<Vec<String>>,
    pub aliases: Option<BTreeMap<String, Vec<String>>>,
    #[serde(rename = "districtOffice")]
    pub district_office: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationSettings {
    #[serde(rename = "voteTypes")]
    pub vote_types: Option<BTreeMap<String, Vec<String>>>,
    pub parties: Option<BTreeMap<String, Vec<String>>>,
    #[serde(rename = "precinctLabels")]
    pub precinct_labels: Option<Vec<String>>,
    #[serde(rename = "candidateLabels")]
    pub candidate_labels: Option<Vec<String>>,
    #[serde(rename = "partyLabels")]
    pub party_labels: Option<Vec<String>>,
    #[serde(rename = "raceLabels")]
    pub race_labels: Option<Vec<String>>,
    #[serde(rename = "nonContestLabels")]
    pub non_contest_labels: Option<Vec<String>>,
    #[serde(rename = "tocLabels")]
    pub toc_labels: Option<Vec<String>>,
    #[serde(rename = "totalRowLabels")]
    pub total_row_labels: Option<Vec<String>>,
    #[serde(rename = "ignoredLabels")]
    pub ignored_labels: Option<Vec<String>>,
    #[serde(rename = "precinctPrefixes")]
    pub precinct_prefixes: Option<Vec<String>>,
    #[serde(rename = "nameAffixes")]
    pub name_affixes: Option<Vec<String>>,
    #[serde(rename = "headerScanRows")]
    pub header_scan_rows: Option<usize>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: Option<OutputSettings>,
    pub sources: SourceSettings,
    pub offices: Option<OfficeSettings>,
    pub classification: Option<ClassificationSettings>,
    #[serde(rename = "maxWorkers")]
    pub max_workers: Option<usize>,
}

fn read_vote_tag(key: &str) -> PanelResult<VoteColumnTag> {
    let tag = match key {
        "total" => VoteColumnTag::Total,
        "inPerson" => VoteColumnTag::InPerson,
        "absentee" => VoteColumnTag::Absentee,
        "early" => VoteColumnTag::Early,
        "provisional" => VoteColumnTag::Provisional,
        "writeIn" => VoteColumnTag::WriteIn,
        x => whatever!("unknown vote type in voteTypes: {:?}", x),
    };
    Ok(tag)
}

fn read_party(key: &str) -> PanelResult<Party> {
    match key {
        "D" => Ok(Party::Democratic),
        "R" => Ok(Party::Republican),
        x => whatever!("unknown party code in parties: {:?} (expected D or R)", x),
    }
}

fn replace(target: &mut Vec<String>, value: &Option<Vec<String>>) {
    if let Some(v) = value {
        *target = v.clone();
    }
}

impl PanelConfig {
    /// The rules of the run: the built-in defaults, overridden list by list.
    pub fn rules(&self) -> PanelResult<PipelineRules> {
        let mut rules = PipelineRules::default();
        if let Some(offices) = self.offices.as_ref() {
            replace(&mut rules.tracked_offices, &offices.tracked);
            if let Some(aliases) = offices.aliases.as_ref() {
                for (office, variants) in aliases.iter() {
                    rules.office_aliases.retain(|(o, _)| o != office);
                    rules.office_aliases.push((office.clone(), variants.clone()));
                }
            }
            if offices.district_office.is_some() {
                rules.district_office = offices.district_office.clone();
            }
        }
        if let Some(district_office) = rules.district_office.as_ref() {
            if !rules.tracked_offices.contains(district_office) {
                whatever!(
                    "districtOffice {:?} is not a tracked office",
                    district_office
                )
            }
        }
        if rules.tracked_offices.is_empty() {
            whatever!("no tracked office")
        }

        if let Some(c) = self.classification.as_ref() {
            if let Some(vote_types) = c.vote_types.as_ref() {
                for (key, aliases) in vote_types.iter() {
                    let tag = read_vote_tag(key)?;
                    rules.vote_type_aliases.retain(|(t, _)| *t != tag);
                    rules.vote_type_aliases.push((tag, aliases.clone()));
                }
            }
            if let Some(parties) = c.parties.as_ref() {
                for (key, aliases) in parties.iter() {
                    let party = read_party(key)?;
                    rules.party_aliases.retain(|(p, _)| *p != party);
                    rules.party_aliases.push((party, aliases.clone()));
                }
            }
            replace(&mut rules.precinct_labels, &c.precinct_labels);
            replace(&mut rules.candidate_labels, &c.candidate_labels);
            replace(&mut rules.party_labels, &c.party_labels);
            replace(&mut rules.race_labels, &c.race_labels);
            replace(&mut rules.non_contest_labels, &c.non_contest_labels);
            replace(&mut rules.toc_labels, &c.toc_labels);
            replace(&mut rules.total_row_labels, &c.total_row_labels);
            replace(&mut rules.ignored_labels, &c.ignored_labels);
            replace(&mut rules.precinct_prefixes, &c.precinct_prefixes);
            replace(&mut rules.name_affixes, &c.name_affixes);
            if let Some(n) = c.header_scan_rows {
                rules.header_scan_rows = n;
            }
        }
        debug!("PanelConfig::rules: {:?}", rules);
        Ok(rules)
    }

    /// The format of the canonical table. The command line wins over the configuration.
    pub fn output_format(&self, requested: Option<&str>) -> PanelResult<OutputFormat> {
        let configured = self
            .output_settings
            .as_ref()
            .and_then(|o| o.format.as_deref());
        match requested.or(configured) {
            None | Some("csv") => Ok(OutputFormat::Csv),
            Some("jsonl") | Some("json") => Ok(OutputFormat::JsonLines),
            Some(x) => whatever!("unknown output format: {:?}", x),
        }
    }

    pub fn null_token(&self) -> String {
        self.output_settings
            .as_ref()
            .and_then(|o| o.null_token.clone())
            .unwrap_or_else(|| "NA".to_string())
    }

    pub fn output_directory(&self) -> Option<String> {
        self.output_settings
            .as_ref()
            .and_then(|o| o.output_directory.clone())
    }
}

pub fn parse_config(contents: &str, path: &str) -> PanelResult<PanelConfig> {
    let config: PanelConfig = serde_json::from_str(contents).context(ParsingJsonSnafu { path })?;
    if config.sources.years.is_empty() || config.sources.counties.is_empty() {
        whatever!("{}: the sources need at least one county and one year", path)
    }
    Ok(config)
}

pub fn read_config(path: &str) -> PanelResult<PanelConfig> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    parse_config(&contents, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "sources": {
            "counties": ["Polk"],
            "years": [2016, 2018],
            "workbookDirectory": "workbooks"
        }
    }"#;

    #[test]
    fn minimal_configuration_uses_defaults() {
        let config = parse_config(MINIMAL, "minimal.json").unwrap();
        assert_eq!(config.rules().unwrap(), PipelineRules::default());
        assert_eq!(config.output_format(None).unwrap(), OutputFormat::Csv);
        assert_eq!(config.output_format(Some("jsonl")).unwrap(), OutputFormat::JsonLines);
        assert_eq!(config.null_token(), "NA");
        assert_eq!(config.max_workers, None);
    }

    #[test]
    fn lists_override_defaults() {
        let contents = r#"{
            "outputSettings": { "format": "jsonl", "nullToken": "" },
            "sources": {
                "counties": ["Polk", "Story"],
                "years": [2018],
                "workbookDirectory": "workbooks",
                "fileNamePattern": "{county}-{year}.xls"
            },
            "offices": {
                "tracked": ["Governor", "State House"],
                "aliases": { "Governor": ["gov"] },
                "districtOffice": "State House"
            },
            "classification": {
                "voteTypes": { "absentee": ["mail ballots"] },
                "parties": { "D": ["dfl"] },
                "precinctPrefixes": ["ward"],
                "headerScanRows": 10
            },
            "maxWorkers": 2
        }"#;
        let config = parse_config(contents, "full.json").unwrap();
        let rules = config.rules().unwrap();
        assert_eq!(rules.tracked_offices, vec!["Governor", "State House"]);
        assert_eq!(rules.district_office.as_deref(), Some("State House"));
        assert!(rules
            .office_aliases
            .contains(&("Governor".to_string(), vec!["gov".to_string()])));
        assert!(rules
            .vote_type_aliases
            .contains(&(VoteColumnTag::Absentee, vec!["mail ballots".to_string()])));
        assert!(rules
            .party_aliases
            .contains(&(Party::Democratic, vec!["dfl".to_string()])));
        assert_eq!(rules.precinct_prefixes, vec!["ward"]);
        assert_eq!(rules.header_scan_rows, 10);
        assert_eq!(config.output_format(None).unwrap(), OutputFormat::JsonLines);
        assert_eq!(config.null_token(), "");
        assert_eq!(config.max_workers, Some(2));
    }

    #[test]
    fn bad_configurations_are_rejected() {
        let bad_office = MINIMAL.replace(
            "\"sources\"",
            "\"offices\": { \"tracked\": [\"Governor\"], \"districtOffice\": \"State Senate\" }, \"sources\"",
        );
        let config = parse_config(&bad_office, "bad.json").unwrap();
        assert!(config.rules().is_err());

        let bad_party = MINIMAL.replace(
            "\"sources\"",
            "\"classification\": { \"parties\": { \"L\": [\"lib\"] } }, \"sources\"",
        );
        let config = parse_config(&bad_party, "bad.json").unwrap();
        assert!(config.rules().is_err());

        let config = parse_config(MINIMAL, "minimal.json").unwrap();
        assert!(config.output_format(Some("xml")).is_err());
        assert!(parse_config("{}", "empty.json").is_err());
    }
}
