//! Text matchers built once per run from the `PipelineRules` vocabulary.
//!
//! Every comparison in the pipeline goes through here, so that the same
//! header, office or precinct spelling is always read the same way.

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::config::*;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref DISTRICT: Regex =
        Regex::new(r"(?i)\bdist(?:rict)?\.?\s*(?:no\.?\s*|#\s*)?0*(\d+)").unwrap();
    static ref ORDINAL_DISTRICT: Regex =
        Regex::new(r"(?i)\b0*(\d+)(?:st|nd|rd|th)\s+dist").unwrap();
    static ref NON_ALNUM: Regex = Regex::new(r"[^\p{L}\p{N}]").unwrap();
    static ref NAME_PUNCT: Regex = Regex::new(r"[^\p{L}\p{N}\s']").unwrap();
    static ref PARENTHESIZED: Regex = Regex::new(r"\([^()]*\)").unwrap();
}

/// Lower-case, single-spaced, without a trailing colon.
pub fn normalize_text(s: &str) -> String {
    let lower = s.trim().to_lowercase();
    let collapsed = WHITESPACE.replace_all(&lower, " ");
    collapsed.trim_end_matches(':').trim().to_string()
}

fn alternation(aliases: &[String]) -> String {
    let mut sorted: Vec<String> = aliases.iter().map(|a| normalize_text(a)).collect();
    sorted.retain(|a| !a.is_empty());
    // Longest first, so that "total votes" is preferred over "total".
    sorted.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    sorted.dedup();
    sorted
        .iter()
        .map(|a| regex::escape(a))
        .collect::<Vec<String>>()
        .join("|")
}

fn keyword_regex(aliases: &[String]) -> Result<Option<Regex>, PipelineError> {
    let alt = alternation(aliases);
    if alt.is_empty() {
        return Ok(None);
    }
    let pattern = format!(r"(?i)(?:^|[^\p{{L}}\p{{N}}])(?:{})(?:$|[^\p{{L}}\p{{N}}])", alt);
    Regex::new(&pattern)
        .map(Some)
        .map_err(|e| PipelineError::InvalidRules {
            message: e.to_string(),
        })
}

/// The vote-type tags, in tie-break order: a total always wins.
const TAG_PRIORITY: [VoteColumnTag; 6] = [
    VoteColumnTag::Total,
    VoteColumnTag::InPerson,
    VoteColumnTag::Absentee,
    VoteColumnTag::Early,
    VoteColumnTag::Provisional,
    VoteColumnTag::WriteIn,
];

pub struct Matchers {
    pub rules: PipelineRules,
    // (variant, canonical office), longest variant first
    office_variants: Vec<(String, String)>,
    vote_tags: Vec<(VoteColumnTag, Regex)>,
    vote_suffix: Option<Regex>,
    party_aliases: Vec<(Party, String)>,
    precinct_prefixes: Vec<String>,
    name_affixes: Vec<String>,
}

impl Matchers {
    pub fn new(rules: &PipelineRules) -> Result<Matchers, PipelineError> {
        let mut office_variants: Vec<(String, String)> = Vec::new();
        for (office, variants) in rules.office_aliases.iter() {
            for v in variants.iter() {
                office_variants.push((normalize_text(v), office.clone()));
            }
            // The canonical name is always an accepted variant of itself.
            office_variants.push((normalize_text(office), office.clone()));
        }
        office_variants.retain(|(v, _)| !v.is_empty());
        office_variants.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(&b.0)));
        office_variants.dedup();

        let mut vote_tags: Vec<(VoteColumnTag, Regex)> = Vec::new();
        for tag in TAG_PRIORITY.iter() {
            let aliases: Vec<String> = rules
                .vote_type_aliases
                .iter()
                .filter(|(t, _)| t == tag)
                .flat_map(|(_, a)| a.iter().cloned())
                .collect();
            if let Some(re) = keyword_regex(&aliases)? {
                vote_tags.push((*tag, re));
            }
        }

        let all_vote_aliases: Vec<String> = rules
            .vote_type_aliases
            .iter()
            .flat_map(|(_, a)| a.iter().cloned())
            .collect();
        let suffix_alt = alternation(&all_vote_aliases);
        let vote_suffix = if suffix_alt.is_empty() {
            None
        } else {
            let pattern = format!(r"(?i)^(.*?)[\s\-–—:|]+({})\s*$", suffix_alt);
            Some(Regex::new(&pattern).map_err(|e| PipelineError::InvalidRules {
                message: e.to_string(),
            })?)
        };

        let party_aliases: Vec<(Party, String)> = rules
            .party_aliases
            .iter()
            .flat_map(|(p, aliases)| aliases.iter().map(move |a| (*p, party_text(a))))
            .collect();

        debug!(
            "Matchers::new: {} office variants, {} vote-type tags, {} party aliases",
            office_variants.len(),
            vote_tags.len(),
            party_aliases.len()
        );

        Ok(Matchers {
            rules: rules.clone(),
            office_variants,
            vote_tags,
            vote_suffix,
            party_aliases,
            precinct_prefixes: rules
                .precinct_prefixes
                .iter()
                .map(|p| p.trim().to_uppercase())
                .filter(|p| !p.is_empty())
                .collect(),
            name_affixes: rules
                .name_affixes
                .iter()
                .map(|a| normalize_text(a).replace('.', ""))
                .collect(),
        })
    }

    // ---- Offices ----

    /// The canonical office named by a label, if any.
    pub fn office_for(&self, label: &str) -> Option<String> {
        let text = normalize_text(label);
        if text.is_empty() {
            return None;
        }
        self.office_variants
            .iter()
            .find(|(variant, _)| text.contains(variant.as_str()))
            .map(|(_, office)| office.clone())
    }

    pub fn district_in(&self, label: &str) -> Option<String> {
        DISTRICT
            .captures(label)
            .or_else(|| ORDINAL_DISTRICT.captures(label))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    pub fn slot_index(&self, office: &str) -> Option<usize> {
        self.rules
            .tracked_offices
            .iter()
            .position(|o| normalize_text(o) == normalize_text(office))
    }

    // ---- Vote types ----

    /// The vote-type keyword tag of a text, if it holds one. `Total` wins over the subcategories.
    pub fn vote_tag(&self, text: &str) -> Option<VoteColumnTag> {
        let norm = normalize_text(text);
        self.vote_tags
            .iter()
            .find(|(_, re)| re.is_match(&norm))
            .map(|(tag, _)| *tag)
    }

    /// Splits a trailing vote-type keyword off a header: `"Adair-1NW Total"` -> `("Adair-1NW", Total)`.
    pub fn split_vote_suffix(&self, text: &str) -> (String, Option<VoteColumnTag>) {
        let trimmed = text.trim();
        if let Some(re) = self.vote_suffix.as_ref() {
            if let Some(caps) = re.captures(trimmed) {
                let head = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
                let keyword = caps.get(2).map(|m| m.as_str()).unwrap_or("");
                if !head.is_empty() {
                    return (head.to_string(), self.vote_tag(keyword));
                }
            }
        }
        (trimmed.to_string(), None)
    }

    // ---- Parties ----

    pub fn party_for(&self, code: &str) -> Party {
        let text = party_text(code);
        if text.is_empty() {
            return Party::Other;
        }
        if let Some((p, _)) = self.party_aliases.iter().find(|(_, a)| *a == text) {
            return *p;
        }
        // Long forms such as "Democratic-Farmer-Labor" or "The Republican Party".
        let words: Vec<&str> = NON_ALNUM
            .split(&text)
            .filter(|w| !w.is_empty())
            .collect();
        self.party_aliases
            .iter()
            .find(|(_, a)| a.len() >= 3 && !a.contains(' ') && words.contains(&a.as_str()))
            .map(|(p, _)| *p)
            .unwrap_or(Party::Other)
    }

    // ---- Labels ----

    fn is_one_of(text: &str, list: &[String]) -> bool {
        let norm = normalize_text(text);
        !norm.is_empty() && list.iter().any(|l| normalize_text(l) == norm)
    }

    pub fn is_precinct_label(&self, text: &str) -> bool {
        Self::is_one_of(text, &self.rules.precinct_labels)
    }

    pub fn is_candidate_label(&self, text: &str) -> bool {
        Self::is_one_of(text, &self.rules.candidate_labels)
    }

    pub fn is_party_label(&self, text: &str) -> bool {
        Self::is_one_of(text, &self.rules.party_labels)
    }

    pub fn is_race_label(&self, text: &str) -> bool {
        Self::is_one_of(text, &self.rules.race_labels)
    }

    pub fn is_total_label(&self, text: &str) -> bool {
        Self::is_one_of(text, &self.rules.total_row_labels)
    }

    pub fn is_ignored_label(&self, text: &str) -> bool {
        Self::is_one_of(text, &self.rules.ignored_labels)
    }

    pub fn is_toc_label(&self, text: &str) -> bool {
        Self::is_one_of(text, &self.rules.toc_labels)
    }

    pub fn is_non_contest_label(&self, text: &str) -> bool {
        let norm = normalize_text(text);
        !norm.is_empty()
            && self
                .rules
                .non_contest_labels
                .iter()
                .map(|l| normalize_text(l))
                .any(|l| !l.is_empty() && norm.contains(l.as_str()))
    }

    pub fn is_write_in(&self, text: &str) -> bool {
        self.vote_tag(text) == Some(VoteColumnTag::WriteIn)
    }

    // ---- Identities ----

    /// The precinct identity used for merging: upper-case, single-spaced, without the
    /// county prefix and the configured ward/township prefixes.
    pub fn normalize_precinct(&self, raw: &str, county: &str) -> String {
        let mut id = WHITESPACE
            .replace_all(raw.trim(), " ")
            .to_uppercase()
            .to_string();
        let county_up = county.trim().to_uppercase();
        if !county_up.is_empty() {
            for sep in [" - ", "-", " "].iter() {
                let prefix = format!("{}{}", county_up, sep);
                if id.starts_with(&prefix) && id.len() > prefix.len() {
                    id = id[prefix.len()..].trim().to_string();
                    break;
                }
            }
        }
        for prefix in self.precinct_prefixes.iter() {
            if let Some(rest) = id.strip_prefix(prefix.as_str()) {
                let rest = rest.trim_start_matches(|c: char| {
                    c.is_whitespace() || c == '.' || c == '#' || c == ':' || c == '-'
                });
                // Only strip a whole word, and never down to nothing.
                let at_boundary = id.len() > prefix.len()
                    && !id[prefix.len()..].starts_with(|c: char| c.is_alphanumeric());
                if at_boundary && !rest.is_empty() {
                    id = rest.to_string();
                }
            }
        }
        id
    }

    /// Alphanumeric skeleton of a normalized precinct id, used to spot spelling variants.
    pub fn precinct_skeleton(&self, id: &str) -> String {
        NON_ALNUM.replace_all(&id.to_uppercase(), "").to_string()
    }

    /// Key used to compare candidate names reported by different sheets.
    pub fn candidate_key(&self, name: &str) -> String {
        WHITESPACE
            .replace_all(name.trim(), " ")
            .to_uppercase()
            .to_string()
    }

    /// Key used to compare people across cycles: running mates, party codes,
    /// titles, suffixes and middle initials are dropped.
    pub fn person_key(&self, name: &str) -> String {
        let head = name.split(['/', '&']).next().unwrap_or("");
        let without_parens = PARENTHESIZED.replace_all(head, " ");
        let lower = without_parens.to_lowercase();
        let cleaned = NAME_PUNCT.replace_all(&lower, " ").replace('\'', "");
        cleaned
            .split_whitespace()
            .filter(|w| w.chars().count() > 1)
            .filter(|w| !self.name_affixes.iter().any(|a| a == w))
            .collect::<Vec<&str>>()
            .join(" ")
    }
}

fn party_text(code: &str) -> String {
    normalize_text(code).replace('.', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matchers() -> Matchers {
        Matchers::new(&PipelineRules::default()).unwrap()
    }

    #[test]
    fn offices_prefer_the_longest_variant() {
        let m = matchers();
        assert_eq!(m.office_for("U.S. Senator"), Some("US Senate".to_string()));
        assert_eq!(
            m.office_for("State Senator Dist. 12"),
            Some("State Senate".to_string())
        );
        assert_eq!(
            m.office_for("United States Representative District 3"),
            Some("US House".to_string())
        );
        assert_eq!(
            m.office_for("President and Vice President"),
            Some("President".to_string())
        );
        assert_eq!(m.office_for("County Recorder"), None);
    }

    #[test]
    fn districts_are_read_from_labels() {
        let m = matchers();
        assert_eq!(m.district_in("State Senator Dist. 07"), Some("7".to_string()));
        assert_eq!(m.district_in("State Rep District 45"), Some("45".to_string()));
        assert_eq!(m.district_in("U.S. Rep. 3rd District"), Some("3".to_string()));
        assert_eq!(m.district_in("Governor"), None);
    }

    #[test]
    fn total_wins_over_subcategories() {
        let m = matchers();
        assert_eq!(m.vote_tag("Total Votes"), Some(VoteColumnTag::Total));
        assert_eq!(m.vote_tag("Absentee Total"), Some(VoteColumnTag::Total));
        assert_eq!(m.vote_tag("Election Day"), Some(VoteColumnTag::InPerson));
        assert_eq!(m.vote_tag("Email"), None);
    }

    #[test]
    fn vote_suffix_is_split_from_precinct_headers() {
        let m = matchers();
        assert_eq!(
            m.split_vote_suffix("Adair-1NW Total"),
            ("Adair-1NW".to_string(), Some(VoteColumnTag::Total))
        );
        assert_eq!(
            m.split_vote_suffix(" Adair-1NW Absentee"),
            ("Adair-1NW".to_string(), Some(VoteColumnTag::Absentee))
        );
        assert_eq!(m.split_vote_suffix("Adair-1NW"), ("Adair-1NW".to_string(), None));
        assert_eq!(m.split_vote_suffix("Total"), ("Total".to_string(), None));
    }

    #[test]
    fn parties_resolve_through_aliases() {
        let m = matchers();
        assert_eq!(m.party_for("D"), Party::Democratic);
        assert_eq!(m.party_for("Republican Party"), Party::Republican);
        assert_eq!(m.party_for("Dem."), Party::Democratic);
        assert_eq!(m.party_for("Democratic-Farmer-Labor"), Party::Democratic);
        assert_eq!(m.party_for("LIB"), Party::Other);
        assert_eq!(m.party_for("Libertarian Party"), Party::Other);
    }

    #[test]
    fn precinct_prefixes_are_stripped() {
        let m = matchers();
        assert_eq!(m.normalize_precinct("  Ward 1 ", "Polk"), "1");
        assert_eq!(m.normalize_precinct("Polk-Ward  3", "Polk"), "3");
        assert_eq!(m.normalize_precinct("Adair-1NW", "Adair"), "1NW");
        assert_eq!(m.normalize_precinct("Twp. Grant", "Adair"), "GRANT");
        assert_eq!(m.normalize_precinct("Wardell", "Adair"), "WARDELL");
        assert_eq!(m.normalize_precinct("Ward", "Adair"), "WARD");
        assert_eq!(m.precinct_skeleton("1-NW"), m.precinct_skeleton("1 NW"));
    }

    #[test]
    fn person_keys_drop_titles_and_running_mates() {
        let m = matchers();
        assert_eq!(
            m.person_key("Kim Reynolds / Adam Gregg"),
            m.person_key("KIM REYNOLDS")
        );
        assert_eq!(m.person_key("Rep. John Q. Smith Jr."), "john smith");
        assert_eq!(m.person_key("Smith (D)"), "smith");
    }
}
