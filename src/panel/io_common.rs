use crate::panel::*;

/// Relative paths are read from the directory of the configuration file.
pub fn resolve_path(root: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

pub fn fill_pattern(pattern: &str, county: &str, year: Year) -> String {
    pattern
        .replace("{county}", county)
        .replace("{year}", &year.to_string())
}

pub fn write_text(path: &Path, contents: &str) -> PanelResult<()> {
    fs::write(path, contents).context(WritingFileSnafu {
        path: path.display().to_string(),
    })?;
    debug!("write_text: {} bytes to {}", contents.len(), path.display());
    Ok(())
}

/// District numbers are compared without leading zeros.
pub fn district_number(raw: &str) -> String {
    let raw = raw.trim();
    match raw.parse::<u32>() {
        Ok(n) => n.to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Reads an optional numeric CSV field. Empty fields and `NA` are missing values.
pub fn parse_optional<T: std::str::FromStr>(field: &str) -> Result<Option<T>, String> {
    let s = field.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("na") {
        return Ok(None);
    }
    s.parse::<T>()
        .map(Some)
        .map_err(|_| format!("not a number: {:?}", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_and_fields() {
        assert_eq!(fill_pattern("{county}_{year}.xlsx", "Polk", 2018), "Polk_2018.xlsx");
        assert_eq!(parse_optional::<f64>(" 12.5 "), Ok(Some(12.5)));
        assert_eq!(parse_optional::<u64>("NA"), Ok(None));
        assert_eq!(parse_optional::<u64>(""), Ok(None));
        assert!(parse_optional::<u64>("abc").is_err());
        assert_eq!(district_number(" 007"), "7");
        assert_eq!(district_number("At Large"), "At Large");
        assert_eq!(
            resolve_path(Path::new("/data"), "out"),
            PathBuf::from("/data/out")
        );
    }
}
