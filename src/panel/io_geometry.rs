// Boundary vintages read from GeoJSON feature collections.

use precinct_panel::collaborators::BoundarySource;
use precinct_panel::geometry::{
    district_shape_key, precinct_shape_key, BoundaryKind, BoundarySet, Coord, Geometry, Polygon,
};
use serde_json::Value as JSValue;
use std::collections::BTreeMap;

use crate::panel::io_common::district_number;
use crate::panel::*;

const EXTENSION: &str = ".geojson";

fn read_coord(js: &JSValue) -> Option<Coord> {
    let xy = js.as_array()?;
    match (xy.get(0).and_then(|v| v.as_f64()), xy.get(1).and_then(|v| v.as_f64())) {
        (Some(x), Some(y)) => Some(Coord::new(x, y)),
        _ => None,
    }
}

fn read_ring(js: &JSValue) -> Option<Vec<Coord>> {
    js.as_array()?.iter().map(read_coord).collect()
}

fn read_polygon(js: &JSValue) -> Option<Polygon> {
    let rings: Vec<Vec<Coord>> = js.as_array()?.iter().map(read_ring).collect::<Option<_>>()?;
    let mut iter = rings.into_iter();
    let exterior = iter.next()?;
    Some(Polygon {
        exterior,
        holes: iter.collect(),
    })
}

/// Reads a GeoJSON geometry object. Only points and (multi)polygons are supported.
pub fn read_geometry(js: &JSValue) -> Option<Geometry> {
    let coordinates = js.get("coordinates")?;
    match js.get("type")?.as_str()? {
        "Point" => read_coord(coordinates).map(Geometry::Point),
        "Polygon" => read_polygon(coordinates).map(Geometry::Polygon),
        "MultiPolygon" => coordinates
            .as_array()?
            .iter()
            .map(read_polygon)
            .collect::<Option<Vec<Polygon>>>()
            .map(Geometry::MultiPolygon),
        _ => None,
    }
}

fn property(feature: &JSValue, name: &str) -> Option<String> {
    match feature.get("properties")?.get(name)? {
        JSValue::String(s) => Some(s.trim().to_string()),
        JSValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn shape_key(feature: &JSValue, kind: BoundaryKind, matchers: &Matchers) -> Option<String> {
    let id = property(feature, "id")?;
    match kind {
        BoundaryKind::Precinct => {
            let county = property(feature, "county")?;
            Some(precinct_shape_key(
                &county,
                &matchers.normalize_precinct(&id, &county),
            ))
        }
        BoundaryKind::District => {
            let label = property(feature, "office")?;
            let office = matchers.office_for(&label).unwrap_or(label);
            Some(district_shape_key(&office, &district_number(&id)))
        }
    }
}

pub fn parse_feature_collection(
    contents: &str,
    path: &str,
    kind: BoundaryKind,
    year: Year,
    matchers: &Matchers,
) -> PanelResult<BoundarySet> {
    let js: JSValue = serde_json::from_str(contents).context(ParsingJsonSnafu { path })?;
    let features = match js.get("features").and_then(|f| f.as_array()) {
        Some(f) => f,
        None => {
            return Err(PanelError::InvalidGeometry {
                path: path.to_string(),
                message: "no features array".to_string(),
            })
        }
    };
    let mut shapes: BTreeMap<String, Geometry> = BTreeMap::new();
    for (idx, feature) in features.iter().enumerate() {
        let key = match shape_key(feature, kind, matchers) {
            Some(k) => k,
            None => {
                warn!("parse_feature_collection: {}: feature {} has no usable id", path, idx);
                continue;
            }
        };
        let geometry = feature.get("geometry").and_then(read_geometry);
        match geometry {
            Some(g) if g.is_valid() && !matches!(g, Geometry::Point(_)) => {
                if shapes.insert(key.clone(), g).is_some() {
                    warn!("parse_feature_collection: {}: duplicate shape {:?}, last one kept", path, key);
                }
            }
            _ => warn!(
                "parse_feature_collection: {}: feature {:?} has no valid polygon",
                path, key
            ),
        }
    }
    debug!(
        "parse_feature_collection: {}: {} shapes out of {} features",
        path,
        shapes.len(),
        features.len()
    );
    Ok(BoundarySet { kind, year, shapes })
}

/// Reads `<directory>/<kind>_<year>.geojson`.
pub struct FileBoundarySource<'a> {
    directory: PathBuf,
    matchers: &'a Matchers,
}

impl<'a> FileBoundarySource<'a> {
    pub fn new(directory: &Path, matchers: &'a Matchers) -> FileBoundarySource<'a> {
        FileBoundarySource {
            directory: directory.to_path_buf(),
            matchers,
        }
    }

    /// The years for which a file of this kind is present.
    pub fn available_years(&self, kind: BoundaryKind) -> Vec<Year> {
        let prefix = format!("{}_", kind.label());
        let entries = match fs::read_dir(&self.directory) {
            Ok(e) => e,
            Err(e) => {
                warn!(
                    "available_years: cannot list {}: {}",
                    self.directory.display(),
                    e
                );
                return Vec::new();
            }
        };
        let mut years: Vec<Year> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().map(|s| s.to_string()))
            .filter_map(|name| {
                name.strip_prefix(&prefix)?
                    .strip_suffix(EXTENSION)?
                    .parse::<Year>()
                    .ok()
            })
            .collect();
        years.sort_unstable();
        years
    }

    fn read_set(&self, kind: BoundaryKind, year: Year) -> PanelResult<Option<BoundarySet>> {
        let p = self
            .directory
            .join(format!("{}_{}{}", kind.label(), year, EXTENSION));
        if !p.exists() {
            return Ok(None);
        }
        let path = p.display().to_string();
        let contents = fs::read_to_string(&p).context(OpeningFileSnafu { path: path.clone() })?;
        parse_feature_collection(&contents, &path, kind, year, self.matchers).map(Some)
    }
}

impl<'a> BoundarySource for FileBoundarySource<'a> {
    fn boundaries(&self, kind: BoundaryKind, year: Year) -> Option<BoundarySet> {
        match self.read_set(kind, year) {
            Ok(set) => set,
            Err(e) => {
                warn!("boundaries: {} {} skipped: {}", kind.label(), year, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matchers() -> Matchers {
        Matchers::new(&PipelineRules::default()).unwrap()
    }

    const PRECINCTS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "county": "Polk", "id": "Ward 1" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 1], [0, 0]]]
                }
            },
            {
                "type": "Feature",
                "properties": { "county": "Polk", "id": "Ward 2" },
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [
                        [[[1, 0], [2, 0], [2, 1], [1, 1], [1, 0]]],
                        [[[5, 5], [6, 5], [6, 6], [5, 5]]]
                    ]
                }
            },
            {
                "type": "Feature",
                "properties": { "county": "Polk" },
                "geometry": { "type": "Point", "coordinates": [0.5, 0.5] }
            },
            {
                "type": "Feature",
                "properties": { "county": "Polk", "id": "Ward 3" },
                "geometry": { "type": "Polygon", "coordinates": [[[0, 0], [1, 1], [2, 2]]] }
            }
        ]
    }"#;

    #[test]
    fn precinct_features_are_keyed_by_normalized_id() {
        let m = matchers();
        let set = parse_feature_collection(PRECINCTS, "precinct_2012.geojson", BoundaryKind::Precinct, 2012, &m)
            .unwrap();
        let keys: Vec<&String> = set.shapes.keys().collect();
        assert_eq!(keys, vec!["POLK/1", "POLK/2"]);
        assert!(set.shapes["POLK/2"].contains_point(Coord::new(5.2, 5.1)));
        assert!(!set.shapes["POLK/1"].contains_point(Coord::new(1.5, 0.5)));
    }

    #[test]
    fn district_features_are_keyed_by_office() {
        let m = matchers();
        let contents = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": { "office": "State Senator", "id": "07" },
                    "geometry": { "type": "Polygon", "coordinates": [[[0, 0], [4, 0], [4, 4], [0, 4]]] }
                }
            ]
        }"#;
        let set = parse_feature_collection(contents, "district_2012.geojson", BoundaryKind::District, 2012, &m)
            .unwrap();
        assert!(set.shapes.contains_key("State Senate/7"));
        assert!(parse_feature_collection("{}", "bad.geojson", BoundaryKind::District, 2012, &m).is_err());
    }
}
