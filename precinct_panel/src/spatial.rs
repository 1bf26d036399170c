// Spatial overlay: renewable projects counted per geography and cycle window.

use std::collections::BTreeMap;

use log::{debug, info};
use rayon::prelude::*;

use crate::config::*;
use crate::geometry::{split_district_key, BoundaryHistory, BoundaryKind, Geometry};

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Window {
    Prior,
    New,
}

/// The window of a commissioning year for a cycle pair, if any.
///
/// Prior: at or before the previous cycle. New: strictly between the two cycles.
/// Without a previous cycle everything before the current cycle is prior.
pub fn window_of(year: Year, pair: CyclePair) -> Option<Window> {
    match pair.previous {
        Some(previous) if year <= previous => Some(Window::Prior),
        Some(_) if year < pair.current => Some(Window::New),
        Some(_) => None,
        None if year < pair.current => Some(Window::Prior),
        None => None,
    }
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct OverlayReport {
    /// Geography id -> counts. `None` for geographies without boundary data.
    pub results: BTreeMap<String, Option<SpatialOverlayResult>>,
    pub unmatched_project_count: u32,
    pub diagnostics: Vec<Diagnostic>,
}

enum Placement {
    Matched(Vec<String>),
    Unmatched(String),
    Outside,
}

/// Geographies of one layer tile the territory: all the precincts, or the districts
/// of one office.
fn layer_of(kind: BoundaryKind, id: &str) -> &str {
    match kind {
        BoundaryKind::Precinct => "",
        BoundaryKind::District => split_district_key(id).map(|(office, _)| office).unwrap_or(""),
    }
}

fn place(project: &RenewableProject, boundaries: &BoundaryHistory) -> Placement {
    let location = match project.location.as_ref() {
        Some(g) if g.is_valid() => g,
        Some(_) => return Placement::Unmatched("degenerate geometry".to_string()),
        None => return Placement::Unmatched("no location".to_string()),
    };
    let vintage = match boundaries.vintage_for(project.commissioned_year) {
        Some(v) => v,
        None => return Placement::Outside,
    };
    let hits: Vec<String> = vintage
        .shapes
        .iter()
        .filter(|(_, shape)| shape.intersects(location))
        .map(|(id, _)| id.clone())
        .collect();
    let is_point = matches!(location, Geometry::Point(_));
    if is_point {
        // The districts of different offices overlap; a point is ambiguous only
        // within one office.
        let mut per_layer: BTreeMap<&str, usize> = BTreeMap::new();
        for id in hits.iter() {
            *per_layer.entry(layer_of(boundaries.kind, id)).or_insert(0) += 1;
        }
        if let Some((layer, count)) = per_layer.iter().find(|(_, count)| **count > 1) {
            return Placement::Unmatched(format!(
                "location matches {} {} geographies{} of the {} vintage",
                count,
                boundaries.kind.label(),
                if layer.is_empty() {
                    String::new()
                } else {
                    format!(" of {}", layer)
                },
                vintage.year
            ));
        }
    }
    if hits.is_empty() {
        Placement::Outside
    } else {
        Placement::Matched(hits)
    }
}

/// Counts the projects of each geography for one cycle pair.
///
/// A project is located in the boundary vintage in force when it was commissioned.
/// Results cover the `geographies` asked for; those absent from the vintage governing
/// the current cycle get `None`.
pub fn overlay(
    projects: &[RenewableProject],
    boundaries: &BoundaryHistory,
    pair: CyclePair,
    geographies: &[String],
) -> OverlayReport {
    let placements: Vec<(&RenewableProject, Placement)> = projects
        .par_iter()
        .map(|p| (p, place(p, boundaries)))
        .collect();

    let mut report = OverlayReport::default();
    let mut sums: BTreeMap<&str, SpatialOverlayResult> = BTreeMap::new();
    for (project, placement) in placements.iter() {
        match placement {
            Placement::Unmatched(reason) => {
                report.unmatched_project_count += 1;
                report.diagnostics.push(Diagnostic::new(
                    Stage::Spatial,
                    DiagnosticKind::UnmatchedProject,
                    format!("project {:?} excluded: {}", project.project_id, reason),
                ));
            }
            Placement::Outside => {
                debug!(
                    "overlay: project {:?} is outside every {} boundary",
                    project.project_id,
                    boundaries.kind.label()
                );
            }
            Placement::Matched(ids) => {
                let window = match window_of(project.commissioned_year, pair) {
                    Some(w) => w,
                    None => continue,
                };
                for id in ids.iter() {
                    let acc = sums.entry(id.as_str()).or_default();
                    match window {
                        Window::Prior => {
                            acc.prior_project_count += 1;
                            acc.prior_cumulative_mw += project.capacity_mw;
                        }
                        Window::New => {
                            acc.new_project_count += 1;
                            acc.new_cumulative_mw += project.capacity_mw;
                        }
                    }
                }
            }
        }
    }

    let governing = boundaries.vintage_for(pair.current);
    report.results = geographies
        .par_iter()
        .map(|g| {
            let result = match governing {
                Some(v) if v.shapes.contains_key(g) => {
                    Some(sums.get(g.as_str()).cloned().unwrap_or_default())
                }
                _ => None,
            };
            (g.clone(), result)
        })
        .collect::<Vec<(String, Option<SpatialOverlayResult>)>>()
        .into_iter()
        .collect();
    info!(
        "overlay: {} projects, {} {} geographies, {} unmatched",
        projects.len(),
        geographies.len(),
        boundaries.kind.label(),
        report.unmatched_project_count
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{BoundarySet, Coord, Polygon};

    fn square(x0: f64, y0: f64, side: f64) -> Geometry {
        Geometry::Polygon(Polygon::new(vec![
            Coord::new(x0, y0),
            Coord::new(x0 + side, y0),
            Coord::new(x0 + side, y0 + side),
            Coord::new(x0, y0 + side),
        ]))
    }

    fn history() -> BoundaryHistory {
        let mut h = BoundaryHistory::new(BoundaryKind::Precinct);
        let mut shapes = BTreeMap::new();
        shapes.insert("A".to_string(), square(0.0, 0.0, 1.0));
        shapes.insert("B".to_string(), square(1.0, 0.0, 1.0));
        h.insert(BoundarySet {
            kind: BoundaryKind::Precinct,
            year: 2012,
            shapes,
        });
        h
    }

    fn project(id: &str, year: Year, mw: f64, location: Option<Geometry>) -> RenewableProject {
        RenewableProject {
            project_id: id.to_string(),
            technology: Technology::Wind,
            capacity_mw: mw,
            commissioned_year: year,
            location,
        }
    }

    fn at(x: f64, y: f64) -> Option<Geometry> {
        Some(Geometry::Point(Coord::new(x, y)))
    }

    fn geographies() -> Vec<String> {
        vec!["A".to_string(), "B".to_string(), "C".to_string()]
    }

    #[test]
    fn windows() {
        let pair = CyclePair {
            previous: Some(2016),
            current: 2018,
        };
        assert_eq!(window_of(2016, pair), Some(Window::Prior));
        assert_eq!(window_of(2017, pair), Some(Window::New));
        assert_eq!(window_of(2018, pair), None);
        let first = CyclePair {
            previous: None,
            current: 2016,
        };
        assert_eq!(window_of(2015, first), Some(Window::Prior));
        assert_eq!(window_of(2016, first), None);
    }

    #[test]
    fn project_of_2017_counts_as_new_for_2018_only() {
        let projects = vec![project("w1", 2017, 100.0, at(0.5, 0.5))];
        let report = overlay(
            &projects,
            &history(),
            CyclePair {
                previous: Some(2016),
                current: 2018,
            },
            &geographies(),
        );
        let a = report.results["A"].clone().unwrap();
        assert_eq!(a.new_project_count, 1);
        assert_eq!(a.new_cumulative_mw, 100.0);
        assert_eq!(a.prior_project_count, 0);

        let report = overlay(
            &projects,
            &history(),
            CyclePair {
                previous: Some(2014),
                current: 2016,
            },
            &geographies(),
        );
        let a = report.results["A"].clone().unwrap();
        assert_eq!(a.new_project_count + a.prior_project_count, 0);
    }

    #[test]
    fn missing_and_ambiguous_locations_are_unmatched() {
        let projects = vec![
            project("w1", 2010, 50.0, at(0.5, 0.5)),
            project("w2", 2010, 50.0, None),
            // On the shared edge of A and B.
            project("w3", 2010, 50.0, at(1.0, 0.5)),
            project("w4", 2010, 50.0, at(30.0, 30.0)),
        ];
        let report = overlay(
            &projects,
            &history(),
            CyclePair {
                previous: Some(2016),
                current: 2018,
            },
            &geographies(),
        );
        assert_eq!(report.unmatched_project_count, 2);
        assert_eq!(report.diagnostics.len(), 2);
        let a = report.results["A"].clone().unwrap();
        assert_eq!(a.prior_project_count, 1);
        assert_eq!(report.results["B"], Some(SpatialOverlayResult::default()));
        // No boundary data for C.
        assert_eq!(report.results["C"], None);
        for r in report.results.values().flatten() {
            assert!(r.prior_project_count + r.new_project_count <= projects.len() as u32);
        }
    }

    #[test]
    fn polygon_sites_count_in_every_geography_they_touch() {
        let site = Some(Geometry::Polygon(Polygon::new(vec![
            Coord::new(0.5, 0.2),
            Coord::new(1.5, 0.2),
            Coord::new(1.5, 0.4),
            Coord::new(0.5, 0.4),
        ])));
        let projects = vec![project("s1", 2017, 5.0, site)];
        let report = overlay(
            &projects,
            &history(),
            CyclePair {
                previous: Some(2016),
                current: 2018,
            },
            &geographies(),
        );
        assert_eq!(report.unmatched_project_count, 0);
        assert_eq!(report.results["A"].as_ref().unwrap().new_project_count, 1);
        assert_eq!(report.results["B"].as_ref().unwrap().new_project_count, 1);
    }

    #[test]
    fn districts_of_different_offices_overlap() {
        let mut districts = BoundaryHistory::new(BoundaryKind::District);
        let mut shapes = BTreeMap::new();
        shapes.insert("State Senate/7".to_string(), square(0.0, 0.0, 10.0));
        shapes.insert("US House/3".to_string(), square(0.0, 0.0, 10.0));
        shapes.insert("US House/4".to_string(), square(10.0, 0.0, 10.0));
        districts.insert(BoundarySet {
            kind: BoundaryKind::District,
            year: 2012,
            shapes,
        });
        let keys: Vec<String> = vec!["State Senate/7".to_string(), "US House/3".to_string()];
        let pair = CyclePair {
            previous: Some(2016),
            current: 2018,
        };
        let projects = vec![project("w1", 2017, 80.0, at(5.0, 5.0))];
        let report = overlay(&projects, &districts, pair, &keys);
        assert_eq!(report.unmatched_project_count, 0);
        assert_eq!(report.results["State Senate/7"].as_ref().unwrap().new_project_count, 1);
        assert_eq!(report.results["US House/3"].as_ref().unwrap().new_project_count, 1);

        // On the edge between two districts of the same office.
        let edge = vec![project("w2", 2017, 80.0, at(10.0, 5.0))];
        let report = overlay(&edge, &districts, pair, &keys);
        assert_eq!(report.unmatched_project_count, 1);
        assert!(report.diagnostics[0].message.contains("of US House"));
    }
}
