use log::{debug, info, warn};

use precinct_panel::collaborators::{boundary_history, DemographicSource, NoDemographics};
use precinct_panel::geometry::BoundaryKind;
use precinct_panel::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use text_diff::print_diff;

use crate::args::Args;
use crate::panel::config_reader::*;

mod acquisition;
pub mod config_reader;
mod io_common;
mod io_demographics;
mod io_geometry;
mod io_output;
mod io_projects;
mod io_workbook;

#[derive(Debug, Snafu)]
pub enum PanelError {
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the JSON content of {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error serializing JSON"))]
    WritingJson { source: serde_json::Error },
    #[snafu(display("Error reading workbook {unit}"))]
    OpeningExcel {
        source: calamine::Error,
        unit: String,
    },
    #[snafu(display("Workbook {unit} has no sheet"))]
    EmptyExcel { unit: String },
    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error parsing line {lineno} of {path}"))]
    CsvLineParse {
        source: csv::Error,
        path: String,
        lineno: u64,
    },
    #[snafu(display("Line {lineno} of {path}: cannot read {column} from {value:?}"))]
    CsvWrongValue {
        path: String,
        lineno: u64,
        column: String,
        value: String,
    },
    #[snafu(display("Error writing CSV"))]
    CsvWrite { source: csv::Error },
    #[snafu(display("Error buffering the output"))]
    BufferingOutput { source: std::io::Error },
    #[snafu(display("Error in the feature collection {path}: {message}"))]
    InvalidGeometry { path: String, message: String },
    #[snafu(display("Error creating a pool of {workers} workers"))]
    WorkerPool {
        source: rayon::ThreadPoolBuildError,
        workers: usize,
    },
    #[snafu(display("Invalid rules"))]
    InvalidRules { source: PipelineError },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type PanelResult<T> = Result<T, PanelError>;
pub type BPanelResult<T> = Result<T, Box<PanelError>>;

/// The locations of the side inputs, resolved against the configuration directory.
struct SideInputs {
    boundary_dir: Option<PathBuf>,
    projects: Option<PathBuf>,
    demographics: Option<PathBuf>,
}

fn side_inputs(root: &Path, sources: &SourceSettings) -> SideInputs {
    SideInputs {
        boundary_dir: sources
            .boundary_directory
            .as_ref()
            .map(|p| io_common::resolve_path(root, p)),
        projects: sources
            .projects_file
            .as_ref()
            .map(|p| io_common::resolve_path(root, p)),
        demographics: sources
            .demographics_file
            .as_ref()
            .map(|p| io_common::resolve_path(root, p)),
    }
}

fn build_pool(workers: Option<usize>) -> BPanelResult<rayon::ThreadPool> {
    let n = workers.unwrap_or(0);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(n)
        .build()
        .context(WorkerPoolSnafu { workers: n })?;
    Ok(pool)
}

fn check_reference(reference_path: &str, produced: &str) -> PanelResult<()> {
    let reference = fs::read_to_string(reference_path).context(OpeningFileSnafu {
        path: reference_path,
    })?;
    if reference != produced {
        warn!("check_reference: found differences with the reference table");
        print_diff(reference.as_str(), produced, "\n");
        whatever!("Difference detected between the produced table and the reference table")
    }
    info!("check_reference: the produced table matches {}", reference_path);
    Ok(())
}

pub fn run_panel(args: &Args) -> BPanelResult<()> {
    let config_p = Path::new(args.config.as_str());
    let config = read_config(args.config.as_str())?;
    info!("run_panel: config: {:?}", config);
    let rules = config.rules()?;
    let matchers = Matchers::new(&rules).context(InvalidRulesSnafu {})?;
    let format = config.output_format(args.format.as_deref())?;
    let null_token = config.null_token();

    let root_p = config_p.parent().unwrap_or_else(|| Path::new("."));
    let out_dir: PathBuf = match (&args.out, config.output_directory()) {
        (Some(out), _) => PathBuf::from(out),
        (None, Some(dir)) => io_common::resolve_path(root_p, &dir),
        (None, None) => root_p.to_path_buf(),
    };
    let inputs = side_inputs(root_p, &config.sources);
    let years = config.sources.years.clone();

    let pool = build_pool(args.workers.or(config.max_workers))?;
    debug!("run_panel: {} workers", pool.current_num_threads());

    // Every unit is processed before any cycle is linked.
    let (snapshots, mut diagnostics) = pool.install(|| {
        let source = acquisition::FileWorkbookSource::new(root_p, &config.sources);
        let (units, fetch_diagnostics) = acquisition::load_units(
            &source,
            &config.sources.counties,
            &years,
            config.sources.fetch_retries.unwrap_or(acquisition::DEFAULT_RETRIES),
        );
        let outcomes = process_units(&units, &matchers);
        let excluded = outcomes.iter().filter(|o| o.excluded).count();
        info!(
            "run_panel: {} units processed, {} excluded",
            outcomes.len(),
            excluded
        );
        let (snapshots, mut diagnostics) = assemble_cycles(&years, outcomes);
        let mut all = fetch_diagnostics;
        all.append(&mut diagnostics);
        (snapshots, all)
    });

    let (precincts, districts) = match inputs.boundary_dir.as_ref() {
        Some(dir) => {
            let source = io_geometry::FileBoundarySource::new(dir, &matchers);
            let precinct_years = source.available_years(BoundaryKind::Precinct);
            let district_years = source.available_years(BoundaryKind::District);
            (
                boundary_history(&source, BoundaryKind::Precinct, &precinct_years),
                boundary_history(&source, BoundaryKind::District, &district_years),
            )
        }
        None => {
            info!("run_panel: no boundary directory, spatial joins are skipped");
            (
                geometry::BoundaryHistory::new(BoundaryKind::Precinct),
                geometry::BoundaryHistory::new(BoundaryKind::District),
            )
        }
    };
    let projects = match inputs.projects.as_ref() {
        Some(p) => io_projects::read_projects(p)?,
        None => Vec::new(),
    };
    let table_demographics = match inputs.demographics.as_ref() {
        Some(p) => Some(io_demographics::read_demographics(p)?),
        None => None,
    };
    let demographics: &dyn DemographicSource = match table_demographics.as_ref() {
        Some(t) => t,
        None => &NoDemographics,
    };

    let context = CycleContext {
        precincts: &precincts,
        districts: &districts,
        projects: &projects,
        demographics,
    };
    let cycles = pool.install(|| link_all(&snapshots, &context, &matchers));
    for c in cycles.iter() {
        diagnostics.extend(c.diagnostics.iter().cloned());
    }

    fs::create_dir_all(&out_dir).context(WritingFileSnafu {
        path: out_dir.display().to_string(),
    })?;
    let canonical = io_output::render_canonical(&cycles, &rules.tracked_offices, format, &null_token)?;
    let canonical_p = out_dir.join(format!("canonical.{}", format.extension()));
    io_common::write_text(&canonical_p, &canonical)?;
    let diagnostics_p = out_dir.join("diagnostics.csv");
    io_common::write_text(&diagnostics_p, &io_output::render_diagnostics(&diagnostics)?)?;
    let results_p = out_dir.join("district_results.json");
    io_common::write_text(&results_p, &io_output::render_district_results(&cycles)?)?;
    info!(
        "run_panel: {} rows, {} diagnostics written to {}",
        cycles.iter().map(|c| c.rows.len()).sum::<usize>(),
        diagnostics.len(),
        out_dir.display()
    );

    if let Some(reference_p) = args.reference.as_ref() {
        check_reference(reference_p, &canonical)?;
    }
    Ok(())
}
