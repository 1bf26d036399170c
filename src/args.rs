use clap::Parser;

/// Builds a precinct-level election panel from county result workbooks.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON configuration of the run: sources, tracked offices and vocabulary.
    /// See the manual of the precinct_panel library for the format.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (directory, optional) Where the canonical table, the diagnostics and the district results are
    /// written. Setting this option overrides the directory that may be specified in the configuration.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (csv or jsonl, default csv) The format of the canonical table.
    #[clap(long, value_parser)]
    pub format: Option<String>,

    /// (file path, optional) A reference canonical table. If provided, panelbuild will check that
    /// the produced table matches it and print the differences otherwise.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (number, optional) The maximum number of workbooks processed at the same time. Overrides
    /// `maxWorkers` from the configuration. Defaults to the number of cores.
    #[clap(long, value_parser)]
    pub workers: Option<usize>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
