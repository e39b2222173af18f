use clap::Parser;

/// Estimates how voters moved between two elections, from municipal results.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON file describing the input and the analysis. The paths it contains are
    /// relative to the directory of that file. Command line options override its values.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,
    /// (file path) A reference summary in JSON format. If provided, vtransfer will check that the computed
    /// summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the analysis will be written in JSON format
    /// to the given location. Setting this option overrides the path that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) The file containing the election results. Setting this option overrides what may be specified
    /// with the --config option.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (default csv) The type of the input: csv or xlsx.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// When using an Excel file with several worksheets, indicates the name of the worksheet to use.
    #[clap(long, value_parser)]
    pub excel_worksheet_name: Option<String>,

    /// The election label of the starting election, as found in the input.
    #[clap(short, long, value_parser)]
    pub start: Option<String>,

    /// The election label of the ending election.
    #[clap(short, long, value_parser)]
    pub end: Option<String>,

    /// (optional) Restricts the analysis to one province.
    #[clap(short, long, value_parser)]
    pub province: Option<String>,

    /// (optional) Restricts the analysis to one municipality.
    #[clap(short, long, value_parser)]
    pub municipality: Option<String>,

    /// (optional) A municipality for which the absolute transfers are reported.
    #[clap(short, long, value_parser)]
    pub focus: Option<String>,

    /// (default 3) The number of groups of similar municipalities.
    #[clap(short, long, value_parser)]
    pub groups: Option<usize>,

    /// (default 42) The seed of the segmentation.
    #[clap(long, value_parser)]
    pub seed: Option<u64>,

    /// (default en) The language of the group labels: en or es.
    #[clap(short, long, value_parser)]
    pub language: Option<String>,

    /// Prints the elections and the municipalities of each province found in the input, and exits.
    #[clap(long, takes_value = false)]
    pub list: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
