use log::{debug, info, warn};

use snafu::{prelude::*, Snafu};
use vote_transfer::*;

use std::fs;
use std::path::Path;

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::transfer::config_reader::*;
use crate::transfer::io_common::*;

mod config_reader;
mod io_common;
mod io_csv;
mod io_xlsx;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TransferCliError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("Worksheet {name:?} not found in {path}"))]
    MissingWorksheet { path: String, name: String },
    #[snafu(display("The spreadsheet {path} is empty"))]
    EmptyExcel { path: String },
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
    #[snafu(display("Error parsing JSON"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Error reading the header of the CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading line {lineno} of the CSV file"))]
    CsvLineParse { source: csv::Error, lineno: usize },
    #[snafu(display("Invalid input: {source}"))]
    Schema { source: SchemaError },
    #[snafu(display("{source}"))]
    Analysis { source: AnalysisError },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type CliResult<T> = Result<T, TransferCliError>;

fn choice_codes(choices: &[Choice]) -> Vec<String> {
    choices.iter().map(|c| c.to_string()).collect()
}

fn absolute_to_json(abs: &AbsoluteTransfers) -> JSValue {
    let d = abs.destinations.len().max(1);
    let votes: Vec<Vec<u64>> = abs.votes.chunks(d).map(|r| r.to_vec()).collect();
    json!({
        "sources": choice_codes(&abs.sources),
        "destinations": choice_codes(&abs.destinations),
        "votes": votes,
        "sourceTotals": abs.source_totals,
        "estimatedTotals": abs.estimated_totals,
        "actualTotals": abs.actual_totals,
    })
}

fn group_to_json(g: &GroupEstimate) -> JSValue {
    let values: Vec<Vec<f64>> = g.matrix.rows().map(|r| r.to_vec()).collect();
    let (status, residual) = match g.status {
        SolveStatus::Converged { .. } => ("converged", None),
        SolveStatus::BestEffort { residual, .. } => ("bestEffort", Some(residual)),
    };
    json!({
        "observations": g.observations,
        "status": status,
        "iterations": g.status.iterations(),
        "residual": residual,
        "weightedMse": g.weighted_mse,
        "sources": choice_codes(&g.matrix.sources),
        "destinations": choice_codes(&g.matrix.destinations),
        "values": values,
        "absolute": absolute_to_json(&g.absolute),
    })
}

fn build_summary_js(request: &AnalysisRequest, res: &AnalysisResult) -> JSValue {
    let c = OutputConfig::from_request(request);
    let mut groups: JSMap<String, JSValue> = JSMap::new();
    for (label, g) in res.groups.iter() {
        groups.insert(label.clone(), group_to_json(g));
    }
    let warnings: Vec<JSValue> = res
        .warnings
        .iter()
        .map(|w| json!({"kind": w.kind(), "message": w.to_string()}))
        .collect();
    let observations: Vec<JSValue> = res
        .observations
        .iter()
        .map(|o| {
            json!({
                "province": o.observation.key.province,
                "municipality": o.observation.key.municipality,
                "groupId": o.assignment.group_id,
                "groupLabel": o.assignment.label,
                "censusStart": o.observation.start.census,
                "censusEnd": o.observation.end.census,
            })
        })
        .collect();
    let focus: Option<JSValue> = res.focus.as_ref().map(|f| {
        json!({
            "province": f.key.province,
            "municipality": f.key.municipality,
            "groupLabel": f.group_label,
            "absolute": absolute_to_json(&f.absolute),
        })
    });
    let r = &res.report;
    json!({
        "config": c,
        "join": {
            "startLocations": r.start_locations,
            "endLocations": r.end_locations,
            "retained": r.retained,
            "droppedStartOnly": r.dropped_start_only,
            "droppedEndOnly": r.dropped_end_only,
        },
        "warnings": warnings,
        "groups": groups,
        "observations": observations,
        "focus": focus,
    })
}

/// Reads the input rows, and the fingerprint of the file they come from.
fn read_input(config: &TransferConfig) -> CliResult<(Vec<BallotRecord>, Fingerprint)> {
    let path = match &config.input.file_path {
        Some(p) => p.clone(),
        None => whatever!("Missing input file (input.filePath or --input)"),
    };
    info!("Attempting to read input file {:?}", path);
    let content = fs::read(&path).context(OpeningFileSnafu { path: path.clone() })?;
    let fingerprint = Fingerprint::new(&path, &content);
    let names = config.input.columns.column_names();
    let records = match config.input.provider.as_deref().unwrap_or("csv") {
        "csv" => io_csv::read_csv_records(&content, &path, &names)?,
        "xlsx" => io_xlsx::read_xlsx_records(
            &path,
            config.input.excel_worksheet_name.as_deref(),
            &names,
        )?,
        x => whatever!("Unknown input type {:?}: expected csv or xlsx", x),
    };
    Ok((records, fingerprint))
}

fn print_geography(geography: &GeographyIndex) {
    println!("Elections:");
    for e in geography.elections.iter() {
        println!("  {}", e);
    }
    for (p, ms) in geography.provinces.iter() {
        println!("{} ({} municipalities):", p, ms.len());
        for m in ms.iter() {
            println!("  {}", m);
        }
    }
}

fn write_output(path: Option<&str>, content: &str) -> CliResult<()> {
    match path {
        None | Some(STDOUT) | Some("") => {
            println!("{}", content);
        }
        Some(p) => {
            info!("Writing summary to {:?}", p);
            fs::write(p, content).context(WritingFileSnafu { path: p })?;
        }
    }
    Ok(())
}

/// Compares the summary with a reference file, and prints the differences.
fn check_reference(reference_path: &str, summary_js: &JSValue) -> CliResult<()> {
    let summary_ref = read_summary(reference_path)?;
    let pretty_js_summary_ref =
        serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
    // Both sides go through the same text round trip.
    let text = serde_json::to_string_pretty(summary_js).context(ParsingJsonSnafu {})?;
    let reparsed: JSValue = serde_json::from_str(&text).context(ParsingJsonSnafu {})?;
    let pretty_js_stats = serde_json::to_string_pretty(&reparsed).context(ParsingJsonSnafu {})?;
    if pretty_js_summary_ref != pretty_js_stats {
        warn!("Found differences with the reference summary");
        print_diff(
            pretty_js_summary_ref.as_str(),
            pretty_js_stats.as_ref(),
            "\n",
        );
        whatever!("Difference detected between calculated summary and reference summary")
    }
    Ok(())
}

/// Runs an analysis with an already merged configuration and returns the summary.
pub fn run_config(
    config: &TransferConfig,
    cache: &mut GeographyCache,
    list_only: bool,
) -> CliResult<Option<JSValue>> {
    let (records, fingerprint) = read_input(config)?;
    let geography = cache.get_or_build(&fingerprint, || GeographyIndex::build(&records));
    debug!(
        "run_config: {} elections, {} provinces",
        geography.elections.len(),
        geography.provinces.len()
    );
    if list_only {
        print_geography(&geography);
        return Ok(None);
    }

    let request = validate_request(config, &geography)?;
    let result =
        run_analysis(&records, &request, &CancelToken::new()).context(AnalysisSnafu {})?;
    for w in result.warnings.iter() {
        info!("warning: {}", w);
    }
    Ok(Some(build_summary_js(&request, &result)))
}

pub fn run(args: &Args) -> CliResult<()> {
    let config = match &args.config {
        Some(config_path) => {
            let config = read_config(config_path)?;
            let root = Path::new(config_path.as_str()).parent();
            merge_args(config, args, root)
        }
        None => merge_args(TransferConfig::default(), args, None),
    };
    info!("config: {:?}", config);

    let mut cache = GeographyCache::new();
    let summary_js = match run_config(&config, &mut cache, args.list)? {
        Some(js) => js,
        None => return Ok(()),
    };

    let pretty_js_stats = serde_json::to_string_pretty(&summary_js).context(ParsingJsonSnafu {})?;
    write_output(config.output.output_path.as_deref(), &pretty_js_stats)?;

    // The reference summary, if provided for comparison
    if let Some(reference_path) = &args.reference {
        check_reference(reference_path, &summary_js)?;
    }
    Ok(())
}
