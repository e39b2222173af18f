use crate::transfer::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnSettings {
    pub election: Option<String>,
    pub province: Option<String>,
    pub municipality: Option<String>,
    pub party: Option<String>,
    pub representative: Option<String>,
    pub votes: Option<String>,
    pub census: Option<String>,
    pub abstention: Option<String>,
    pub turnout: Option<String>,
}

impl ColumnSettings {
    pub fn column_names(&self) -> ColumnNames {
        let d = ColumnNames::default();
        let pick = |x: &Option<String>, default: String| x.clone().unwrap_or(default);
        ColumnNames {
            election: pick(&self.election, d.election),
            province: pick(&self.province, d.province),
            municipality: pick(&self.municipality, d.municipality),
            party: pick(&self.party, d.party),
            representative: pick(&self.representative, d.representative),
            votes: pick(&self.votes, d.votes),
            census: pick(&self.census, d.census),
            abstention: pick(&self.abstention, d.abstention),
            turnout: pick(&self.turnout, d.turnout),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputSettings {
    #[serde(rename = "filePath")]
    pub file_path: Option<String>,
    pub provider: Option<String>,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
    #[serde(default)]
    pub columns: ColumnSettings,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisSettings {
    #[serde(rename = "startElection")]
    pub start_election: Option<String>,
    #[serde(rename = "endElection")]
    pub end_election: Option<String>,
    pub province: Option<String>,
    pub municipality: Option<String>,
    #[serde(rename = "focusMunicipality")]
    pub focus_municipality: Option<String>,
    #[serde(rename = "groupCount")]
    pub group_count: Option<usize>,
    pub seed: Option<u64>,
    pub restarts: Option<usize>,
    #[serde(rename = "labelLanguage")]
    pub label_language: Option<String>,
    #[serde(rename = "minLocations")]
    pub min_locations: Option<usize>,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(rename = "maxIterations")]
    pub max_iterations: Option<u32>,
    pub tolerance: Option<f64>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "outputPath")]
    pub output_path: Option<String>,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default)]
    pub input: InputSettings,
    #[serde(default)]
    pub analysis: AnalysisSettings,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub output: OutputSettings,
}

/// The request, as echoed in the summary.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(rename = "startElection")]
    pub start_election: String,
    #[serde(rename = "endElection")]
    pub end_election: String,
    pub province: Option<String>,
    pub municipality: Option<String>,
    pub focus: Option<String>,
    #[serde(rename = "groupCount")]
    pub group_count: usize,
    pub seed: u64,
    pub restarts: usize,
    #[serde(rename = "labelLanguage")]
    pub label_language: String,
    #[serde(rename = "maxIterations")]
    pub max_iterations: u32,
    pub tolerance: f64,
}

impl OutputConfig {
    pub fn from_request(request: &AnalysisRequest) -> OutputConfig {
        OutputConfig {
            start_election: request.start_election.clone(),
            end_election: request.end_election.clone(),
            province: request.province.clone(),
            municipality: request.municipality.clone(),
            focus: request.focus.as_ref().map(|k| k.to_string()),
            group_count: request.segmenter.group_count,
            seed: request.segmenter.seed,
            restarts: request.segmenter.restarts,
            label_language: request.label_language.code().to_string(),
            max_iterations: request.solver.max_iterations,
            tolerance: request.solver.tolerance,
        }
    }
}

pub fn read_config(path: &str) -> CliResult<TransferConfig> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let config: TransferConfig = serde_json::from_str(&contents).context(ParsingJsonSnafu {})?;
    debug!("read_config: {:?}", config);
    Ok(config)
}

pub fn read_summary(path: &str) -> CliResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}

/// Overrides the configuration with the values passed on the command line.
///
/// Paths found in the configuration file are resolved against `root`. Paths from
/// the command line are kept as given.
pub fn merge_args(mut config: TransferConfig, args: &Args, root: Option<&Path>) -> TransferConfig {
    config.input.file_path = match (&args.input, &config.input.file_path) {
        (Some(p), _) => Some(p.clone()),
        (None, Some(p)) => Some(resolve_path(root, p)),
        (None, None) => None,
    };
    config.output.output_path = match (&args.out, &config.output.output_path) {
        (Some(p), _) => Some(p.clone()),
        (None, Some(p)) if p == STDOUT => Some(p.clone()),
        (None, Some(p)) => Some(resolve_path(root, p)),
        (None, None) => None,
    };
    let set = |arg: &Option<String>, current: &mut Option<String>| {
        if let Some(v) = arg {
            *current = Some(v.clone());
        }
    };
    set(&args.input_type, &mut config.input.provider);
    set(&args.excel_worksheet_name, &mut config.input.excel_worksheet_name);
    set(&args.start, &mut config.analysis.start_election);
    set(&args.end, &mut config.analysis.end_election);
    set(&args.province, &mut config.analysis.province);
    set(&args.municipality, &mut config.analysis.municipality);
    set(&args.focus, &mut config.analysis.focus_municipality);
    set(&args.language, &mut config.analysis.label_language);
    if let Some(g) = args.groups {
        config.analysis.group_count = Some(g);
    }
    if let Some(s) = args.seed {
        config.analysis.seed = Some(s);
    }
    config
}

/// Finds the province of the focused municipality.
fn focus_key(
    municipality: &str,
    province: Option<&str>,
    geography: &GeographyIndex,
) -> CliResult<LocationKey> {
    if let Some(p) = province {
        return Ok(LocationKey::new(p, municipality));
    }
    let provinces: Vec<&String> = geography
        .provinces
        .iter()
        .filter(|(_, ms)| ms.iter().any(|m| m == municipality))
        .map(|(p, _)| p)
        .collect();
    match provinces.as_slice() {
        [p] => Ok(LocationKey::new(p, municipality)),
        [] => whatever!("Focus municipality {:?} not found in the input", municipality),
        _ => whatever!(
            "Focus municipality {:?} exists in several provinces {:?}: a province must be given",
            municipality,
            provinces
        ),
    }
}

pub fn validate_request(
    config: &TransferConfig,
    geography: &GeographyIndex,
) -> CliResult<AnalysisRequest> {
    let a = &config.analysis;
    let start = match &a.start_election {
        Some(s) => s.clone(),
        None => whatever!("Missing start election (analysis.startElection or --start)"),
    };
    let end = match &a.end_election {
        Some(s) => s.clone(),
        None => whatever!("Missing end election (analysis.endElection or --end)"),
    };
    let mut request = AnalysisRequest::new(&start, &end);
    request.province = a.province.clone();
    request.municipality = a.municipality.clone();
    if let Some(m) = &a.focus_municipality {
        let key = focus_key(m, a.province.as_deref(), geography)?;
        // The municipality view trains on the province of the focus.
        if request.province.is_none() {
            request.province = Some(key.province.clone());
        }
        request.focus = Some(key);
    }
    request.label_language = match a.label_language.as_deref().map(LabelLanguage::parse) {
        None => LabelLanguage::English,
        Some(Some(l)) => l,
        Some(None) => whatever!(
            "Unknown label language {:?}: expected en or es",
            a.label_language
        ),
    };
    request.segmenter = SegmenterSettings {
        group_count: a.group_count.unwrap_or(SegmenterSettings::DEFAULT.group_count),
        seed: a.seed.unwrap_or(SegmenterSettings::DEFAULT.seed),
        restarts: a.restarts.unwrap_or(SegmenterSettings::DEFAULT.restarts),
        ..SegmenterSettings::DEFAULT
    };
    if request.segmenter.group_count == 0 {
        whatever!("The group count must be at least 1");
    }
    if let Some(m) = a.min_locations {
        request.min_locations = m;
    }
    request.solver = SolverSettings {
        max_iterations: config
            .solver
            .max_iterations
            .unwrap_or(SolverSettings::DEFAULT.max_iterations),
        tolerance: config
            .solver
            .tolerance
            .unwrap_or(SolverSettings::DEFAULT.tolerance),
    };
    if request.solver.tolerance.is_nan() || request.solver.tolerance < 0.0 {
        whatever!("The solver tolerance must be non-negative");
    }
    Ok(request)
}
