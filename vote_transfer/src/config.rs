// ********* Input data structures ***********

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use snafu::Snafu;

use crate::labels::LabelLanguage;
pub use crate::parties::{CanonicalParty, Choice};

/// One raw row of the input dataset. Never mutated once read.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct BallotRecord {
    pub election: String,
    pub province: String,
    pub municipality: String,
    pub party: Option<String>,
    pub representative: Option<String>,
    pub votes: u64,
    pub census: u64,
    pub abstention: u64,
    pub turnout: u64,
}

/// The aggregation key of a location.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub struct LocationKey {
    pub province: String,
    pub municipality: String,
}

impl LocationKey {
    pub fn new(province: &str, municipality: &str) -> LocationKey {
        LocationKey {
            province: province.to_string(),
            municipality: municipality.to_string(),
        }
    }
}

impl Display for LocationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.province, self.municipality)
    }
}

/// The summed votes of one location for one election.
///
/// Party votes plus abstention are not required to equal the census.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct LocationVoteVector {
    pub key: LocationKey,
    pub votes: BTreeMap<CanonicalParty, u64>,
    pub census: u64,
    pub abstention: u64,
}

impl LocationVoteVector {
    /// The count for a column, zero when the party did not run here.
    pub fn count(&self, choice: Choice) -> u64 {
        match choice {
            Choice::Abstention => self.abstention,
            Choice::Party(p) => self.votes.get(&p).cloned().unwrap_or(0),
        }
    }

    /// The share of the census for a column. Zero census gives zero shares.
    pub fn share(&self, choice: Choice) -> f64 {
        if self.census == 0 {
            0.0
        } else {
            self.count(choice) as f64 / self.census as f64
        }
    }

    pub fn choices(&self) -> impl Iterator<Item = Choice> + '_ {
        std::iter::once(Choice::Abstention).chain(self.votes.keys().map(|p| Choice::Party(*p)))
    }
}

/// A location present in both elections: the unit of analysis.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PairedObservation {
    pub key: LocationKey,
    pub start: LocationVoteVector,
    pub end: LocationVoteVector,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ClusterAssignment {
    pub group_id: usize,
    pub label: String,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct LabeledObservation {
    pub observation: PairedObservation,
    pub assignment: ClusterAssignment,
}

// ******** Output data structures *********

/// A row-stochastic matrix: rows are source choices, columns destination choices.
#[derive(PartialEq, Debug, Clone)]
pub struct TransferMatrix {
    pub sources: Vec<Choice>,
    pub destinations: Vec<Choice>,
    /// Row-major values, `sources.len() * destinations.len()` entries.
    pub values: Vec<f64>,
}

impl TransferMatrix {
    /// The matrix with every cell equal to 1 / (number of destinations).
    pub fn uniform(sources: &[Choice], destinations: &[Choice]) -> TransferMatrix {
        let v = if destinations.is_empty() {
            0.0
        } else {
            1.0 / destinations.len() as f64
        };
        TransferMatrix {
            sources: sources.to_vec(),
            destinations: destinations.to_vec(),
            values: vec![v; sources.len() * destinations.len()],
        }
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.destinations.len() + col]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let d = self.destinations.len();
        &self.values[row * d..(row + 1) * d]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks() panics on 0.
        self.values.chunks(self.destinations.len().max(1))
    }

    /// The value for a (source, destination) pair, if both are in the matrix.
    pub fn lookup(&self, source: Choice, destination: Choice) -> Option<f64> {
        let r = self.sources.iter().position(|c| *c == source)?;
        let c = self.destinations.iter().position(|c| *c == destination)?;
        Some(self.get(r, c))
    }

    /// Checks that every row sums to 1 and every entry is in [0, 1], within `tolerance`.
    pub fn is_row_stochastic(&self, tolerance: f64) -> bool {
        self.rows().all(|row| {
            let s: f64 = row.iter().sum();
            (s - 1.0).abs() <= tolerance
                && row
                    .iter()
                    .all(|v| *v >= -tolerance && *v <= 1.0 + tolerance)
        })
    }
}

/// The estimated number of voters behind each cell of a transfer matrix.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct AbsoluteTransfers {
    pub sources: Vec<Choice>,
    pub destinations: Vec<Choice>,
    /// Row-major estimated voters.
    pub votes: Vec<u64>,
    /// Total count of each source choice in the start election.
    pub source_totals: Vec<u64>,
    /// Column sums of `votes`.
    pub estimated_totals: Vec<u64>,
    /// Total count of each destination choice in the end election.
    pub actual_totals: Vec<u64>,
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum SolveStatus {
    Converged { iterations: u32 },
    /// The iteration budget ran out. The best iterate is still a feasible matrix.
    BestEffort { iterations: u32, residual: f64 },
}

impl SolveStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, SolveStatus::Converged { .. })
    }

    pub fn iterations(&self) -> u32 {
        match self {
            SolveStatus::Converged { iterations } => *iterations,
            SolveStatus::BestEffort { iterations, .. } => *iterations,
        }
    }
}

/// The outcome of one estimation run.
#[derive(PartialEq, Debug, Clone)]
pub struct Estimate {
    pub matrix: TransferMatrix,
    pub status: SolveStatus,
    pub weighted_mse: f64,
    pub warnings: Vec<AnalysisWarning>,
}

/// The estimate for one group label (or "Global").
#[derive(PartialEq, Debug, Clone)]
pub struct GroupEstimate {
    pub label: String,
    pub observations: usize,
    pub matrix: TransferMatrix,
    pub status: SolveStatus,
    pub weighted_mse: f64,
    pub absolute: AbsoluteTransfers,
}

/// Counts of the inner join between the two elections.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct JoinReport {
    pub start_locations: usize,
    pub end_locations: usize,
    pub retained: usize,
    pub dropped_start_only: usize,
    pub dropped_end_only: usize,
}

/// The single location requested with `AnalysisRequest::focus`.
#[derive(PartialEq, Debug, Clone)]
pub struct FocusedLocation {
    pub key: LocationKey,
    pub group_label: String,
    pub absolute: AbsoluteTransfers,
}

#[derive(PartialEq, Debug, Clone)]
pub struct AnalysisResult {
    pub report: JoinReport,
    pub observations: Vec<LabeledObservation>,
    /// Keyed by group label, "Global" included.
    pub groups: BTreeMap<String, GroupEstimate>,
    pub warnings: Vec<AnalysisWarning>,
    pub focus: Option<FocusedLocation>,
}

// ********* Errors and warnings **********

/// The input rows do not have the expected shape.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SchemaError {
    #[snafu(display("Missing required column {column:?} for field {field}"))]
    MissingColumn { column: String, field: String },
    #[snafu(display("Line {lineno}: expected at least {expected} fields, found {found}"))]
    ShortRow {
        lineno: usize,
        expected: usize,
        found: usize,
    },
    #[snafu(display("Line {lineno}: field {field} has an invalid value {value:?}"))]
    InvalidField {
        lineno: usize,
        field: String,
        value: String,
    },
}

/// Errors that prevent the analysis from completing.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AnalysisError {
    #[snafu(display("No data found for {scope}"))]
    Data { scope: String },
    #[snafu(display("Invalid input: {source}"))]
    Schema { source: SchemaError },
    #[snafu(display("Invalid request: {message}"))]
    InvalidRequest { message: String },
    #[snafu(display("The analysis was cancelled"))]
    Cancelled {},
}

impl From<SchemaError> for AnalysisError {
    fn from(source: SchemaError) -> Self {
        AnalysisError::Schema { source }
    }
}

pub type TransferResult<T> = Result<T, AnalysisError>;

/// Non-fatal conditions, accumulated on the result.
#[derive(PartialEq, Debug, Clone)]
pub enum AnalysisWarning {
    /// Fewer locations than the reliability threshold.
    Reliability { locations: usize, minimum: usize },
    /// Fewer observations than source parties for a group.
    Underdetermined {
        group: String,
        observations: usize,
        source_parties: usize,
    },
    /// The solver stopped before reaching its tolerance.
    NonConvergence {
        group: String,
        iterations: u32,
        residual: f64,
    },
    /// A group's matrix could not be estimated and is missing from the result.
    GroupOmitted { group: String, reason: String },
    /// There were fewer observations than requested groups.
    GroupCountReduced { requested: usize, effective: usize },
}

impl AnalysisWarning {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisWarning::Reliability { .. } => "reliability",
            AnalysisWarning::Underdetermined { .. } => "underdetermined",
            AnalysisWarning::NonConvergence { .. } => "nonConvergence",
            AnalysisWarning::GroupOmitted { .. } => "groupOmitted",
            AnalysisWarning::GroupCountReduced { .. } => "groupCountReduced",
        }
    }
}

impl Display for AnalysisWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisWarning::Reliability { locations, minimum } => write!(
                f,
                "Only {} locations after filtering (fewer than {}): the estimate is not reliable",
                locations, minimum
            ),
            AnalysisWarning::Underdetermined {
                group,
                observations,
                source_parties,
            } => write!(
                f,
                "Group {} has {} observations for {} source parties: the estimate is underdetermined",
                group, observations, source_parties
            ),
            AnalysisWarning::NonConvergence {
                group,
                iterations,
                residual,
            } => write!(
                f,
                "Group {}: the solver did not converge after {} iterations (residual {:e})",
                group, iterations, residual
            ),
            AnalysisWarning::GroupOmitted { group, reason } => {
                write!(f, "Group {} omitted: {}", group, reason)
            }
            AnalysisWarning::GroupCountReduced {
                requested,
                effective,
            } => write!(
                f,
                "Requested {} groups but only {} observations are available",
                requested, effective
            ),
        }
    }
}

/// Lets a caller abandon an analysis in flight.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ********* Configuration **********

/// Settings of the k-means segmentation.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct SegmenterSettings {
    pub group_count: usize,
    pub seed: u64,
    /// Number of random restarts; the run with the lowest inertia is kept.
    pub restarts: usize,
    pub max_iterations: usize,
}

impl SegmenterSettings {
    pub const DEFAULT: SegmenterSettings = SegmenterSettings {
        group_count: 3,
        seed: 42,
        restarts: 10,
        max_iterations: 300,
    };
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub struct SolverSettings {
    pub max_iterations: u32,
    /// Largest entry change of a projected-gradient step at convergence.
    pub tolerance: f64,
}

impl SolverSettings {
    pub const DEFAULT: SolverSettings = SolverSettings {
        max_iterations: 20_000,
        tolerance: 1e-9,
    };
}

/// Below this number of locations an analysis is flagged as unreliable.
pub const MIN_RELIABLE_LOCATIONS: usize = 5;

/// The label of the matrix estimated over all observations.
pub const GLOBAL_LABEL: &str = "Global";

#[derive(PartialEq, Debug, Clone)]
pub struct AnalysisRequest {
    pub start_election: String,
    pub end_election: String,
    pub province: Option<String>,
    pub municipality: Option<String>,
    /// A location to report on individually, trained with the rest of the scope.
    pub focus: Option<LocationKey>,
    pub segmenter: SegmenterSettings,
    pub solver: SolverSettings,
    pub label_language: LabelLanguage,
    pub min_locations: usize,
}

impl AnalysisRequest {
    pub fn new(start_election: &str, end_election: &str) -> AnalysisRequest {
        AnalysisRequest {
            start_election: start_election.to_string(),
            end_election: end_election.to_string(),
            province: None,
            municipality: None,
            focus: None,
            segmenter: SegmenterSettings::DEFAULT,
            solver: SolverSettings::DEFAULT,
            label_language: LabelLanguage::English,
            min_locations: MIN_RELIABLE_LOCATIONS,
        }
    }
}
