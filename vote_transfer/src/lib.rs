mod aggregate;
mod config;
mod estimate;
mod geography;
mod labels;
pub mod manual;
mod parties;
mod schema;
mod segment;

use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

pub use crate::aggregate::{
    aggregate_election, available_elections, is_location_row, pair_elections, ElectionScope,
    Pairing, PairingRequest, UNAVAILABLE_MUNICIPALITY,
};
pub use crate::config::*;
pub use crate::estimate::{
    absolute_transfers, estimate_transfer_matrix, project_onto_simplex, weighted_mse,
};
pub use crate::geography::{Fingerprint, GeographyCache, GeographyIndex};
pub use crate::labels::{describe_centroid, rank_shares, LabelLanguage, DOMINANCE_THRESHOLD};
pub use crate::parties::{
    canonical_party, canonicalize, matching_rule, PartyRule, Predicate, PARTY_RULES,
};
pub use crate::schema::{parse_count, ColumnNames, RecordSchema};
pub use crate::segment::{feature_choices, feature_vectors, segment, Segmentation};

/// The destination columns: every choice present in the end election.
fn destination_choices(observations: &[PairedObservation]) -> Vec<Choice> {
    let s: BTreeSet<Choice> = observations.iter().flat_map(|o| o.end.choices()).collect();
    s.into_iter().collect()
}

/// Collects the per-label results in label order.
///
/// A cancelled run or a failed "Global" estimate aborts. Other failures only
/// drop their group, with a `GroupOmitted` warning.
fn assemble_groups(
    estimates: Vec<(String, Vec<&PairedObservation>, TransferResult<Estimate>)>,
    warnings: &mut Vec<AnalysisWarning>,
) -> TransferResult<BTreeMap<String, GroupEstimate>> {
    let mut groups: BTreeMap<String, GroupEstimate> = BTreeMap::new();
    for (label, group, res) in estimates.into_iter() {
        match res {
            Ok(est) => {
                debug!(
                    "assemble_groups: group {:?}: {} observations, {:?}",
                    label,
                    group.len(),
                    est.status
                );
                warnings.extend(est.warnings);
                let absolute = absolute_transfers(&group, &est.matrix);
                groups.insert(
                    label.clone(),
                    GroupEstimate {
                        label,
                        observations: group.len(),
                        matrix: est.matrix,
                        status: est.status,
                        weighted_mse: est.weighted_mse,
                        absolute,
                    },
                );
            }
            Err(e @ AnalysisError::Cancelled {}) => return Err(e),
            Err(e) if label == GLOBAL_LABEL => return Err(e),
            Err(e) => {
                let w = AnalysisWarning::GroupOmitted {
                    group: label.clone(),
                    reason: e.to_string(),
                };
                warn!("{}", w);
                warnings.push(w);
            }
        }
    }
    Ok(groups)
}

/// Runs the whole analysis on a dataset: pairing of the two elections,
/// segmentation of the locations, and estimation of one transfer matrix per
/// group label plus one over all the locations ("Global").
///
/// Arguments:
/// * `records` the raw ballot rows
/// * `request` the elections, the geographic scope and the settings
/// * `cancel` checked by the estimations. Once set, the analysis returns
///   `AnalysisError::Cancelled` and no result.
///
/// Errors at the scope of the whole analysis (no data for the elections or
/// the filters, missing focus location) abort it. A group whose estimation
/// fails is left out of the result with a `GroupOmitted` warning.
pub fn run_analysis(
    records: &[BallotRecord],
    request: &AnalysisRequest,
    cancel: &CancelToken,
) -> TransferResult<AnalysisResult> {
    info!("Processing {} records, request: {:?}", records.len(), request);
    if cancel.is_cancelled() {
        return CancelledSnafu {}.fail();
    }

    let pairing = pair_elections(
        records,
        &PairingRequest {
            start_election: &request.start_election,
            end_election: &request.end_election,
            province: request.province.as_deref(),
            municipality: request.municipality.as_deref(),
        },
    )?;
    let report = pairing.report;
    let observations = pairing.observations;

    let focus_idx = match &request.focus {
        Some(key) => match observations.iter().position(|o| o.key == *key) {
            Some(idx) => Some(idx),
            None => {
                return DataSnafu {
                    scope: format!(
                        "focus location {} between {:?} and {:?}",
                        key, request.start_election, request.end_election
                    ),
                }
                .fail()
            }
        },
        None => None,
    };

    let mut warnings: Vec<AnalysisWarning> = Vec::new();
    if observations.len() < request.min_locations {
        let w = AnalysisWarning::Reliability {
            locations: observations.len(),
            minimum: request.min_locations,
        };
        warn!("{}", w);
        warnings.push(w);
    }

    let segmentation = segment(&observations, &request.segmenter, request.label_language)?;
    warnings.extend(segmentation.warnings.iter().cloned());

    let sources = segmentation.features.clone();
    let destinations = destination_choices(&observations);
    info!("run_analysis: sources {:?}", sources);
    info!("run_analysis: destinations {:?}", destinations);

    // Clusters sharing a label are estimated together.
    let mut by_label: BTreeMap<String, Vec<&PairedObservation>> = BTreeMap::new();
    for (o, a) in observations.iter().zip(segmentation.assignments.iter()) {
        by_label.entry(a.label.clone()).or_default().push(o);
    }
    let mut tasks: Vec<(String, Vec<&PairedObservation>)> = by_label.into_iter().collect();
    tasks.push((GLOBAL_LABEL.to_string(), observations.iter().collect()));

    let estimates: Vec<(String, Vec<&PairedObservation>, TransferResult<Estimate>)> = tasks
        .into_par_iter()
        .map(|(label, group)| {
            let res = estimate_transfer_matrix(
                &group,
                &sources,
                &destinations,
                &request.solver,
                &label,
                cancel,
            );
            (label, group, res)
        })
        .collect();

    let groups = assemble_groups(estimates, &mut warnings)?;

    let focus = match focus_idx {
        Some(idx) => {
            let o = &observations[idx];
            let group_label = segmentation.assignments[idx].label.clone();
            let matrix = match groups.get(&group_label).or_else(|| groups.get(GLOBAL_LABEL)) {
                Some(g) => &g.matrix,
                None => {
                    return DataSnafu {
                        scope: format!("focus location {}", o.key),
                    }
                    .fail()
                }
            };
            Some(FocusedLocation {
                key: o.key.clone(),
                group_label,
                absolute: absolute_transfers(&[o], matrix),
            })
        }
        None => None,
    };

    let labeled: Vec<LabeledObservation> = observations
        .into_iter()
        .zip(segmentation.assignments.into_iter())
        .map(|(observation, assignment)| LabeledObservation {
            observation,
            assignment,
        })
        .collect();

    info!(
        "run_analysis: {} locations, {} matrices, {} warnings",
        labeled.len(),
        groups.len(),
        warnings.len()
    );
    Ok(AnalysisResult {
        report,
        observations: labeled,
        groups,
        warnings,
        focus,
    })
}
