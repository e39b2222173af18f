// k-means segmentation of the locations by their start election profile.

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeSet, HashMap};

use crate::config::*;
use crate::labels::{describe_centroid, LabelLanguage};

/// The result of clustering a set of observations.
#[derive(PartialEq, Debug, Clone)]
pub struct Segmentation {
    /// The feature columns, in choice order.
    pub features: Vec<Choice>,
    /// One per observation, in observation order.
    pub assignments: Vec<ClusterAssignment>,
    /// Indexed by group id.
    pub centroids: Vec<Vec<f64>>,
    /// Indexed by group id.
    pub labels: Vec<String>,
    pub inertia: f64,
    pub warnings: Vec<AnalysisWarning>,
}

/// Every choice present in the start election, abstention included.
pub fn feature_choices(observations: &[PairedObservation]) -> Vec<Choice> {
    let s: BTreeSet<Choice> = observations.iter().flat_map(|o| o.start.choices()).collect();
    s.into_iter().collect()
}

/// The census shares of the start election, not rescaled.
pub fn feature_vectors(observations: &[PairedObservation], features: &[Choice]) -> Vec<Vec<f64>> {
    observations
        .iter()
        .map(|o| features.iter().map(|c| o.start.share(*c)).collect())
        .collect()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (idx, c) in centroids.iter().enumerate() {
        let dist = squared_distance(point, c);
        if dist < best.1 {
            best = (idx, dist);
        }
    }
    best
}

/// k-means++ seeding.
fn initial_centroids(points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let n = points.len();
    let mut centroids = vec![points[rng.random_range(0..n)].clone()];
    while centroids.len() < k {
        let dists: Vec<f64> = points.iter().map(|p| nearest(p, &centroids).1).collect();
        let total: f64 = dists.iter().sum();
        let idx = if total > 0.0 {
            let mut target = rng.random_range(0.0..total);
            let mut chosen = n - 1;
            for (i, d) in dists.iter().enumerate() {
                if target < *d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        } else {
            // All the points coincide with a centroid.
            rng.random_range(0..n)
        };
        centroids.push(points[idx].clone());
    }
    centroids
}

struct Run {
    assignments: Vec<usize>,
    centroids: Vec<Vec<f64>>,
    inertia: f64,
}

fn lloyd(points: &[Vec<f64>], k: usize, max_iterations: usize, rng: &mut StdRng) -> Run {
    let dim = points.first().map(|p| p.len()).unwrap_or(0);
    let mut centroids = initial_centroids(points, k, rng);
    let mut assignments: Vec<usize> = points.iter().map(|p| nearest(p, &centroids).0).collect();

    for iteration in 0..max_iterations {
        let previous = assignments.clone();
        let mut sums = vec![vec![0.0; dim]; k];
        let mut counts = vec![0usize; k];
        for (p, a) in points.iter().zip(assignments.iter()) {
            counts[*a] += 1;
            for (s, v) in sums[*a].iter_mut().zip(p.iter()) {
                *s += v;
            }
        }
        for g in 0..k {
            if counts[g] > 0 {
                centroids[g] = sums[g].iter().map(|s| s / counts[g] as f64).collect();
            }
        }
        // Empty clusters take the point farthest from its centroid.
        for g in 0..k {
            if counts[g] == 0 {
                let far = points
                    .iter()
                    .zip(assignments.iter())
                    .enumerate()
                    .map(|(i, (p, a))| (i, squared_distance(p, &centroids[*a])))
                    .fold((0, -1.0), |acc, x| if x.1 > acc.1 { x } else { acc });
                centroids[g] = points[far.0].clone();
                assignments[far.0] = g;
            }
        }

        let next: Vec<usize> = points.iter().map(|p| nearest(p, &centroids).0).collect();
        let stable = next == previous;
        assignments = next;
        if stable {
            debug!("lloyd: stable after {} iterations", iteration + 1);
            break;
        }
    }

    let inertia = points
        .iter()
        .zip(assignments.iter())
        .map(|(p, a)| squared_distance(p, &centroids[*a]))
        .sum();
    Run {
        assignments,
        centroids,
        inertia,
    }
}

/// Clusters the observations into `settings.group_count` groups and names them.
///
/// The assignment is a deterministic function of the observations and the
/// settings. Group ids are numbered by first appearance in the observations.
pub fn segment(
    observations: &[PairedObservation],
    settings: &SegmenterSettings,
    language: LabelLanguage,
) -> TransferResult<Segmentation> {
    if observations.is_empty() {
        return DataSnafu {
            scope: "segmentation (no observations)".to_string(),
        }
        .fail();
    }
    if settings.group_count == 0 {
        return InvalidRequestSnafu {
            message: "the group count must be at least 1".to_string(),
        }
        .fail();
    }

    let mut warnings = Vec::new();
    let n = observations.len();
    let k = settings.group_count.min(n);
    if k < settings.group_count {
        let w = AnalysisWarning::GroupCountReduced {
            requested: settings.group_count,
            effective: k,
        };
        warn!("{}", w);
        warnings.push(w);
    }

    let features = feature_choices(observations);
    let points = feature_vectors(observations, &features);

    let mut rng = StdRng::seed_from_u64(settings.seed);
    let mut best: Option<Run> = None;
    for restart in 0..settings.restarts.max(1) {
        let run = lloyd(&points, k, settings.max_iterations, &mut rng);
        debug!("segment: restart {} inertia {:e}", restart, run.inertia);
        let better = match &best {
            Some(b) => run.inertia < b.inertia,
            None => true,
        };
        if better {
            best = Some(run);
        }
    }
    let best = match best {
        Some(b) => b,
        None => {
            return InvalidRequestSnafu {
                message: "no clustering run was performed".to_string(),
            }
            .fail()
        }
    };

    // Renumber by first appearance.
    let mut renumber: HashMap<usize, usize> = HashMap::new();
    for a in best.assignments.iter() {
        let next = renumber.len();
        renumber.entry(*a).or_insert(next);
    }
    let mut centroids = vec![Vec::new(); renumber.len()];
    for (old, new) in renumber.iter() {
        centroids[*new] = best.centroids[*old].clone();
    }

    let labels: Vec<String> = centroids
        .iter()
        .map(|c| {
            let shares: Vec<(Choice, f64)> =
                features.iter().cloned().zip(c.iter().cloned()).collect();
            describe_centroid(&shares, language)
        })
        .collect();

    let assignments: Vec<ClusterAssignment> = best
        .assignments
        .iter()
        .map(|a| {
            let group_id = renumber[a];
            ClusterAssignment {
                group_id,
                label: labels[group_id].clone(),
            }
        })
        .collect();

    info!(
        "segment: {} observations in {} groups, inertia {:e}: {:?}",
        n,
        labels.len(),
        best.inertia,
        labels
    );
    Ok(Segmentation {
        features,
        assignments,
        centroids,
        labels,
        inertia: best.inertia,
        warnings,
    })
}
