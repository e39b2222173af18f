// Census-weighted constrained least squares for the transfer matrix.
//
// The problem solved for a set of observations is
//
//   minimize  Σ_i w_i ‖Y_i − X_i P‖²
//   s.t.      every row of P lies on the probability simplex
//
// where X_i (resp. Y_i) holds the start (resp. end) census shares of
// location i and w_i its start census rescaled to an average of 1.
//
// The objective only depends on the normal matrices A = XᵀWX, B = XᵀWY and
// the constant c = Σ w_i ‖Y_i‖², so the solver never looks at the
// observations again once they are built. It is an accelerated projected
// gradient (FISTA) with backtracking and adaptive restart. Since the
// projection onto the simplex is exact, every iterate satisfies the row-sum
// and box constraints.

use log::{debug, warn};

use crate::config::*;

/// How often (in iterations) the cancellation flag is checked.
const CANCEL_POLL_INTERVAL: u32 = 256;
const POWER_ITERATIONS: usize = 100;
const MAX_BACKTRACKS: usize = 60;

/// The share vectors and weights of a set of observations.
struct WeightedShares {
    /// n x r, row-major.
    x: Vec<f64>,
    /// n x d, row-major.
    y: Vec<f64>,
    weights: Vec<f64>,
}

/// Start census of each observation, divided by the mean census.
///
/// A zero census counts as a census of 1. Such a location has all-zero shares,
/// so it does not move the fit, but it still takes part in `weighted_mse`.
fn normalized_weights(observations: &[&PairedObservation]) -> Vec<f64> {
    let census: Vec<f64> = observations
        .iter()
        .map(|o| match o.start.census {
            0 => 1.0,
            c => c as f64,
        })
        .collect();
    let mean = census.iter().sum::<f64>() / census.len().max(1) as f64;
    census.iter().map(|c| c / mean).collect()
}

impl WeightedShares {
    fn new(
        observations: &[&PairedObservation],
        sources: &[Choice],
        destinations: &[Choice],
    ) -> WeightedShares {
        let mut x = Vec::with_capacity(observations.len() * sources.len());
        let mut y = Vec::with_capacity(observations.len() * destinations.len());
        for o in observations.iter() {
            x.extend(sources.iter().map(|c| o.start.share(*c)));
            y.extend(destinations.iter().map(|c| o.end.share(*c)));
        }
        WeightedShares {
            x,
            y,
            weights: normalized_weights(observations),
        }
    }
}

/// The quadratic objective f(P) = tr(PᵀAP) − 2 tr(PᵀB) + c.
struct NormalEquations {
    r: usize,
    d: usize,
    /// r x r, symmetric positive semi-definite.
    a: Vec<f64>,
    /// r x d.
    b: Vec<f64>,
    c: f64,
}

impl NormalEquations {
    fn new(shares: &WeightedShares, r: usize, d: usize) -> NormalEquations {
        let mut a = vec![0.0; r * r];
        let mut b = vec![0.0; r * d];
        let mut c = 0.0;
        for (i, w) in shares.weights.iter().enumerate() {
            let xi = &shares.x[i * r..(i + 1) * r];
            let yi = &shares.y[i * d..(i + 1) * d];
            for j in 0..r {
                let wx = w * xi[j];
                if wx == 0.0 {
                    continue;
                }
                for k in 0..r {
                    a[j * r + k] += wx * xi[k];
                }
                for k in 0..d {
                    b[j * d + k] += wx * yi[k];
                }
            }
            c += w * yi.iter().map(|v| v * v).sum::<f64>();
        }
        NormalEquations { r, d, a, b, c }
    }

    /// A · P, r x d.
    fn a_times(&self, p: &[f64]) -> Vec<f64> {
        let (r, d) = (self.r, self.d);
        let mut res = vec![0.0; r * d];
        for j in 0..r {
            for k in 0..r {
                let ajk = self.a[j * r + k];
                if ajk == 0.0 {
                    continue;
                }
                for l in 0..d {
                    res[j * d + l] += ajk * p[k * d + l];
                }
            }
        }
        res
    }

    fn objective(&self, p: &[f64]) -> f64 {
        let ap = self.a_times(p);
        let quad: f64 = p.iter().zip(ap.iter()).map(|(x, y)| x * y).sum();
        let lin: f64 = p.iter().zip(self.b.iter()).map(|(x, y)| x * y).sum();
        quad - 2.0 * lin + self.c
    }

    /// The objective and its gradient 2(AP − B) at p.
    fn objective_and_gradient(&self, p: &[f64]) -> (f64, Vec<f64>) {
        let ap = self.a_times(p);
        let quad: f64 = p.iter().zip(ap.iter()).map(|(x, y)| x * y).sum();
        let lin: f64 = p.iter().zip(self.b.iter()).map(|(x, y)| x * y).sum();
        let grad = ap
            .iter()
            .zip(self.b.iter())
            .map(|(x, y)| 2.0 * (x - y))
            .collect();
        (quad - 2.0 * lin + self.c, grad)
    }

    /// An upper estimate of the Lipschitz constant 2 λmax(A) of the gradient.
    fn lipschitz_estimate(&self) -> f64 {
        let r = self.r;
        let trace: f64 = (0..r).map(|j| self.a[j * r + j]).sum();
        if trace <= 0.0 {
            return 0.0;
        }
        let mut v = vec![1.0 / (r as f64).sqrt(); r];
        let mut lambda = 0.0;
        for _ in 0..POWER_ITERATIONS {
            let mut av = vec![0.0; r];
            for j in 0..r {
                for k in 0..r {
                    av[j] += self.a[j * r + k] * v[k];
                }
            }
            let norm = av.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm == 0.0 {
                break;
            }
            lambda = norm;
            v = av.iter().map(|x| x / norm).collect();
        }
        // Trace bounds λmax from above for a PSD matrix.
        (2.0 * 1.05 * lambda).min(2.0 * trace).max(f64::MIN_POSITIVE)
    }
}

/// Euclidean projection of `v` onto the probability simplex, in place.
pub fn project_onto_simplex(v: &mut [f64]) {
    if v.is_empty() {
        return;
    }
    let mut u: Vec<f64> = v.to_vec();
    u.sort_by(|a, b| b.total_cmp(a));
    let mut cumsum = 0.0;
    let mut theta = 0.0;
    for (j, uj) in u.iter().enumerate() {
        cumsum += uj;
        let t = (cumsum - 1.0) / (j + 1) as f64;
        if uj - t > 0.0 {
            theta = t;
        }
    }
    for x in v.iter_mut() {
        *x = (*x - theta).max(0.0);
    }
}

fn project_rows(p: &mut [f64], d: usize) {
    for row in p.chunks_mut(d) {
        project_onto_simplex(row);
    }
}

fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

/// The projected gradient step at `p`, as a maximum entry change.
fn stationarity_residual(eqs: &NormalEquations, p: &[f64], lipschitz: f64) -> f64 {
    let (_, grad) = eqs.objective_and_gradient(p);
    let mut q: Vec<f64> = p
        .iter()
        .zip(grad.iter())
        .map(|(x, g)| x - g / lipschitz)
        .collect();
    project_rows(&mut q, eqs.d);
    max_abs_diff(&q, p)
}

struct SolverOutcome {
    values: Vec<f64>,
    status: SolveStatus,
}

fn solve(
    eqs: &NormalEquations,
    settings: &SolverSettings,
    cancel: &CancelToken,
) -> TransferResult<SolverOutcome> {
    let (r, d) = (eqs.r, eqs.d);
    let start = vec![1.0 / d as f64; r * d];

    let mut lipschitz = eqs.lipschitz_estimate();
    if lipschitz <= f64::MIN_POSITIVE {
        // No source share anywhere: every matrix fits equally well.
        debug!("solve: degenerate normal matrix, keeping the uniform start");
        return Ok(SolverOutcome {
            values: start,
            status: SolveStatus::Converged { iterations: 0 },
        });
    }
    debug!("solve: r={} d={} initial lipschitz={:e}", r, d, lipschitz);

    let mut x = start.clone();
    let mut y = start.clone();
    let mut t = 1.0_f64;
    let mut best = start;
    let mut best_obj = eqs.objective(&best);
    let mut residual = f64::INFINITY;

    for iteration in 0..settings.max_iterations {
        if iteration % CANCEL_POLL_INTERVAL == 0 && cancel.is_cancelled() {
            debug!("solve: cancelled at iteration {}", iteration);
            return CancelledSnafu {}.fail();
        }

        let (f_y, grad) = eqs.objective_and_gradient(&y);
        let mut x_new;
        let mut backtracks = 0;
        loop {
            x_new = y
                .iter()
                .zip(grad.iter())
                .map(|(v, g)| v - g / lipschitz)
                .collect::<Vec<f64>>();
            project_rows(&mut x_new, d);
            let diff: Vec<f64> = x_new.iter().zip(y.iter()).map(|(a, b)| a - b).collect();
            let linear: f64 = diff.iter().zip(grad.iter()).map(|(a, g)| a * g).sum();
            let sq: f64 = diff.iter().map(|a| a * a).sum();
            let bound = f_y + linear + 0.5 * lipschitz * sq;
            let slack = 1e-12 * (1.0 + f_y.abs());
            if eqs.objective(&x_new) <= bound + slack || backtracks >= MAX_BACKTRACKS {
                break;
            }
            lipschitz *= 2.0;
            backtracks += 1;
        }

        let f_new = eqs.objective(&x_new);
        if f_new < best_obj {
            best_obj = f_new;
            best = x_new.clone();
        }

        residual = stationarity_residual(eqs, &x_new, lipschitz);
        if residual <= settings.tolerance {
            debug!(
                "solve: converged after {} iterations, objective {:e}",
                iteration + 1,
                best_obj
            );
            return Ok(SolverOutcome {
                values: best,
                status: SolveStatus::Converged {
                    iterations: iteration + 1,
                },
            });
        }

        // Restart the momentum when it points uphill.
        let uphill: f64 = y
            .iter()
            .zip(x_new.iter())
            .zip(x.iter())
            .map(|((yv, xn), xo)| (yv - xn) * (xn - xo))
            .sum();
        if uphill > 0.0 {
            t = 1.0;
        }
        let t_new = 0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt());
        let momentum = (t - 1.0) / t_new;
        y = x_new
            .iter()
            .zip(x.iter())
            .map(|(xn, xo)| xn + momentum * (xn - xo))
            .collect();
        x = x_new;
        t = t_new;
    }

    debug!(
        "solve: iteration budget exhausted, residual {:e}, objective {:e}",
        residual, best_obj
    );
    Ok(SolverOutcome {
        values: best,
        status: SolveStatus::BestEffort {
            iterations: settings.max_iterations,
            residual,
        },
    })
}

/// Estimates the transfer matrix of a set of observations.
///
/// `group` only names the observations in warnings and errors.
pub fn estimate_transfer_matrix(
    observations: &[&PairedObservation],
    sources: &[Choice],
    destinations: &[Choice],
    settings: &SolverSettings,
    group: &str,
    cancel: &CancelToken,
) -> TransferResult<Estimate> {
    if observations.is_empty() {
        return DataSnafu {
            scope: format!("group {:?}", group),
        }
        .fail();
    }
    if sources.is_empty() || destinations.is_empty() {
        return InvalidRequestSnafu {
            message: format!(
                "group {:?}: the matrix needs at least one source and one destination",
                group
            ),
        }
        .fail();
    }

    let mut warnings = Vec::new();
    let n = observations.len();
    if n < sources.len() || n < 2 {
        let w = AnalysisWarning::Underdetermined {
            group: group.to_string(),
            observations: n,
            source_parties: sources.len(),
        };
        warn!("{}", w);
        warnings.push(w);
    }

    let shares = WeightedShares::new(observations, sources, destinations);
    let eqs = NormalEquations::new(&shares, sources.len(), destinations.len());
    let outcome = solve(&eqs, settings, cancel)?;

    if let SolveStatus::BestEffort {
        iterations,
        residual,
    } = outcome.status
    {
        let w = AnalysisWarning::NonConvergence {
            group: group.to_string(),
            iterations,
            residual,
        };
        warn!("{}", w);
        warnings.push(w);
    }

    let matrix = TransferMatrix {
        sources: sources.to_vec(),
        destinations: destinations.to_vec(),
        values: outcome.values,
    };
    let mse = weighted_mse(observations, &matrix);
    debug!(
        "estimate_transfer_matrix: group {:?}: {} observations, status {:?}, weighted mse {:e}",
        group, n, outcome.status, mse
    );
    Ok(Estimate {
        matrix,
        status: outcome.status,
        weighted_mse: mse,
        warnings,
    })
}

/// The census-weighted mean squared error of a matrix on a set of observations.
///
/// Weights use the same normalization as the estimator.
pub fn weighted_mse(observations: &[&PairedObservation], matrix: &TransferMatrix) -> f64 {
    let d = matrix.destinations.len();
    if observations.is_empty() || d == 0 {
        return 0.0;
    }
    let shares = WeightedShares::new(observations, &matrix.sources, &matrix.destinations);
    let r = matrix.sources.len();
    let mut total = 0.0;
    for (i, w) in shares.weights.iter().enumerate() {
        let xi = &shares.x[i * r..(i + 1) * r];
        let yi = &shares.y[i * d..(i + 1) * d];
        let err: f64 = (0..d)
            .map(|c| {
                let pred: f64 = (0..r).map(|j| xi[j] * matrix.get(j, c)).sum();
                (yi[c] - pred).powi(2)
            })
            .sum();
        total += w * err;
    }
    let weight_sum: f64 = shares.weights.iter().sum();
    total / (weight_sum * d as f64)
}

/// Converts a matrix into estimated voter counts over a set of observations.
pub fn absolute_transfers(
    observations: &[&PairedObservation],
    matrix: &TransferMatrix,
) -> AbsoluteTransfers {
    let source_totals: Vec<u64> = matrix
        .sources
        .iter()
        .map(|c| observations.iter().map(|o| o.start.count(*c)).sum())
        .collect();
    let actual_totals: Vec<u64> = matrix
        .destinations
        .iter()
        .map(|c| observations.iter().map(|o| o.end.count(*c)).sum())
        .collect();
    let d = matrix.destinations.len();
    let mut votes = Vec::with_capacity(matrix.values.len());
    for (j, total) in source_totals.iter().enumerate() {
        for c in 0..d {
            let v = (matrix.get(j, c) * *total as f64).round();
            votes.push(v.max(0.0) as u64);
        }
    }
    let estimated_totals: Vec<u64> = (0..d)
        .map(|c| (0..source_totals.len()).map(|j| votes[j * d + c]).sum())
        .collect();
    AbsoluteTransfers {
        sources: matrix.sources.clone(),
        destinations: matrix.destinations.clone(),
        votes,
        source_totals,
        estimated_totals,
        actual_totals,
    }
}
