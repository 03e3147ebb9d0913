//! Nonlinear least squares for the two-parameter power law `y = a * x^b`
//!
//! Levenberg-Marquardt with Marquardt diagonal scaling. The parameter covariance is
//! the unweighted estimate `(JᵀJ)⁻¹ · SSR / (n - 2)` evaluated at the solution.

use crate::error::SolverError;

/// Relative tolerance on the sum of squares, same default as MINPACK
const FTOL: f64 = 1.49012e-8;

/// Damping at which no descent step is left and the current point is a minimum
const MAX_DAMPING: f64 = 1e16;

const MIN_DAMPING: f64 = 1e-15;

/// Relative determinant below which `JᵀJ` is treated as singular
const SINGULARITY_TOLERANCE: f64 = 1e-12;

/// Solver knobs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOptions {
    /// Starting point `(a, b)`
    pub initial_guess: (f64, f64),
    /// Cap on model evaluations
    pub max_iterations: usize,
    pub ftol: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self { initial_guess: (1.0, 1.0), max_iterations: crate::DEFAULT_MAX_ITERATIONS, ftol: FTOL }
    }
}

/// Converged power-law parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerLawFit {
    pub a: f64,
    pub b: f64,
    /// Row-major 2x2 covariance of `(a, b)`
    pub covariance: [[f64; 2]; 2],
    pub residual_sum_of_squares: f64,
    pub iterations: usize,
}

impl PowerLawFit {
    /// Standard errors of `(a, b)`
    pub fn standard_errors(&self) -> (f64, f64) {
        (self.covariance[0][0].sqrt(), self.covariance[1][1].sqrt())
    }

    pub fn degrees_of_freedom(observations: usize) -> usize {
        observations.saturating_sub(2)
    }
}

/// Fit `ys ≈ a * xs^b`. `xs` must be positive.
pub fn fit_power_law(
    xs: &[f64],
    ys: &[f64],
    options: &SolverOptions,
) -> Result<PowerLawFit, SolverError> {
    debug_assert_eq!(xs.len(), ys.len());
    let n = xs.len().min(ys.len());
    let dof = PowerLawFit::degrees_of_freedom(n);
    if dof == 0 {
        return Err(SolverError::InvalidDegreesOfFreedom { degrees_of_freedom: dof });
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);

    let (mut a, mut b) = options.initial_guess;
    let mut ssr = sum_of_squares(xs, ys, a, b);
    if !ssr.is_finite() {
        return Err(SolverError::NonFinite);
    }

    // Residuals at the rounding-noise level of the targets count as an exact fit
    let exact_fit = 1e-24 * ys.iter().map(|y| y * y).sum::<f64>();

    let mut lambda = 1e-3;
    let mut evaluations = 0;
    let mut converged = ssr <= exact_fit;

    while !converged {
        let (jtj, jtr) = normal_equations(xs, ys, a, b);
        if !all_finite(&jtj, &jtr) {
            return Err(SolverError::NonFinite);
        }

        // Gauss-Newton step predicts no meaningful improvement: at a minimum
        if let Some(step) = solve(&jtj, &jtr) {
            let predicted = step[0] * jtr[0] + step[1] * jtr[1];
            if predicted <= options.ftol * ssr {
                break;
            }
        }

        loop {
            if evaluations >= options.max_iterations {
                return Err(SolverError::NonConvergence { iterations: evaluations });
            }
            evaluations += 1;

            let damped = [
                [jtj[0][0] + lambda * jtj[0][0].max(f64::MIN_POSITIVE), jtj[0][1]],
                [jtj[1][0], jtj[1][1] + lambda * jtj[1][1].max(f64::MIN_POSITIVE)],
            ];

            if let Some(step) = solve(&damped, &jtr) {
                let (cand_a, cand_b) = (a + step[0], b + step[1]);
                let cand_ssr = sum_of_squares(xs, ys, cand_a, cand_b);
                if cand_ssr.is_finite() && cand_ssr < ssr {
                    let reduction = ssr - cand_ssr;
                    let near_gauss_newton = lambda <= 1e-3;
                    a = cand_a;
                    b = cand_b;
                    ssr = cand_ssr;
                    lambda = (lambda * 0.1).max(MIN_DAMPING);
                    converged = ssr <= exact_fit
                        || (near_gauss_newton && reduction <= options.ftol * (ssr + reduction));
                    break;
                }
            }

            lambda *= 10.0;
            if lambda > MAX_DAMPING {
                converged = true;
                break;
            }
        }
    }

    let covariance = covariance(xs, ys, a, b, ssr, dof)?;
    Ok(PowerLawFit { a, b, covariance, residual_sum_of_squares: ssr, iterations: evaluations })
}

fn sum_of_squares(xs: &[f64], ys: &[f64], a: f64, b: f64) -> f64 {
    xs.iter()
        .zip(ys)
        .map(|(&x, &y)| {
            let r = y - a * x.powf(b);
            r * r
        })
        .sum()
}

/// `JᵀJ` and `Jᵀr` for the model `a * x^b` at `(a, b)`
fn normal_equations(xs: &[f64], ys: &[f64], a: f64, b: f64) -> ([[f64; 2]; 2], [f64; 2]) {
    let mut jtj = [[0.0; 2]; 2];
    let mut jtr = [0.0; 2];

    for (&x, &y) in xs.iter().zip(ys) {
        let xb = x.powf(b);
        let da = xb;
        let db = a * xb * x.ln();
        let r = y - a * xb;

        jtj[0][0] += da * da;
        jtj[0][1] += da * db;
        jtj[1][1] += db * db;
        jtr[0] += da * r;
        jtr[1] += db * r;
    }
    jtj[1][0] = jtj[0][1];

    (jtj, jtr)
}

fn covariance(
    xs: &[f64],
    ys: &[f64],
    a: f64,
    b: f64,
    ssr: f64,
    dof: usize,
) -> Result<[[f64; 2]; 2], SolverError> {
    let (jtj, _) = normal_equations(xs, ys, a, b);
    let inverse = invert(&jtj).ok_or(SolverError::SingularCovariance)?;

    let scale = ssr / dof as f64;
    let cov = [
        [inverse[0][0] * scale, inverse[0][1] * scale],
        [inverse[1][0] * scale, inverse[1][1] * scale],
    ];

    if !all_finite(&cov, &[0.0, 0.0]) {
        return Err(SolverError::NonFinite);
    }
    if cov[0][0] < 0.0 || cov[1][1] < 0.0 {
        return Err(SolverError::SingularCovariance);
    }
    Ok(cov)
}

fn determinant(m: &[[f64; 2]; 2]) -> Option<f64> {
    let det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
    let scale = (m[0][0] * m[1][1]).abs().max((m[0][1] * m[1][0]).abs());
    if !det.is_finite() || scale == 0.0 || det.abs() <= SINGULARITY_TOLERANCE * scale {
        None
    } else {
        Some(det)
    }
}

fn invert(m: &[[f64; 2]; 2]) -> Option<[[f64; 2]; 2]> {
    let det = determinant(m)?;
    Some([[m[1][1] / det, -m[0][1] / det], [-m[1][0] / det, m[0][0] / det]])
}

fn solve(m: &[[f64; 2]; 2], rhs: &[f64; 2]) -> Option<[f64; 2]> {
    let det = determinant(m)?;
    Some([
        (rhs[0] * m[1][1] - m[0][1] * rhs[1]) / det,
        (m[0][0] * rhs[1] - m[1][0] * rhs[0]) / det,
    ])
}

fn all_finite(m: &[[f64; 2]; 2], v: &[f64; 2]) -> bool {
    m.iter().flatten().chain(v.iter()).all(|x| x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovers_exact_power_law() {
        let xs = [1.0, 4.0, 9.0, 16.0, 25.0];
        let ys: Vec<f64> = xs.iter().map(|x: &f64| 2.0 * x.sqrt()).collect();

        let fit = fit_power_law(&xs, &ys, &SolverOptions::default()).unwrap();
        assert!((fit.a - 2.0).abs() < 1e-6, "a = {}", fit.a);
        assert!((fit.b - 0.5).abs() < 1e-6, "b = {}", fit.b);
        assert!(fit.residual_sum_of_squares < 1e-9);
    }

    #[test]
    fn test_noisy_fit_is_close() {
        let noise = [0.02, -0.015, 0.01, -0.02, 0.005, 0.0, -0.01, 0.015];
        let xs: Vec<f64> = (1..=8).map(|i| 10.0 * i as f64).collect();
        let ys: Vec<f64> =
            xs.iter().zip(noise).map(|(x, e)| 3.0 * x.powf(0.8) * (1.0 + e)).collect();

        let fit = fit_power_law(&xs, &ys, &SolverOptions::default()).unwrap();
        assert!((fit.a - 3.0).abs() < 0.3, "a = {}", fit.a);
        assert!((fit.b - 0.8).abs() < 0.05, "b = {}", fit.b);

        let (se_a, se_b) = fit.standard_errors();
        assert!(se_a > 0.0 && se_a.is_finite());
        assert!(se_b > 0.0 && se_b.is_finite());
    }

    #[test]
    fn test_retail_scale_costs() {
        // Sell price roughly 1.25x cost over a wide cost range
        let xs = [120.0, 450.0, 980.0, 1500.0, 2300.0, 4100.0];
        let ys: Vec<f64> = xs.iter().map(|x: &f64| 1.6 * x.powf(0.97)).collect();

        let fit = fit_power_law(&xs, &ys, &SolverOptions::default()).unwrap();
        assert!((fit.a - 1.6).abs() < 1e-3, "a = {}", fit.a);
        assert!((fit.b - 0.97).abs() < 1e-4, "b = {}", fit.b);
    }

    #[test]
    fn test_needs_more_points_than_parameters() {
        let err = fit_power_law(&[1.0, 2.0], &[1.0, 2.0], &SolverOptions::default()).unwrap_err();
        assert_eq!(err, SolverError::InvalidDegreesOfFreedom { degrees_of_freedom: 0 });
    }

    #[test]
    fn test_identical_costs_cannot_identify_both_parameters() {
        let xs = [5.0, 5.0, 5.0, 5.0];
        let ys = [6.0, 6.5, 5.5, 6.2];
        assert!(fit_power_law(&xs, &ys, &SolverOptions::default()).is_err());
    }

    #[test]
    fn test_iteration_cap_is_enforced() {
        let xs = [1.0, 4.0, 9.0, 16.0, 25.0];
        let ys: Vec<f64> = xs.iter().map(|x: &f64| 2.0 * x.sqrt() + 0.1).collect();
        let options = SolverOptions { max_iterations: 1, ..Default::default() };

        match fit_power_law(&xs, &ys, &options) {
            Err(SolverError::NonConvergence { iterations }) => assert_eq!(iterations, 1),
            other => panic!("expected non-convergence, got {:?}", other),
        }
    }

    #[test]
    fn test_deterministic() {
        let xs = [2.0, 3.0, 5.0, 7.0, 11.0];
        let ys = [3.1, 4.0, 5.8, 7.1, 10.2];
        let first = fit_power_law(&xs, &ys, &SolverOptions::default()).unwrap();
        let second = fit_power_law(&xs, &ys, &SolverOptions::default()).unwrap();
        assert_eq!(first, second);
    }
}
