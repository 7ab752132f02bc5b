//! Derivative-free local minimization.
//!
//! The fitting-factor search only needs a bounded-effort local optimizer
//! that converges on smooth unimodal regions; [`LocalMinimizer`] is the
//! seam and [`NelderMead`] the provided simplex implementation.

use log::debug;

/// Result of one local minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    /// Location of the best vertex found.
    pub x: Vec<f64>,
    /// Objective value there.
    pub value: f64,
    /// Objective evaluations spent.
    pub evaluations: usize,
    /// Whether both tolerance criteria were met before the budget ran out.
    pub converged: bool,
}

/// A bounded-effort local minimizer over `R^n`.
pub trait LocalMinimizer {
    /// Minimize `f` starting from `x0`.
    fn minimize(&self, f: &mut dyn FnMut(&[f64]) -> f64, x0: &[f64]) -> Minimum;
}

/// Downhill-simplex minimization with the usual
/// reflection/expansion/contraction/shrink moves.
///
/// Converges when the simplex diameter falls below `xtol` *and* the spread
/// of objective values falls below `ftol`; the evaluation budget bounds
/// runtime on flat or noisy surfaces either way.
#[derive(Debug, Clone, PartialEq)]
pub struct NelderMead {
    /// Convergence tolerance on the simplex extent, per coordinate.
    pub xtol: f64,
    /// Convergence tolerance on the objective-value spread.
    pub ftol: f64,
    /// Hard cap on objective evaluations.
    pub max_evaluations: usize,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            xtol: 1e-3,
            ftol: 1e-3,
            max_evaluations: 10_000,
        }
    }
}

impl NelderMead {
    /// Set both convergence tolerances.
    pub fn with_tolerances(mut self, xtol: f64, ftol: f64) -> Self {
        self.xtol = xtol;
        self.ftol = ftol;
        self
    }

    /// Set the evaluation budget.
    pub fn with_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.max_evaluations = max_evaluations;
        self
    }
}

// Standard simplex coefficients.
const RHO: f64 = 1.0; // reflection
const CHI: f64 = 2.0; // expansion
const PSI: f64 = 0.5; // contraction
const SIGMA: f64 = 0.5; // shrink

// Initial-simplex perturbations: relative for nonzero coordinates,
// absolute for zero ones.
const NONZERO_DELTA: f64 = 0.05;
const ZERO_DELTA: f64 = 0.00025;

impl LocalMinimizer for NelderMead {
    fn minimize(&self, f: &mut dyn FnMut(&[f64]) -> f64, x0: &[f64]) -> Minimum {
        let n = x0.len();
        assert!(n > 0, "cannot minimize over zero dimensions");

        let mut evaluations = 0;
        let mut eval = |x: &[f64], count: &mut usize| {
            *count += 1;
            f(x)
        };

        // Initial simplex: the start plus one perturbed vertex per axis.
        let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
        simplex.push(x0.to_vec());
        for k in 0..n {
            let mut vertex = x0.to_vec();
            if vertex[k] != 0.0 {
                vertex[k] *= 1.0 + NONZERO_DELTA;
            } else {
                vertex[k] = ZERO_DELTA;
            }
            simplex.push(vertex);
        }
        let mut values: Vec<f64> = simplex
            .iter()
            .map(|v| eval(v, &mut evaluations))
            .collect();

        let mut converged = false;
        while evaluations < self.max_evaluations {
            // Best vertex first, worst last.
            let mut order: Vec<usize> = (0..=n).collect();
            order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap());
            simplex = order.iter().map(|&i| simplex[i].clone()).collect();
            values = order.iter().map(|&i| values[i]).collect();

            let x_spread = simplex[1..]
                .iter()
                .flat_map(|v| v.iter().zip(&simplex[0]).map(|(a, b)| (a - b).abs()))
                .fold(0.0, f64::max);
            let f_spread = values[1..]
                .iter()
                .map(|v| (v - values[0]).abs())
                .fold(0.0, f64::max);
            if x_spread <= self.xtol && f_spread <= self.ftol {
                converged = true;
                break;
            }

            // Centroid of everything but the worst vertex.
            let mut centroid = vec![0.0; n];
            for vertex in &simplex[..n] {
                for (c, x) in centroid.iter_mut().zip(vertex) {
                    *c += x / n as f64;
                }
            }
            let worst = simplex[n].clone();
            let blend = |a: f64, b: f64| -> Vec<f64> {
                centroid
                    .iter()
                    .zip(&worst)
                    .map(|(c, w)| a * c + b * w)
                    .collect()
            };

            let x_reflect = blend(1.0 + RHO, -RHO);
            let f_reflect = eval(&x_reflect, &mut evaluations);

            if f_reflect < values[0] {
                let x_expand = blend(1.0 + RHO * CHI, -RHO * CHI);
                let f_expand = eval(&x_expand, &mut evaluations);
                if f_expand < f_reflect {
                    simplex[n] = x_expand;
                    values[n] = f_expand;
                } else {
                    simplex[n] = x_reflect;
                    values[n] = f_reflect;
                }
            } else if f_reflect < values[n - 1] {
                simplex[n] = x_reflect;
                values[n] = f_reflect;
            } else if f_reflect < values[n] {
                // Outside contraction.
                let x_contract = blend(1.0 + PSI * RHO, -PSI * RHO);
                let f_contract = eval(&x_contract, &mut evaluations);
                if f_contract <= f_reflect {
                    simplex[n] = x_contract;
                    values[n] = f_contract;
                } else {
                    shrink(&mut simplex, &mut values, &mut eval, &mut evaluations);
                }
            } else {
                // Inside contraction.
                let x_contract = blend(1.0 - PSI, PSI);
                let f_contract = eval(&x_contract, &mut evaluations);
                if f_contract < values[n] {
                    simplex[n] = x_contract;
                    values[n] = f_contract;
                } else {
                    shrink(&mut simplex, &mut values, &mut eval, &mut evaluations);
                }
            }
        }

        let best = (0..=n)
            .min_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap())
            .unwrap();
        debug!(
            "simplex finished after {evaluations} evaluations (converged: {converged})"
        );
        Minimum {
            x: simplex[best].clone(),
            value: values[best],
            evaluations,
            converged,
        }
    }
}

fn shrink(
    simplex: &mut [Vec<f64>],
    values: &mut [f64],
    eval: &mut impl FnMut(&[f64], &mut usize) -> f64,
    evaluations: &mut usize,
) {
    let best = simplex[0].clone();
    for i in 1..simplex.len() {
        for (x, b) in simplex[i].iter_mut().zip(&best) {
            *x = b + SIGMA * (*x - b);
        }
        values[i] = eval(&simplex[i], evaluations);
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn quadratic_bowl_converges() {
        let mut f = |x: &[f64]| (x[0] - 3.0).powi(2) + 2.0 * (x[1] + 1.0).powi(2);
        let result = NelderMead::default().minimize(&mut f, &[0.0, 0.0]);

        assert!(result.converged);
        assert_abs_diff_eq!(result.x[0], 3.0, epsilon = 5e-3);
        assert_abs_diff_eq!(result.x[1], -1.0, epsilon = 5e-3);
        assert!(result.value < 1e-4);
    }

    #[test]
    fn rosenbrock_reaches_the_valley_floor() {
        let mut f = |x: &[f64]| {
            100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2)
        };
        let result = NelderMead::default()
            .with_tolerances(1e-6, 1e-6)
            .minimize(&mut f, &[-1.2, 1.0]);

        assert_abs_diff_eq!(result.x[0], 1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(result.x[1], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn evaluation_budget_is_a_hard_cap() {
        // Oscillatory surface that never satisfies the tolerances.
        let mut f = |x: &[f64]| (1e6 * x[0]).sin() + (1e6 * x[1]).cos();
        let result = NelderMead::default()
            .with_max_evaluations(200)
            .minimize(&mut f, &[0.3, 0.7]);

        assert!(!result.converged);
        // One move costs at most 2 + n evaluations past the budget check.
        assert!(result.evaluations <= 204);
    }

    #[test]
    fn flat_objective_terminates_immediately() {
        let mut f = |_: &[f64]| 1.0;
        let result = NelderMead::default().minimize(&mut f, &[5.0, -2.0]);
        assert!(result.converged);
        assert_abs_diff_eq!(result.value, 1.0);
    }

    #[test]
    fn one_dimensional_minimization_works() {
        let mut f = |x: &[f64]| (x[0] - 0.25).powi(2);
        let result = NelderMead::default().minimize(&mut f, &[10.0]);
        assert!(result.converged);
        assert_abs_diff_eq!(result.x[0], 0.25, epsilon = 5e-3);
    }
}
