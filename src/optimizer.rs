//! Quasi-Newton (BFGS) minimizer used for penalized maximum-likelihood fits.
//!
//! Gradients are central finite differences, so objectives only need to be
//! evaluable. Search is unconstrained; fitters optimize positive parameters in
//! log space.

use log::debug;
use thiserror::Error;

const ARMIJO_C1: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 60;
const RELATIVE_STEP: f64 = 1e-5;
const STALL_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimizeOptions {
    pub max_iterations: usize,
    /// Infinity-norm threshold on the gradient
    pub gradient_tolerance: f64,
}

impl Default for MinimizeOptions {
    fn default() -> Self {
        Self {
            max_iterations: 1_000,
            gradient_tolerance: 1e-7,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub gradient_norm: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MinimizeError {
    #[error("objective is not finite at {0:?}")]
    NonFiniteObjective(Vec<f64>),
    #[error("no convergence after {iterations} iterations (gradient norm {gradient_norm:.3e})")]
    NotConverged {
        iterations: usize,
        gradient_norm: f64,
    },
}

pub fn minimize<F>(
    objective: F,
    start: &[f64],
    options: MinimizeOptions,
) -> Result<Minimum, MinimizeError>
where
    F: Fn(&[f64]) -> f64,
{
    let n = start.len();
    let mut x = start.to_vec();
    let mut value = objective(&x);
    if !value.is_finite() {
        return Err(MinimizeError::NonFiniteObjective(x));
    }
    let mut gradient = numerical_gradient(&objective, &x)?;
    let mut inverse_hessian = identity(n);
    let mut first_update = true;
    // Looser bound for accepting a stalled search as a stationary point.
    let stall_gradient_tolerance = options.gradient_tolerance.sqrt().max(1e-4);

    for iteration in 0..options.max_iterations {
        let gradient_norm = infinity_norm(&gradient);
        if gradient_norm <= options.gradient_tolerance {
            return Ok(Minimum {
                x,
                value,
                iterations: iteration,
                gradient_norm,
            });
        }

        let mut direction = negate(&mat_vec(&inverse_hessian, &gradient));
        let mut slope = dot(&gradient, &direction);
        if !(slope < 0.0) {
            inverse_hessian = identity(n);
            direction = negate(&gradient);
            slope = -dot(&gradient, &gradient);
        }

        let Some((step, next_x, next_value)) =
            backtracking_line_search(&objective, &x, value, &direction, slope)
        else {
            if gradient_norm <= stall_gradient_tolerance {
                return Ok(Minimum {
                    x,
                    value,
                    iterations: iteration,
                    gradient_norm,
                });
            }
            return Err(MinimizeError::NotConverged {
                iterations: iteration,
                gradient_norm,
            });
        };

        let next_gradient = numerical_gradient(&objective, &next_x)?;
        let s: Vec<f64> = direction.iter().map(|d| d * step).collect();
        let y: Vec<f64> = next_gradient
            .iter()
            .zip(gradient.iter())
            .map(|(next, current)| next - current)
            .collect();
        let improvement = value - next_value;

        x = next_x;
        value = next_value;
        gradient = next_gradient;

        debug!(
            "BFGS iteration {}: objective {:.10}, step {:.3e}, gradient norm {:.3e}",
            iteration + 1,
            value,
            step,
            infinity_norm(&gradient)
        );

        if improvement.abs() <= STALL_TOLERANCE * value.abs().max(1.0)
            && infinity_norm(&gradient) <= stall_gradient_tolerance
        {
            return Ok(Minimum {
                gradient_norm: infinity_norm(&gradient),
                x,
                value,
                iterations: iteration + 1,
            });
        }

        let sy = dot(&s, &y);
        if sy > 1e-12 {
            if first_update {
                let scale = sy / dot(&y, &y);
                inverse_hessian = identity(n);
                for (i, row) in inverse_hessian.iter_mut().enumerate() {
                    row[i] = scale;
                }
                first_update = false;
            }
            bfgs_update(&mut inverse_hessian, &s, &y, sy);
        }
    }

    Err(MinimizeError::NotConverged {
        iterations: options.max_iterations,
        gradient_norm: infinity_norm(&gradient),
    })
}

fn backtracking_line_search<F>(
    objective: &F,
    x: &[f64],
    value: f64,
    direction: &[f64],
    slope: f64,
) -> Option<(f64, Vec<f64>, f64)>
where
    F: Fn(&[f64]) -> f64,
{
    let mut step = 1.0;
    for _ in 0..MAX_BACKTRACKS {
        let candidate: Vec<f64> = x
            .iter()
            .zip(direction.iter())
            .map(|(xi, di)| xi + step * di)
            .collect();
        let candidate_value = objective(&candidate);
        if candidate_value.is_finite() && candidate_value <= value + ARMIJO_C1 * step * slope {
            return Some((step, candidate, candidate_value));
        }
        step *= 0.5;
    }
    None
}

pub fn numerical_gradient<F>(objective: &F, x: &[f64]) -> Result<Vec<f64>, MinimizeError>
where
    F: Fn(&[f64]) -> f64,
{
    let mut gradient = Vec::with_capacity(x.len());
    let mut probe = x.to_vec();
    for i in 0..x.len() {
        let h = RELATIVE_STEP * x[i].abs().max(1.0);
        probe[i] = x[i] + h;
        let forward = objective(&probe);
        probe[i] = x[i] - h;
        let backward = objective(&probe);
        probe[i] = x[i];
        let derivative = (forward - backward) / (2.0 * h);
        if !derivative.is_finite() {
            return Err(MinimizeError::NonFiniteObjective(x.to_vec()));
        }
        gradient.push(derivative);
    }
    Ok(gradient)
}

fn bfgs_update(inverse_hessian: &mut [Vec<f64>], s: &[f64], y: &[f64], sy: f64) {
    let hy = mat_vec(inverse_hessian, y);
    let yhy = dot(y, &hy);
    let n = s.len();
    for i in 0..n {
        for j in 0..n {
            inverse_hessian[i][j] += (sy + yhy) * s[i] * s[j] / (sy * sy)
                - (hy[i] * s[j] + s[i] * hy[j]) / sy;
        }
    }
}

fn identity(n: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect()
}

fn mat_vec(matrix: &[Vec<f64>], vector: &[f64]) -> Vec<f64> {
    matrix.iter().map(|row| dot(row, vector)).collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn negate(vector: &[f64]) -> Vec<f64> {
    vector.iter().map(|v| -v).collect()
}

fn infinity_norm(vector: &[f64]) -> f64 {
    vector.iter().fold(0.0, |acc, v| acc.max(v.abs()))
}
