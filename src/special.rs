//! Special functions not covered by `statrs`.

const MAX_SERIES_TERMS: usize = 200_000;
const SERIES_TOLERANCE: f64 = 1e-15;

/// Gauss hypergeometric function 2F1(a, b; c; z) for 0 <= z < 1, summed as a
/// power series. Returns `None` when the series overflows or does not settle.
pub fn hyp2f1(a: f64, b: f64, c: f64, z: f64) -> Option<f64> {
    if !(0.0..1.0).contains(&z) || !a.is_finite() || !b.is_finite() || !c.is_finite() {
        return None;
    }
    if c <= 0.0 && c.fract() == 0.0 {
        return None;
    }
    if z == 0.0 {
        return Some(1.0);
    }

    let mut term = 1.0_f64;
    let mut sum = 1.0_f64;
    for k in 0..MAX_SERIES_TERMS {
        let k = k as f64;
        let ratio = (a + k) * (b + k) / ((c + k) * (k + 1.0)) * z;
        term *= ratio;
        sum += term;
        if !sum.is_finite() {
            return None;
        }
        if term == 0.0 {
            return Some(sum);
        }
        if term.abs() <= SERIES_TOLERANCE * sum.abs() && ratio.abs() < 1.0 {
            return Some(sum);
        }
    }
    None
}

/// Natural log of 2F1(a, b; c; z). Falls back to Euler's transformation
/// 2F1(a, b; c; z) = (1 - z)^(c - a - b) 2F1(c - a, c - b; c; z) when the direct
/// series overflows.
pub fn ln_hyp2f1(a: f64, b: f64, c: f64, z: f64) -> Option<f64> {
    if let Some(value) = hyp2f1(a, b, c, z) {
        if value > 0.0 {
            return Some(value.ln());
        }
    }
    let transformed = hyp2f1(c - a, c - b, c, z)?;
    if transformed <= 0.0 {
        return None;
    }
    Some(transformed.ln() + (c - a - b) * (1.0 - z).ln())
}
