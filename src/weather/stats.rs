//! Small descriptive statistics over `f64` samples.
//!
//! All functions ignore NaN and return `None` for an empty input.

fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = finite(values);
    v.sort_by(f64::total_cmp);
    v
}

#[must_use]
pub fn min(values: &[f64]) -> Option<f64> {
    finite(values).into_iter().reduce(f64::min)
}

#[must_use]
pub fn max(values: &[f64]) -> Option<f64> {
    finite(values).into_iter().reduce(f64::max)
}

#[must_use]
pub fn sum(values: &[f64]) -> Option<f64> {
    let v = finite(values);
    (!v.is_empty()).then(|| v.iter().sum())
}

#[must_use]
pub fn mean(values: &[f64]) -> Option<f64> {
    let v = finite(values);
    #[allow(clippy::cast_precision_loss)]
    (!v.is_empty()).then(|| v.iter().sum::<f64>() / v.len() as f64)
}

/// Linearly interpolated quantile, `q` in `0.0..=1.0`.
#[must_use]
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let v = sorted(values);
    if v.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let pos = q.clamp(0.0, 1.0) * (v.len() - 1) as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (lo, hi) = (pos.floor() as usize, pos.ceil() as usize);
    #[allow(clippy::cast_precision_loss)]
    let frac = pos - lo as f64;
    Some(v[lo] + (v[hi] - v[lo]) * frac)
}

#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// Five-number summary: min, q1, median, q3, max.
#[must_use]
pub fn five_numbers(values: &[f64]) -> Option<[f64; 5]> {
    Some([
        quantile(values, 0.0)?,
        quantile(values, 0.25)?,
        quantile(values, 0.5)?,
        quantile(values, 0.75)?,
        quantile(values, 1.0)?,
    ])
}

/// Trailing moving average. Until the window fills, the average covers the
/// samples seen so far.
#[must_use]
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(values.len());
    let mut acc = 0.0;
    for (i, v) in values.iter().enumerate() {
        acc += v;
        if i >= window {
            acc -= values[i - window];
        }
        #[allow(clippy::cast_precision_loss)]
        out.push(acc / (i + 1).min(window) as f64);
    }
    out
}
