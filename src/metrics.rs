//! Reductions of prediction errors into scalar metrics.
//!
//! Every function returns `NaN` for empty inputs.

/// Guards the relative metrics against an all-zero target.
const REL_EPS: f64 = 1e-9;

fn mean<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), x| (sum + x, n + 1));

    sum / n as f64
}

fn mean_abs(values: &[f32]) -> f64 {
    mean(values.iter().map(|&x| (x as f64).abs()))
}

fn root_mean_square(values: &[f32]) -> f64 {
    mean(values.iter().map(|&x| (x as f64).powi(2))).sqrt()
}

/// Mean absolute error.
pub fn mae(delta: &[f32]) -> f64 {
    mean_abs(delta)
}

/// Root mean square error.
pub fn rmse(delta: &[f32]) -> f64 {
    root_mean_square(delta)
}

/// Mean absolute error relative to the mean absolute target, in percent.
pub fn rel_mae(delta: &[f32], target: &[f32]) -> f64 {
    mean_abs(delta) / (mean_abs(target) + REL_EPS) * 100.
}

/// Root mean square error relative to the root mean square target, in percent.
pub fn rel_rmse(delta: &[f32], target: &[f32]) -> f64 {
    root_mean_square(delta) / (root_mean_square(target) + REL_EPS) * 100.
}

/// The `q`-th percentile of `values`, linearly interpolated between the closest ranks.
///
/// # Arguments
/// * `values` - The samples, in any order.
/// * `q` - The percentile, between 0 and 100.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = q / 100. * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;

    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// The 95th percentile of the absolute error.
pub fn q95(delta: &[f32]) -> f64 {
    let abs: Vec<f64> = delta.iter().map(|&x| (x as f64).abs()).collect();
    percentile(&abs, 95.)
}
