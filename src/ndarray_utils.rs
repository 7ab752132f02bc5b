//! Small array utilities shared across the crate:
//! arg-max reduction and clamped piecewise-linear interpolation.

use ndarray::ArrayView1;
use num_traits::Float;

pub(crate) fn argmax<F>(arr: ArrayView1<'_, F>) -> usize
where
    F: PartialOrd + Copy,
{
    arr.indexed_iter()
        .reduce(|acc, f| if acc.1 >= f.1 { acc } else { f })
        .unwrap()
        .0
}

/// Piecewise-linear interpolation of `(xp, fp)` at the points `x`.
///
/// `xp` must be monotonically increasing. Query points outside `xp` are
/// clamped to the first/last sample value.
pub(crate) fn interp<F: Float>(x: &[F], xp: &[F], fp: &[F]) -> Vec<F> {
    assert_eq!(xp.len(), fp.len());
    assert!(!xp.is_empty(), "interpolation table is empty");

    x.iter()
        .map(|&xi| {
            if xi <= xp[0] {
                return fp[0];
            }
            if xi >= xp[xp.len() - 1] {
                return fp[fp.len() - 1];
            }
            let j = match xp.binary_search_by(|p| p.partial_cmp(&xi).unwrap()) {
                Ok(exact) => return fp[exact],
                Err(j) => j,
            };
            let t = (xi - xp[j - 1]) / (xp[j] - xp[j - 1]);
            fp[j - 1] + t * (fp[j] - fp[j - 1])
        })
        .collect()
}

/// Interpolate a sampled spectrum in log–log space onto the axis `freqs`.
///
/// Zero or negative query frequencies clamp to the lowest tabulated value,
/// which keeps the DC and sub-band bins at the first sample instead of
/// producing infinities from `ln(0)`.
pub(crate) fn loglog_interp(freqs: &[f64], table_freqs: &[f64], table_values: &[f64]) -> Vec<f64> {
    let log_xp: Vec<f64> = table_freqs.iter().map(|f| f.ln()).collect();
    let log_fp: Vec<f64> = table_values.iter().map(|v| v.ln()).collect();
    let log_x: Vec<f64> = freqs
        .iter()
        .map(|&f| if f > 0.0 { f.ln() } else { f64::NEG_INFINITY })
        .collect();

    interp(&log_x, &log_xp, &log_fp)
        .into_iter()
        .map(|v| v.exp())
        .collect()
}
