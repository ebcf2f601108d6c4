//! Bin-merging kernels shared by the built-in algorithms.
//!
//! All functions work on plain slices so they can run inside the
//! spectrum-parallel loops without touching workspace locks.

use std::collections::BTreeMap;

use crate::error::{FrameworkError, Result};

/// Partial last bins narrower than this fraction of the step are merged into
/// the previous bin.
pub const PARTIAL_BIN_FRACTION: f64 = 0.25;

/// Hard cap on generated bin boundaries.
const MAX_BOUNDARIES: usize = 10_000_000;

// ---------------------------------------------------------------------------
// Rebin parameters → bin boundaries
// ---------------------------------------------------------------------------

/// Expand `x1, dx1, x2, dx2, x3, ...` into bin boundaries.
///
/// A negative `dx` is a logarithmic step: each bin is `|dx|` times its lower
/// edge wide. With `full_bins_only` a trailing partial bin is dropped,
/// otherwise it is kept, or merged into its neighbour when it is narrower
/// than [`PARTIAL_BIN_FRACTION`] of the step.
pub fn create_axis_from_rebin_params(params: &[f64], full_bins_only: bool) -> Result<Vec<f64>> {
    if params.len() < 3 || params.len() % 2 == 0 {
        return Err(FrameworkError::computation(format!(
            "rebin parameters need the form x1,dx1,x2[,dx2,x3...], got {} values",
            params.len()
        )));
    }
    let mut edges = vec![params[0]];
    for segment in params[1..].chunks_exact(2) {
        let (dx, x_end) = (segment[0], segment[1]);
        if dx == 0.0 || !dx.is_finite() {
            return Err(FrameworkError::computation("Cannot have a zero bin width"));
        }
        let x_start = *edges.last().unwrap_or(&params[0]);
        if x_end <= x_start {
            return Err(FrameworkError::computation(
                "Bin boundary values must be given in order of increasing value",
            ));
        }
        let mut x = x_start;
        loop {
            let step = if dx > 0.0 {
                dx
            } else {
                if x <= 0.0 {
                    return Err(FrameworkError::computation(
                        "logarithmic binning needs strictly positive boundaries",
                    ));
                }
                x * -dx
            };
            let next = x + step;
            let tolerance = 1e-9 * step;
            if (x_end - next).abs() <= tolerance {
                edges.push(x_end);
                break;
            }
            if next > x_end {
                let partial = x_end - x;
                if full_bins_only {
                    // Nothing to add; the segment ends on its last full bin.
                } else if partial < PARTIAL_BIN_FRACTION * step && x > x_start {
                    if let Some(last) = edges.last_mut() {
                        *last = x_end;
                    }
                } else {
                    edges.push(x_end);
                }
                break;
            }
            edges.push(next);
            x = next;
            if edges.len() > MAX_BOUNDARIES {
                return Err(FrameworkError::computation(format!(
                    "rebin parameters produce more than {MAX_BOUNDARIES} boundaries"
                )));
            }
        }
    }
    if edges.len() < 2 {
        return Err(FrameworkError::computation(
            "rebin parameters do not produce any complete bin",
        ));
    }
    Ok(edges)
}

fn check_ascending(x: &[f64], what: &str) -> Result<()> {
    if x.windows(2).any(|w| w[1] < w[0]) {
        return Err(FrameworkError::computation(format!(
            "{what} bin boundaries are not in ascending order"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Rebin
// ---------------------------------------------------------------------------

/// Redistribute histogram data onto new boundaries by fractional overlap.
///
/// Counts are summed by overlap fraction; distributions are area preserving.
/// Errors add in quadrature. Returns `(y, e)` with `xnew.len() - 1` values.
pub fn rebin(
    xold: &[f64],
    yold: &[f64],
    eold: &[f64],
    xnew: &[f64],
    distribution: bool,
) -> Result<(Vec<f64>, Vec<f64>)> {
    if xold.len() != yold.len() + 1 || eold.len() != yold.len() {
        return Err(FrameworkError::invalid_size(format!(
            "rebin needs histogram input, got x={} y={} e={}",
            xold.len(),
            yold.len(),
            eold.len()
        )));
    }
    if xnew.len() < 2 {
        return Err(FrameworkError::invalid_size("new axis needs at least two boundaries"));
    }
    check_ascending(xold, "input")?;
    check_ascending(xnew, "output")?;

    let n_old = yold.len();
    let n_new = xnew.len() - 1;
    let mut y = vec![0.0; n_new];
    let mut e2 = vec![0.0; n_new];

    let (mut i, mut j) = (0, 0);
    while i < n_old && j < n_new {
        let (olo, ohi) = (xold[i], xold[i + 1]);
        let (nlo, nhi) = (xnew[j], xnew[j + 1]);
        if ohi <= nlo || ohi <= olo {
            i += 1;
            continue;
        }
        if nhi <= olo {
            j += 1;
            continue;
        }
        let delta = ohi.min(nhi) - olo.max(nlo);
        let owidth = ohi - olo;
        if distribution {
            y[j] += yold[i] * delta;
            e2[j] += eold[i] * eold[i] * delta * owidth;
        } else {
            let frac = delta / owidth;
            y[j] += yold[i] * frac;
            e2[j] += eold[i] * eold[i] * frac;
        }
        if ohi <= nhi {
            i += 1;
        } else {
            j += 1;
        }
    }

    let e = if distribution {
        for (k, yk) in y.iter_mut().enumerate() {
            let width = xnew[k + 1] - xnew[k];
            if width > 0.0 {
                *yk /= width;
                e2[k] = e2[k].sqrt() / width;
            } else {
                *yk = 0.0;
                e2[k] = 0.0;
            }
        }
        e2
    } else {
        e2.into_iter().map(f64::sqrt).collect()
    };
    Ok((y, e))
}

/// Carry bin masks onto new boundaries.
///
/// The new weight is the overlap-weighted share of masked old bins, capped
/// at 1; bins with no masked overlap are left out.
pub fn rebin_masks(xold: &[f64], masked: &BTreeMap<usize, f64>, xnew: &[f64]) -> BTreeMap<usize, f64> {
    let mut out = BTreeMap::new();
    for (&bin, &weight) in masked {
        let (Some(&olo), Some(&ohi)) = (xold.get(bin), xold.get(bin + 1)) else {
            continue;
        };
        for j in 0..xnew.len().saturating_sub(1) {
            let (nlo, nhi) = (xnew[j], xnew[j + 1]);
            let delta = ohi.min(nhi) - olo.max(nlo);
            let width = nhi - nlo;
            if delta > 0.0 && width > 0.0 {
                let slot = out.entry(j).or_insert(0.0);
                *slot = (*slot + weight * delta / width).min(1.0);
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Rebunch
// ---------------------------------------------------------------------------

/// Merge every `n_bunch` adjacent bins; a trailing short group is merged
/// over the bins it actually has.
///
/// * histogram counts: Y summed, E in quadrature, outer edges kept;
/// * histogram distribution: width-weighted mean of Y, E likewise;
/// * point data: mean of X and Y, `sqrt(sum e²) / n` for E.
pub fn rebunch(
    x: &[f64],
    y: &[f64],
    e: &[f64],
    n_bunch: usize,
    distribution: bool,
) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>)> {
    if n_bunch == 0 {
        return Err(FrameworkError::computation("NBunch must be at least 1"));
    }
    if e.len() != y.len() {
        return Err(FrameworkError::invalid_size("Y and E lengths differ"));
    }
    let histogram = x.len() == y.len() + 1;
    if !histogram && x.len() != y.len() {
        return Err(FrameworkError::invalid_size(format!(
            "x has {} values for {} bins",
            x.len(),
            y.len()
        )));
    }

    let n_new = y.len().div_ceil(n_bunch);
    let mut xn = Vec::with_capacity(n_new + usize::from(histogram));
    let mut yn = Vec::with_capacity(n_new);
    let mut en = Vec::with_capacity(n_new);

    if histogram {
        xn.push(x[0]);
    }
    for start in (0..y.len()).step_by(n_bunch) {
        let end = (start + n_bunch).min(y.len());
        let count = (end - start) as f64;
        let ys = &y[start..end];
        let es = &e[start..end];
        if histogram {
            xn.push(x[end]);
            if distribution {
                let widths: Vec<f64> = (start..end).map(|k| x[k + 1] - x[k]).collect();
                let total: f64 = widths.iter().sum();
                if total <= 0.0 {
                    return Err(FrameworkError::computation("Cannot have a zero bin width"));
                }
                let ysum: f64 = ys.iter().zip(&widths).map(|(v, w)| v * w).sum();
                let e2: f64 = es.iter().zip(&widths).map(|(v, w)| (v * w).powi(2)).sum();
                yn.push(ysum / total);
                en.push(e2.sqrt() / total);
            } else {
                yn.push(ys.iter().sum());
                en.push(es.iter().map(|v| v * v).sum::<f64>().sqrt());
            }
        } else {
            xn.push(x[start..end].iter().sum::<f64>() / count);
            yn.push(ys.iter().sum::<f64>() / count);
            en.push(es.iter().map(|v| v * v).sum::<f64>().sqrt() / count);
        }
    }
    Ok((xn, yn, en))
}

// ---------------------------------------------------------------------------
// Distributions and integration
// ---------------------------------------------------------------------------

pub fn bin_widths(x: &[f64]) -> Vec<f64> {
    x.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Divide Y and E by bin width (`to_distribution`) or multiply (the reverse).
pub fn scale_by_bin_width(x: &[f64], y: &mut [f64], e: &mut [f64], to_distribution: bool) -> Result<()> {
    if x.len() != y.len() + 1 {
        return Err(FrameworkError::computation(
            "distribution conversion needs histogram data",
        ));
    }
    for ((w, yv), ev) in bin_widths(x).into_iter().zip(y.iter_mut()).zip(e.iter_mut()) {
        if to_distribution {
            if w == 0.0 {
                return Err(FrameworkError::computation("Cannot have a zero bin width"));
            }
            *yv /= w;
            *ev /= w;
        } else {
            *yv *= w;
            *ev *= w;
        }
    }
    Ok(())
}

/// Sum bins `lo..hi` with per-bin weights; distributions are multiplied by
/// bin width first. Returns `(sum, error)`.
pub fn integrate(
    x: &[f64],
    y: &[f64],
    e: &[f64],
    weights: &[f64],
    (lo, hi): (usize, usize),
    distribution: bool,
) -> (f64, f64) {
    let histogram = x.len() == y.len() + 1;
    let mut sum = 0.0;
    let mut e2 = 0.0;
    for k in lo..hi.min(y.len()) {
        let w = weights.get(k).copied().unwrap_or(1.0);
        let width = if distribution && histogram { x[k + 1] - x[k] } else { 1.0 };
        sum += y[k] * w * width;
        e2 += (e[k] * w * width).powi(2);
    }
    (sum, e2.sqrt())
}
