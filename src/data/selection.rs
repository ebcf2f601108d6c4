use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use crate::data::workspace::MatrixWorkspace;
use crate::error::{FrameworkError, Result};

// ---------------------------------------------------------------------------
// Workspace-index selection
// ---------------------------------------------------------------------------

/// Inclusive workspace-index range; `end < 0` means "up to the last spectrum".
pub fn index_range(n_spectra: usize, start: i64, end: i64) -> Result<RangeInclusive<usize>> {
    if n_spectra == 0 {
        return Err(FrameworkError::computation("workspace has no spectra"));
    }
    let last = n_spectra - 1;
    let to_index = |v: i64| -> Result<usize> {
        usize::try_from(v)
            .ok()
            .filter(|&i| i <= last)
            .ok_or(FrameworkError::Index {
                index: v.max(0) as usize,
                len: n_spectra,
            })
    };
    let start = to_index(start)?;
    let end = if end < 0 { last } else { to_index(end)? };
    if end < start {
        return Err(FrameworkError::computation(format!(
            "end index {end} is before start index {start}"
        )));
    }
    Ok(start..=end)
}

/// Sorted, de-duplicated index list; an empty list selects every spectrum.
pub fn index_list(n_spectra: usize, indices: &[i64]) -> Result<Vec<usize>> {
    if indices.is_empty() {
        return Ok((0..n_spectra).collect());
    }
    let mut selected = BTreeSet::new();
    for &i in indices {
        let index = usize::try_from(i)
            .ok()
            .filter(|&v| v < n_spectra)
            .ok_or(FrameworkError::Index {
                index: i.max(0) as usize,
                len: n_spectra,
            })?;
        selected.insert(index);
    }
    Ok(selected.into_iter().collect())
}

/// Indices of spectra that pass `predicate` and are not masked as a whole.
pub fn unmasked_indices<F>(ws: &MatrixWorkspace, predicate: F) -> Vec<usize>
where
    F: Fn(usize) -> bool,
{
    (0..ws.number_histograms())
        .filter(|&i| !ws.is_spectrum_masked(i) && predicate(i))
        .collect()
}

/// Index range `[lo, hi)` of bins lying entirely within `[x_min, x_max]`.
///
/// For point data the X values themselves are tested.
pub fn bins_within(x: &[f64], histogram: bool, x_min: f64, x_max: f64) -> (usize, usize) {
    let n_bins = if histogram { x.len().saturating_sub(1) } else { x.len() };
    let lo = x.partition_point(|&v| v < x_min);
    if histogram {
        // Bin b spans x[b]..x[b+1]; it fits when x[b] >= x_min and x[b+1] <= x_max.
        let hi_edge = x.partition_point(|&v| v <= x_max);
        let hi = hi_edge.saturating_sub(1).min(n_bins);
        (lo.min(hi), hi)
    } else {
        let hi = x.partition_point(|&v| v <= x_max);
        (lo.min(hi), hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_defaults_to_last_spectrum() {
        assert_eq!(index_range(5, 1, -1).unwrap(), 1..=4);
        assert_eq!(index_range(5, 0, 0).unwrap(), 0..=0);
        assert!(matches!(index_range(5, 5, -1), Err(FrameworkError::Index { .. })));
        assert!(index_range(5, 3, 1).is_err());
    }

    #[test]
    fn list_is_sorted_and_unique() {
        assert_eq!(index_list(4, &[3, 1, 3]).unwrap(), vec![1, 3]);
        assert_eq!(index_list(3, &[]).unwrap(), vec![0, 1, 2]);
        assert!(index_list(3, &[-1]).is_err());
    }

    #[test]
    fn bins_within_histogram_and_points() {
        let edges = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(bins_within(&edges, true, 1.0, 3.0), (1, 3));
        assert_eq!(bins_within(&edges, true, 0.5, 3.5), (1, 3));
        assert_eq!(bins_within(&edges, true, f64::NEG_INFINITY, f64::INFINITY), (0, 4));
        let points = [0.5, 1.5, 2.5];
        assert_eq!(bins_within(&points, false, 1.0, 3.0), (1, 3));
    }
}
