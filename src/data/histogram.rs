use std::sync::Arc;

use crate::error::{FrameworkError, Result};

// ---------------------------------------------------------------------------
// Histogram – one spectrum (X, Y, E[, Dx])
// ---------------------------------------------------------------------------

/// One spectrum: bin edges or points in `x`, signal in `y`, errors in `e`.
///
/// `x` is reference counted so several spectra can share one set of bin
/// boundaries. Mutable access through [`Histogram::data_x`] detaches a shared
/// array first, so writes never leak into other spectra.
///
/// Sizes are fixed once built: the mutable accessors hand out slices, and
/// every whole-array replacement is checked against the histogram/point
/// convention the spectrum was created with.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    x: Arc<Vec<f64>>,
    y: Vec<f64>,
    e: Vec<f64>,
    dx: Option<Vec<f64>>,
}

impl Histogram {
    /// Zero-filled spectrum; `n_x == n_y` is point data, `n_x == n_y + 1` histogram.
    pub fn new(n_x: usize, n_y: usize) -> Result<Self> {
        check_sizes(n_x, n_y)?;
        Ok(Histogram {
            x: Arc::new(vec![0.0; n_x]),
            y: vec![0.0; n_y],
            e: vec![0.0; n_y],
            dx: None,
        })
    }

    pub fn from_parts(x: Vec<f64>, y: Vec<f64>, e: Vec<f64>) -> Result<Self> {
        Self::with_shared_x(Arc::new(x), y, e)
    }

    pub fn with_shared_x(x: Arc<Vec<f64>>, y: Vec<f64>, e: Vec<f64>) -> Result<Self> {
        check_sizes(x.len(), y.len())?;
        if e.len() != y.len() {
            return Err(FrameworkError::invalid_size(format!(
                "E has {} values but Y has {}",
                e.len(),
                y.len()
            )));
        }
        Ok(Histogram { x, y, e, dx: None })
    }

    /// Number of Y values (bins or points).
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn is_histogram(&self) -> bool {
        self.x.len() == self.y.len() + 1
    }

    // -- read access --

    pub fn read_x(&self) -> &[f64] {
        &self.x
    }

    pub fn read_y(&self) -> &[f64] {
        &self.y
    }

    pub fn read_e(&self) -> &[f64] {
        &self.e
    }

    pub fn read_dx(&self) -> Option<&[f64]> {
        self.dx.as_deref()
    }

    /// The reference-counted X array, for sharing with other spectra.
    pub fn shared_x(&self) -> Arc<Vec<f64>> {
        Arc::clone(&self.x)
    }

    pub fn shares_x_with(&self, other: &Histogram) -> bool {
        Arc::ptr_eq(&self.x, &other.x)
    }

    // -- write access --

    /// Mutable X values; a shared array is copied first.
    pub fn data_x(&mut self) -> &mut [f64] {
        Arc::make_mut(&mut self.x).as_mut_slice()
    }

    pub fn data_y(&mut self) -> &mut [f64] {
        &mut self.y
    }

    pub fn data_e(&mut self) -> &mut [f64] {
        &mut self.e
    }

    /// Y and E together, for loops that update both.
    pub fn data_ye(&mut self) -> (&mut [f64], &mut [f64]) {
        (&mut self.y, &mut self.e)
    }

    /// Replace X with a (possibly shared) array of the same length.
    pub fn set_shared_x(&mut self, x: Arc<Vec<f64>>) -> Result<()> {
        if x.len() != self.x.len() {
            return Err(FrameworkError::invalid_size(format!(
                "X must have {} values, got {}",
                self.x.len(),
                x.len()
            )));
        }
        self.x = x;
        Ok(())
    }

    pub fn set_x(&mut self, x: Vec<f64>) -> Result<()> {
        self.set_shared_x(Arc::new(x))
    }

    pub fn set_y(&mut self, y: Vec<f64>) -> Result<()> {
        if y.len() != self.y.len() {
            return Err(FrameworkError::invalid_size(format!(
                "Y must have {} values, got {}",
                self.y.len(),
                y.len()
            )));
        }
        self.y = y;
        Ok(())
    }

    pub fn set_e(&mut self, e: Vec<f64>) -> Result<()> {
        if e.len() != self.y.len() {
            return Err(FrameworkError::invalid_size(format!(
                "E must have {} values, got {}",
                self.y.len(),
                e.len()
            )));
        }
        self.e = e;
        Ok(())
    }

    pub fn set_dx(&mut self, dx: Option<Vec<f64>>) -> Result<()> {
        if let Some(d) = &dx {
            if d.len() != self.y.len() {
                return Err(FrameworkError::invalid_size(format!(
                    "Dx must have {} values, got {}",
                    self.y.len(),
                    d.len()
                )));
            }
        }
        self.dx = dx;
        Ok(())
    }

    /// Replace all arrays, possibly resizing, keeping the histogram/point convention.
    pub fn replace(&mut self, x: Arc<Vec<f64>>, y: Vec<f64>, e: Vec<f64>) -> Result<()> {
        let replacement = Histogram::with_shared_x(x, y, e)?;
        if replacement.is_histogram() != self.is_histogram() {
            return Err(FrameworkError::invalid_size(format!(
                "cannot replace {} data with {} data",
                kind_name(self.is_histogram()),
                kind_name(replacement.is_histogram())
            )));
        }
        *self = replacement;
        Ok(())
    }

    pub fn clear_data(&mut self) {
        self.y.iter_mut().for_each(|v| *v = 0.0);
        self.e.iter_mut().for_each(|v| *v = 0.0);
    }

    // -- derived quantities --

    /// Bin widths; `None` for point data.
    pub fn bin_widths(&self) -> Option<Vec<f64>> {
        self.is_histogram()
            .then(|| self.x.windows(2).map(|w| w[1] - w[0]).collect())
    }

    /// Bin centres for histograms, the X values themselves for point data.
    pub fn points(&self) -> Vec<f64> {
        if self.is_histogram() {
            self.x.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
        } else {
            self.x.to_vec()
        }
    }

    /// Smallest and largest X value.
    pub fn x_range(&self) -> Option<(f64, f64)> {
        let first = *self.x.first()?;
        let last = *self.x.last()?;
        Some((first.min(last), first.max(last)))
    }
}

fn kind_name(histogram: bool) -> &'static str {
    if histogram {
        "histogram"
    } else {
        "point"
    }
}

/// Histogram (`n_x == n_y + 1`) or point data (`n_x == n_y`); anything else fails.
pub fn check_sizes(n_x: usize, n_y: usize) -> Result<()> {
    if n_x == n_y || n_x == n_y + 1 {
        Ok(())
    } else {
        Err(FrameworkError::invalid_size(format!(
            "{n_x} X values cannot hold {n_y} Y values; expected {n_y} (points) or {} (bin edges)",
            n_y + 1
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_convention_is_enforced() {
        assert!(Histogram::new(11, 10).unwrap().is_histogram());
        assert!(!Histogram::new(10, 10).unwrap().is_histogram());
        assert!(matches!(
            Histogram::new(12, 10),
            Err(FrameworkError::InvalidSize(_))
        ));
        assert!(Histogram::from_parts(vec![0.0, 1.0], vec![1.0], vec![]).is_err());
    }

    #[test]
    fn writing_shared_x_detaches() {
        let x = Arc::new(vec![0.0, 1.0, 2.0]);
        let mut a = Histogram::with_shared_x(Arc::clone(&x), vec![1.0, 2.0], vec![1.0, 1.0]).unwrap();
        let b = Histogram::with_shared_x(Arc::clone(&x), vec![3.0, 4.0], vec![1.0, 1.0]).unwrap();
        assert!(a.shares_x_with(&b));

        a.data_x()[0] = -1.0;
        assert!(!a.shares_x_with(&b));
        assert_eq!(b.read_x(), &[0.0, 1.0, 2.0]);
        assert_eq!(a.read_x(), &[-1.0, 1.0, 2.0]);
    }

    #[test]
    fn replace_keeps_convention() {
        let mut h = Histogram::new(3, 2).unwrap();
        h.replace(Arc::new(vec![0.0, 1.0, 2.0, 3.0]), vec![1.0; 3], vec![0.0; 3])
            .unwrap();
        assert_eq!(h.len(), 3);
        let err = h
            .replace(Arc::new(vec![0.0, 1.0]), vec![1.0; 2], vec![0.0; 2])
            .unwrap_err();
        assert!(err.to_string().contains("point"));
    }

    #[test]
    fn widths_and_points() {
        let h = Histogram::from_parts(vec![0.0, 1.0, 3.0], vec![0.0; 2], vec![0.0; 2]).unwrap();
        assert_eq!(h.bin_widths().unwrap(), vec![1.0, 2.0]);
        assert_eq!(h.points(), vec![0.5, 2.0]);
        assert!(Histogram::new(2, 2).unwrap().bin_widths().is_none());
    }
}
