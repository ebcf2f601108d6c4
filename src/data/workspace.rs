use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::data::histogram::{check_sizes, Histogram};
use crate::data::history::WorkspaceHistory;
use crate::data::instrument::InstrumentGeometry;
use crate::data::run::Run;
use crate::error::{FrameworkError, Result};

// ---------------------------------------------------------------------------
// Handle – shared, lockable workspace storage
// ---------------------------------------------------------------------------

/// Shared workspace storage: a read/write lock plus an in-place claim that
/// at most one executing algorithm may hold.
pub struct Handle<T> {
    data: RwLock<T>,
    claimed_by: Mutex<Option<String>>,
}

impl<T> Handle<T> {
    pub fn new(value: T) -> Arc<Self> {
        Arc::new(Handle {
            data: RwLock::new(value),
            claimed_by: Mutex::new(None),
        })
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.data.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.data.write()
    }

    /// Name of the algorithm currently modifying this workspace in place.
    pub fn claimed_by(&self) -> Option<String> {
        self.claimed_by.lock().clone()
    }

    /// Take the exclusive in-place claim for `owner`; released on drop.
    pub fn claim(self: &Arc<Self>, owner: &str) -> Result<InPlaceClaim<T>> {
        let mut slot = self.claimed_by.lock();
        if let Some(current) = slot.as_ref() {
            return Err(FrameworkError::computation(format!(
                "workspace is already being modified in place by {current}"
            )));
        }
        *slot = Some(owner.to_string());
        Ok(InPlaceClaim {
            handle: Arc::clone(self),
        })
    }
}

impl<T: fmt::Debug> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data.try_read() {
            Some(data) => f.debug_tuple("Handle").field(&*data).finish(),
            None => f.write_str("Handle(<locked>)"),
        }
    }
}

/// Guard for an in-place claim.
pub struct InPlaceClaim<T> {
    handle: Arc<Handle<T>>,
}

impl<T> Drop for InPlaceClaim<T> {
    fn drop(&mut self) {
        *self.handle.claimed_by.lock() = None;
    }
}

pub type MatrixHandle = Arc<Handle<MatrixWorkspace>>;
pub type GroupHandle = Arc<Handle<WorkspaceGroup>>;

// ---------------------------------------------------------------------------
// MatrixWorkspace – N spectra plus metadata
// ---------------------------------------------------------------------------

/// A container of spectra sharing one histogram/point convention, with
/// instrument, run logs, masking, distribution flag and history.
#[derive(Debug, Clone)]
pub struct MatrixWorkspace {
    type_id: String,
    title: String,
    spectra: Vec<Histogram>,
    histogram: bool,
    distribution: bool,
    x_unit: String,
    y_unit: String,
    masked_bins: BTreeMap<usize, BTreeMap<usize, f64>>,
    masked_spectra: BTreeSet<usize>,
    instrument: Option<Arc<dyn InstrumentGeometry>>,
    run: Run,
    history: WorkspaceHistory,
}

impl MatrixWorkspace {
    /// Allocate `n_spectra` zero-filled spectra sharing one X array.
    pub fn new(type_id: &str, n_spectra: usize, n_x: usize, n_y: usize) -> Result<Self> {
        let mut ws = MatrixWorkspace {
            type_id: type_id.to_string(),
            title: String::new(),
            spectra: Vec::new(),
            histogram: true,
            distribution: false,
            x_unit: String::new(),
            y_unit: "Counts".to_string(),
            masked_bins: BTreeMap::new(),
            masked_spectra: BTreeSet::new(),
            instrument: None,
            run: Run::new(),
            history: WorkspaceHistory::new(),
        };
        ws.initialize(n_spectra, n_x, n_y)?;
        Ok(ws)
    }

    /// (Re)allocate storage. `n_x == n_y` is point data, `n_x == n_y + 1` histogram.
    pub fn initialize(&mut self, n_spectra: usize, n_x: usize, n_y: usize) -> Result<()> {
        check_sizes(n_x, n_y)?;
        let template = Histogram::new(n_x, n_y)?;
        self.spectra = vec![template; n_spectra];
        self.histogram = n_x == n_y + 1;
        self.masked_bins.clear();
        self.masked_spectra.clear();
        Ok(())
    }

    /// Build from already populated spectra, which must share one convention.
    pub fn from_histograms(type_id: &str, spectra: Vec<Histogram>) -> Result<Self> {
        let histogram = spectra.first().map(Histogram::is_histogram).unwrap_or(true);
        if let Some(i) = spectra.iter().position(|h| h.is_histogram() != histogram) {
            return Err(FrameworkError::invalid_size(format!(
                "spectrum {i} does not follow the {} convention of spectrum 0",
                if histogram { "histogram" } else { "point-data" }
            )));
        }
        let mut ws = MatrixWorkspace::new(type_id, 0, 1, 0)?;
        ws.spectra = spectra;
        ws.histogram = histogram;
        Ok(ws)
    }

    // -- identity & labels --

    /// Concrete type name, e.g. `Workspace2D`.
    pub fn id(&self) -> &str {
        &self.type_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn x_unit(&self) -> &str {
        &self.x_unit
    }

    pub fn set_x_unit(&mut self, unit: impl Into<String>) {
        self.x_unit = unit.into();
    }

    pub fn y_unit(&self) -> &str {
        &self.y_unit
    }

    pub fn set_y_unit(&mut self, unit: impl Into<String>) {
        self.y_unit = unit.into();
    }

    // -- shape --

    pub fn number_histograms(&self) -> usize {
        self.spectra.len()
    }

    /// Y length of spectrum 0 (0 for an empty workspace).
    pub fn blocksize(&self) -> usize {
        self.spectra.first().map(Histogram::len).unwrap_or(0)
    }

    pub fn is_histogram_data(&self) -> bool {
        self.histogram
    }

    /// Whether every spectrum has identical X values.
    pub fn has_common_bins(&self) -> bool {
        let Some(first) = self.spectra.first() else {
            return true;
        };
        self.spectra
            .iter()
            .all(|h| h.shares_x_with(first) || h.read_x() == first.read_x())
    }

    /// Smallest and largest X over all spectra.
    pub fn x_range(&self) -> Option<(f64, f64)> {
        self.spectra
            .iter()
            .filter_map(Histogram::x_range)
            .reduce(|(lo, hi), (a, b)| (lo.min(a), hi.max(b)))
    }

    // -- spectrum access --

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.spectra.len() {
            Ok(())
        } else {
            Err(FrameworkError::Index {
                index,
                len: self.spectra.len(),
            })
        }
    }

    pub fn histogram(&self, index: usize) -> Result<&Histogram> {
        self.check_index(index)?;
        Ok(&self.spectra[index])
    }

    pub fn histogram_mut(&mut self, index: usize) -> Result<&mut Histogram> {
        self.check_index(index)?;
        Ok(&mut self.spectra[index])
    }

    pub fn spectra(&self) -> &[Histogram] {
        &self.spectra
    }

    /// Mutable slice of spectra for partitioned parallel writes.
    pub fn spectra_mut(&mut self) -> &mut [Histogram] {
        &mut self.spectra
    }

    pub fn read_x(&self, index: usize) -> Result<&[f64]> {
        Ok(self.histogram(index)?.read_x())
    }

    pub fn read_y(&self, index: usize) -> Result<&[f64]> {
        Ok(self.histogram(index)?.read_y())
    }

    pub fn read_e(&self, index: usize) -> Result<&[f64]> {
        Ok(self.histogram(index)?.read_e())
    }

    pub fn data_x(&mut self, index: usize) -> Result<&mut [f64]> {
        Ok(self.histogram_mut(index)?.data_x())
    }

    pub fn data_y(&mut self, index: usize) -> Result<&mut [f64]> {
        Ok(self.histogram_mut(index)?.data_y())
    }

    pub fn data_e(&mut self, index: usize) -> Result<&mut [f64]> {
        Ok(self.histogram_mut(index)?.data_e())
    }

    /// Assign a shared X array to one spectrum.
    pub fn set_shared_x(&mut self, index: usize, x: Arc<Vec<f64>>) -> Result<()> {
        self.histogram_mut(index)?.set_shared_x(x)
    }

    pub fn shared_x(&self, index: usize) -> Result<Arc<Vec<f64>>> {
        Ok(self.histogram(index)?.shared_x())
    }

    /// Replace one spectrum's arrays; sizes may change, the convention may not.
    pub fn set_histogram(
        &mut self,
        index: usize,
        x: Arc<Vec<f64>>,
        y: Vec<f64>,
        e: Vec<f64>,
    ) -> Result<()> {
        let histogram = self.histogram;
        let target = self.histogram_mut(index)?;
        let replacement = Histogram::with_shared_x(x, y, e)?;
        if replacement.is_histogram() != histogram {
            return Err(FrameworkError::invalid_size(format!(
                "spectrum {index}: workspace holds {} data",
                if histogram { "histogram" } else { "point" }
            )));
        }
        *target = replacement;
        Ok(())
    }

    // -- distribution flag --

    pub fn is_distribution(&self) -> bool {
        self.distribution
    }

    pub fn set_distribution(&mut self, distribution: bool) {
        self.distribution = distribution;
    }

    // -- masking --

    /// Flag bin `bin` of spectrum `index` with `weight` in `(0, 1]`.
    pub fn mask_bin(&mut self, index: usize, bin: usize, weight: f64) -> Result<()> {
        let n_bins = self.histogram(index)?.len();
        if bin >= n_bins {
            return Err(FrameworkError::Index {
                index: bin,
                len: n_bins,
            });
        }
        if !(weight > 0.0 && weight <= 1.0) {
            return Err(FrameworkError::Validation {
                property: "weight".to_string(),
                message: format!("mask weight {weight} is outside (0, 1]"),
            });
        }
        let slot = self.masked_bins.entry(index).or_default().entry(bin).or_insert(0.0);
        *slot = slot.max(weight);
        Ok(())
    }

    pub fn is_masked(&self, index: usize, bin: usize) -> bool {
        self.masked_bins
            .get(&index)
            .is_some_and(|bins| bins.contains_key(&bin))
    }

    pub fn has_masked_bins(&self, index: usize) -> bool {
        self.masked_bins.get(&index).is_some_and(|b| !b.is_empty())
    }

    /// Masked bins of one spectrum: bin index → weight.
    pub fn masked_bins(&self, index: usize) -> Option<&BTreeMap<usize, f64>> {
        self.masked_bins.get(&index)
    }

    /// Every masked `(spectrum, bin)` pair.
    pub fn masked_entries(&self) -> Vec<(usize, usize)> {
        self.masked_bins
            .iter()
            .flat_map(|(&i, bins)| bins.keys().map(move |&b| (i, b)))
            .collect()
    }

    pub fn mask_spectrum(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.masked_spectra.insert(index);
        Ok(())
    }

    pub fn is_spectrum_masked(&self, index: usize) -> bool {
        self.masked_spectra.contains(&index)
    }

    pub fn masked_spectra(&self) -> &BTreeSet<usize> {
        &self.masked_spectra
    }

    pub fn clear_masks(&mut self, index: usize) {
        self.masked_bins.remove(&index);
        self.masked_spectra.remove(&index);
    }

    /// Drop every bin mask, e.g. after the binning changed.
    pub fn clear_bin_masks(&mut self) {
        self.masked_bins.clear();
    }

    pub fn clear_spectrum_masks(&mut self) {
        self.masked_spectra.clear();
    }

    /// Per-bin weights with masking applied: 0 for a fully masked bin or spectrum.
    pub fn bin_weights(&self, index: usize) -> Result<Vec<f64>> {
        let n = self.histogram(index)?.len();
        if self.is_spectrum_masked(index) {
            return Ok(vec![0.0; n]);
        }
        let mut weights = vec![1.0; n];
        if let Some(bins) = self.masked_bins.get(&index) {
            for (&bin, &w) in bins {
                if let Some(slot) = weights.get_mut(bin) {
                    *slot = 1.0 - w;
                }
            }
        }
        Ok(weights)
    }

    /// Y values with masked bins contributing zero weight.
    pub fn weighted_y(&self, index: usize) -> Result<Vec<f64>> {
        let weights = self.bin_weights(index)?;
        Ok(self
            .read_y(index)?
            .iter()
            .zip(weights)
            .map(|(y, w)| y * w)
            .collect())
    }

    // -- metadata --

    pub fn instrument(&self) -> Option<&Arc<dyn InstrumentGeometry>> {
        self.instrument.as_ref()
    }

    pub fn set_instrument(&mut self, instrument: Option<Arc<dyn InstrumentGeometry>>) {
        self.instrument = instrument;
    }

    pub fn run(&self) -> &Run {
        &self.run
    }

    pub fn run_mut(&mut self) -> &mut Run {
        &mut self.run
    }

    pub fn history(&self) -> &WorkspaceHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut WorkspaceHistory {
        &mut self.history
    }

    /// Copy instrument, run, labels, distribution flag and masking from `parent`.
    ///
    /// Masks referring to spectra or bins this workspace does not have are dropped.
    pub fn copy_metadata_from(&mut self, parent: &MatrixWorkspace) {
        self.title = parent.title.clone();
        self.x_unit = parent.x_unit.clone();
        self.y_unit = parent.y_unit.clone();
        self.distribution = parent.distribution;
        self.instrument = parent.instrument.clone();
        self.run = parent.run.clone();
        self.masked_spectra = parent
            .masked_spectra
            .iter()
            .copied()
            .filter(|&i| i < self.spectra.len())
            .collect();
        self.masked_bins = parent
            .masked_bins
            .iter()
            .filter_map(|(&i, bins)| {
                let n = self.spectra.get(i)?.len();
                let kept: BTreeMap<usize, f64> =
                    bins.iter().filter(|(b, _)| **b < n).map(|(&b, &w)| (b, w)).collect();
                (!kept.is_empty()).then_some((i, kept))
            })
            .collect();
    }
}

// ---------------------------------------------------------------------------
// WorkspaceGroup – ordered named references, no storage of its own
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct WorkspaceGroup {
    members: Vec<(String, Workspace)>,
    history: WorkspaceHistory,
}

impl WorkspaceGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, workspace: Workspace) -> Result<()> {
        let name = name.into();
        if self.contains(&name) {
            return Err(FrameworkError::DuplicateName(name));
        }
        self.members.push((name, workspace));
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Workspace> {
        let pos = self
            .members
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| FrameworkError::NotFound(name.to_string()))?;
        Ok(self.members.remove(pos).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, index: usize) -> Result<&Workspace> {
        self.members
            .get(index)
            .map(|(_, ws)| ws)
            .ok_or(FrameworkError::Index {
                index,
                len: self.members.len(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        self.members.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn history(&self) -> &WorkspaceHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut WorkspaceHistory {
        &mut self.history
    }
}

// ---------------------------------------------------------------------------
// Workspace – the polymorphic handle stored in the data service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Workspace {
    Matrix(MatrixHandle),
    Group(GroupHandle),
}

impl Workspace {
    pub fn from_matrix(ws: MatrixWorkspace) -> Self {
        Workspace::Matrix(Handle::new(ws))
    }

    pub fn from_group(group: WorkspaceGroup) -> Self {
        Workspace::Group(Handle::new(group))
    }

    pub fn as_matrix(&self) -> Option<&MatrixHandle> {
        match self {
            Workspace::Matrix(m) => Some(m),
            Workspace::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&GroupHandle> {
        match self {
            Workspace::Group(g) => Some(g),
            Workspace::Matrix(_) => None,
        }
    }

    /// Same underlying object (not merely equal contents).
    pub fn ptr_eq(&self, other: &Workspace) -> bool {
        match (self, other) {
            (Workspace::Matrix(a), Workspace::Matrix(b)) => Arc::ptr_eq(a, b),
            (Workspace::Group(a), Workspace::Group(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn type_id(&self) -> String {
        match self {
            Workspace::Matrix(m) => m.read().id().to_string(),
            Workspace::Group(_) => "WorkspaceGroup".to_string(),
        }
    }

    pub fn history(&self) -> WorkspaceHistory {
        match self {
            Workspace::Matrix(m) => m.read().history().clone(),
            Workspace::Group(g) => g.read().history().clone(),
        }
    }

    pub(crate) fn with_history_mut<R>(&self, f: impl FnOnce(&mut WorkspaceHistory) -> R) -> R {
        match self {
            Workspace::Matrix(m) => f(m.write().history_mut()),
            Workspace::Group(g) => f(g.write().history_mut()),
        }
    }

    pub fn claimed_by(&self) -> Option<String> {
        match self {
            Workspace::Matrix(m) => m.claimed_by(),
            Workspace::Group(g) => g.claimed_by(),
        }
    }

    pub(crate) fn claim(&self, owner: &str) -> Result<WorkspaceClaim> {
        Ok(match self {
            Workspace::Matrix(m) => WorkspaceClaim::Matrix { _guard: m.claim(owner)? },
            Workspace::Group(g) => WorkspaceClaim::Group { _guard: g.claim(owner)? },
        })
    }
}

impl From<MatrixHandle> for Workspace {
    fn from(handle: MatrixHandle) -> Self {
        Workspace::Matrix(handle)
    }
}

/// In-place claim on either workspace flavour; held only for its `Drop`.
pub(crate) enum WorkspaceClaim {
    Matrix { _guard: InPlaceClaim<MatrixWorkspace> },
    Group { _guard: InPlaceClaim<WorkspaceGroup> },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ws(n: usize, nx: usize, ny: usize) -> MatrixWorkspace {
        MatrixWorkspace::new("Workspace2D", n, nx, ny).unwrap()
    }

    #[test]
    fn initialize_sets_convention_and_shares_x() {
        let w = ws(3, 11, 10);
        assert!(w.is_histogram_data());
        assert_eq!(w.number_histograms(), 3);
        assert_eq!(w.blocksize(), 10);
        assert!(w.spectra()[0].shares_x_with(&w.spectra()[2]));
        assert!(!ws(2, 5, 5).is_histogram_data());
        assert!(matches!(
            MatrixWorkspace::new("Workspace2D", 2, 7, 5),
            Err(FrameworkError::InvalidSize(_))
        ));
    }

    #[test]
    fn out_of_range_index_fails() {
        let mut w = ws(2, 3, 2);
        assert!(matches!(w.read_y(2), Err(FrameworkError::Index { index: 2, len: 2 })));
        assert!(w.data_x(5).is_err());
    }

    #[test]
    fn mutating_one_spectrum_x_leaves_others() {
        let mut w = ws(2, 3, 2);
        w.data_x(0).unwrap().copy_from_slice(&[1.0, 2.0, 3.0]);
        assert_eq!(w.read_x(1).unwrap(), &[0.0, 0.0, 0.0]);

        let shared = Arc::new(vec![0.0, 5.0, 10.0]);
        w.set_shared_x(0, Arc::clone(&shared)).unwrap();
        w.set_shared_x(1, shared).unwrap();
        assert!(w.has_common_bins());
        w.data_x(1).unwrap()[2] = 20.0;
        assert_eq!(w.read_x(0).unwrap(), &[0.0, 5.0, 10.0]);
        assert!(!w.has_common_bins());
    }

    #[test]
    fn set_histogram_rejects_point_data_in_histogram_workspace() {
        let mut w = ws(1, 3, 2);
        let err = w
            .set_histogram(0, Arc::new(vec![1.0, 2.0]), vec![1.0, 1.0], vec![0.0, 0.0])
            .unwrap_err();
        assert!(matches!(err, FrameworkError::InvalidSize(_)));
        w.set_histogram(0, Arc::new(vec![0.0, 1.0, 2.0, 3.0]), vec![1.0; 3], vec![1.0; 3])
            .unwrap();
        assert_eq!(w.read_y(0).unwrap().len(), 3);
    }

    #[test]
    fn masking_records_exact_pair() {
        let mut w = ws(2, 11, 10);
        w.mask_bin(0, 5, 1.0).unwrap();
        assert!(w.is_masked(0, 5));
        assert!(!w.is_masked(0, 4));
        assert!(!w.is_masked(1, 5));
        assert_eq!(w.masked_entries(), vec![(0, 5)]);
        assert!(w.mask_bin(0, 10, 1.0).is_err());
        assert!(w.mask_bin(0, 1, 0.0).is_err());
    }

    #[test]
    fn weighted_y_zeroes_masked_bins() {
        let mut w = ws(1, 4, 3);
        w.data_y(0).unwrap().copy_from_slice(&[1.0, 2.0, 3.0]);
        w.mask_bin(0, 1, 1.0).unwrap();
        w.mask_bin(0, 2, 0.5).unwrap();
        assert_eq!(w.weighted_y(0).unwrap(), vec![1.0, 0.0, 1.5]);
        w.mask_spectrum(0).unwrap();
        assert_eq!(w.weighted_y(0).unwrap(), vec![0.0; 3]);
    }

    #[test]
    fn in_place_claim_is_exclusive_and_released() {
        let handle = Handle::new(ws(1, 2, 1));
        let claim = handle.claim("Scale").unwrap();
        assert_eq!(handle.claimed_by().as_deref(), Some("Scale"));
        assert!(handle.claim("Rebin").is_err());
        drop(claim);
        assert!(handle.claim("Rebin").is_ok());
    }

    #[test]
    fn workspace_claim_holds_until_dropped() {
        for ws in [Workspace::from_matrix(ws(1, 2, 1)), Workspace::from_group(WorkspaceGroup::new())] {
            let claim = ws.claim("Scale").unwrap();
            assert_eq!(ws.claimed_by().as_deref(), Some("Scale"));
            assert!(ws.claim("Rebin").is_err());
            drop(claim);
            assert_eq!(ws.claimed_by(), None);
        }
    }

    #[test]
    fn group_keeps_order_and_rejects_duplicates() {
        let mut g = WorkspaceGroup::new();
        g.add("a", Workspace::from_matrix(ws(1, 2, 1))).unwrap();
        g.add("b", Workspace::from_matrix(ws(1, 2, 1))).unwrap();
        assert!(g.add("a", Workspace::from_matrix(ws(1, 2, 1))).is_err());
        assert_eq!(g.names(), vec!["a", "b"]);
        g.remove("a").unwrap();
        assert_eq!(g.len(), 1);
    }
}
