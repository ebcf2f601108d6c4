use std::collections::BTreeMap;
use std::sync::OnceLock;

use parking_lot::RwLock;

use crate::data::workspace::MatrixWorkspace;
use crate::error::{FrameworkError, Result};

/// Builds a zero-filled workspace of one concrete type from
/// `(n_spectra, n_x, n_y)`.
pub type WorkspaceConstructor = fn(usize, usize, usize) -> Result<MatrixWorkspace>;

pub const WORKSPACE_2D: &str = "Workspace2D";
pub const WORKSPACE_1D: &str = "Workspace1D";
pub const SINGLE_VALUE: &str = "WorkspaceSingleValue";

/// Spectrum count and per-spectrum X/Y lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub n_spectra: usize,
    pub n_x: usize,
    pub n_y: usize,
}

impl Dimensions {
    pub fn new(n_spectra: usize, n_x: usize, n_y: usize) -> Self {
        Dimensions { n_spectra, n_x, n_y }
    }

    /// Dimensions of an existing workspace, taken from spectrum 0.
    pub fn of(ws: &MatrixWorkspace) -> Self {
        let n_y = ws.blocksize();
        let n_x = ws.spectra().first().map(|h| h.read_x().len()).unwrap_or(n_y);
        Dimensions::new(ws.number_histograms(), n_x, n_y)
    }
}

// ---------------------------------------------------------------------------
// WorkspaceFactory
// ---------------------------------------------------------------------------

/// Registry of concrete workspace types.
pub struct WorkspaceFactory {
    constructors: RwLock<BTreeMap<String, WorkspaceConstructor>>,
}

impl Default for WorkspaceFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkspaceFactory {
    /// A factory with the built-in types registered.
    pub fn new() -> Self {
        let factory = WorkspaceFactory {
            constructors: RwLock::new(BTreeMap::new()),
        };
        factory.subscribe(WORKSPACE_2D, |n, nx, ny| {
            MatrixWorkspace::new(WORKSPACE_2D, n, nx, ny)
        });
        factory.subscribe(WORKSPACE_1D, |n, nx, ny| {
            if n != 1 {
                return Err(FrameworkError::invalid_size(format!(
                    "{WORKSPACE_1D} holds exactly one spectrum, asked for {n}"
                )));
            }
            MatrixWorkspace::new(WORKSPACE_1D, 1, nx, ny)
        });
        factory.subscribe(SINGLE_VALUE, |n, nx, ny| {
            if (n, nx, ny) != (1, 1, 1) {
                return Err(FrameworkError::invalid_size(format!(
                    "{SINGLE_VALUE} is 1x1x1, asked for {n}x{nx}x{ny}"
                )));
            }
            MatrixWorkspace::new(SINGLE_VALUE, 1, 1, 1)
        });
        factory
    }

    /// The process-wide factory.
    pub fn instance() -> &'static WorkspaceFactory {
        static INSTANCE: OnceLock<WorkspaceFactory> = OnceLock::new();
        INSTANCE.get_or_init(WorkspaceFactory::new)
    }

    /// Register (or replace) a concrete type.
    pub fn subscribe(&self, type_id: &str, constructor: WorkspaceConstructor) {
        self.constructors.write().insert(type_id.to_string(), constructor);
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.constructors.read().keys().cloned().collect()
    }

    /// Allocate an empty-valued workspace of a registered type.
    pub fn create(&self, type_id: &str, n_spectra: usize, n_x: usize, n_y: usize) -> Result<MatrixWorkspace> {
        let constructor = self
            .constructors
            .read()
            .get(type_id)
            .copied()
            .ok_or_else(|| FrameworkError::UnsupportedType(type_id.to_string()))?;
        constructor(n_spectra, n_x, n_y)
    }

    /// New workspace of the template's type carrying its metadata; `dims`
    /// overrides the template's own dimensions.
    pub fn create_from(&self, template: &MatrixWorkspace, dims: Option<Dimensions>) -> Result<MatrixWorkspace> {
        self.create_from_as(template.id(), template, dims)
    }

    /// As [`WorkspaceFactory::create_from`] but with an explicit concrete type.
    pub fn create_from_as(
        &self,
        type_id: &str,
        template: &MatrixWorkspace,
        dims: Option<Dimensions>,
    ) -> Result<MatrixWorkspace> {
        let Dimensions { n_spectra, n_x, n_y } = dims.unwrap_or_else(|| Dimensions::of(template));
        let mut ws = self.create(type_id, n_spectra, n_x, n_y)?;
        ws.copy_metadata_from(template);
        Ok(ws)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::run::LogValue;

    #[test]
    fn unknown_type_is_unsupported() {
        let f = WorkspaceFactory::new();
        assert!(matches!(
            f.create("EventWorkspace", 1, 2, 1),
            Err(FrameworkError::UnsupportedType(_))
        ));
    }

    #[test]
    fn single_value_shape_is_fixed() {
        let f = WorkspaceFactory::new();
        assert!(f.create(SINGLE_VALUE, 1, 1, 1).is_ok());
        assert!(f.create(SINGLE_VALUE, 2, 1, 1).is_err());
        assert!(f.create(WORKSPACE_1D, 2, 3, 2).is_err());
    }

    #[test]
    fn create_from_copies_metadata_and_overrides_dims() {
        let f = WorkspaceFactory::new();
        let mut parent = f.create(WORKSPACE_2D, 3, 11, 10).unwrap();
        parent.set_distribution(true);
        parent.set_x_unit("TOF");
        parent
            .run_mut()
            .add_property("run_number", LogValue::Integer(1234), false)
            .unwrap();
        parent.mask_bin(1, 8, 1.0).unwrap();
        parent.mask_bin(2, 1, 1.0).unwrap();

        let same = f.create_from(&parent, None).unwrap();
        assert_eq!(Dimensions::of(&same), Dimensions::new(3, 11, 10));
        assert!(same.is_distribution());
        assert_eq!(same.masked_entries(), vec![(1, 8), (2, 1)]);

        let rebinned = f.create_from(&parent, Some(Dimensions::new(3, 6, 5))).unwrap();
        assert_eq!(rebinned.blocksize(), 5);
        assert_eq!(rebinned.x_unit(), "TOF");
        assert!(rebinned.run().has_property("run_number"));
        // Bin 8 no longer exists in the narrower output.
        assert_eq!(rebinned.masked_entries(), vec![(2, 1)]);
    }
}
