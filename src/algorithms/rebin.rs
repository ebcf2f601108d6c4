use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::algorithm::{Algorithm, ExecutionContext};
use crate::data::factory::{Dimensions, WorkspaceFactory};
use crate::data::workspace::{MatrixHandle, Workspace};
use crate::error::{FrameworkError, Result};
use crate::kernel::property::Direction;
use crate::kernel::property_manager::PropertyManager;
use crate::kernel::validators::{BoundedValidator, CommonBinsValidator, HistogramValidator, RebinParamsValidator};
use crate::numeric;

// ---------------------------------------------------------------------------
// Rebin
// ---------------------------------------------------------------------------

/// Rebin histogram data onto boundaries given by `Params`.
///
/// Counts are redistributed by fractional overlap, distributions keep their
/// area; errors add in quadrature. Bin masks follow the overlap.
#[derive(Debug, Default)]
pub struct Rebin;

impl Algorithm for Rebin {
    fn name(&self) -> &str {
        "Rebin"
    }

    fn category(&self) -> &str {
        "Transforms\\Rebin"
    }

    fn summary(&self) -> &str {
        "Rebins data with new X bin boundaries."
    }

    fn init(&mut self, props: &mut PropertyManager) -> Result<()> {
        props.declare_workspace(
            "InputWorkspace",
            Direction::Input,
            false,
            Some(Arc::new(HistogramValidator::new())),
        )?;
        props.declare_workspace("OutputWorkspace", Direction::Output, false, None)?;
        props.declare_property(
            "Params",
            Vec::<f64>::new(),
            Some(Arc::new(RebinParamsValidator::default())),
            Direction::Input,
        )?;
        props.declare_property("FullBinsOnly", false, None, Direction::Input)?;
        Ok(())
    }

    fn exec(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        let input = ctx.input_matrix("InputWorkspace")?;
        let mut params: Vec<f64> = ctx.get_property("Params")?;
        let full_bins_only: bool = ctx.get_property("FullBinsOnly")?;

        let input = input.read();
        if params.len() == 1 {
            let (lo, hi) = input
                .x_range()
                .ok_or_else(|| FrameworkError::computation("input workspace has no X values"))?;
            params = vec![lo, params[0], hi];
        }
        let xnew = Arc::new(numeric::create_axis_from_rebin_params(&params, full_bins_only)?);
        let n_bins = xnew.len() - 1;
        let distribution = input.is_distribution();

        let mut output = WorkspaceFactory::instance().create_from(
            &input,
            Some(Dimensions::new(input.number_histograms(), xnew.len(), n_bins)),
        )?;
        output.clear_bin_masks();

        ctx.for_each_spectrum(output.spectra_mut(), |i, spectrum| {
            let source = input.histogram(i)?;
            let (y, e) = numeric::rebin(source.read_x(), source.read_y(), source.read_e(), &xnew, distribution)?;
            spectrum.replace(Arc::clone(&xnew), y, e)
        })?;

        for i in 0..input.number_histograms() {
            if let Some(masked) = input.masked_bins(i) {
                for (bin, weight) in numeric::rebin_masks(input.read_x(i)?, masked, &xnew) {
                    output.mask_bin(i, bin, weight)?;
                }
            }
        }
        drop(input);
        ctx.progress(1.0, "Rebinned");
        ctx.set_property("OutputWorkspace", Workspace::from_matrix(output))
    }
}

// ---------------------------------------------------------------------------
// Rebunch
// ---------------------------------------------------------------------------

/// Merge `NBunch` adjacent bins.
///
/// Histogram counts are summed; histogram distributions take the
/// width-weighted mean; point data take the plain mean with
/// `sqrt(sum e²) / n` errors. Bin masks are dropped.
#[derive(Debug, Default)]
pub struct Rebunch;

impl Algorithm for Rebunch {
    fn name(&self) -> &str {
        "Rebunch"
    }

    fn category(&self) -> &str {
        "Transforms\\Rebin"
    }

    fn summary(&self) -> &str {
        "Rebins data by adding together n_bunch successive bins."
    }

    fn init(&mut self, props: &mut PropertyManager) -> Result<()> {
        props.declare_workspace("InputWorkspace", Direction::Input, false, None)?;
        props.declare_workspace("OutputWorkspace", Direction::Output, false, None)?;
        props.declare_property(
            "NBunch",
            1_i64,
            Some(Arc::new(BoundedValidator::new().lower(1.0))),
            Direction::Input,
        )?;
        Ok(())
    }

    fn exec(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        let input = ctx.input_matrix("InputWorkspace")?;
        let n_bunch: usize = ctx.get_property("NBunch")?;
        let input = input.read();

        let n_y = input.blocksize().div_ceil(n_bunch);
        let n_x = n_y + usize::from(input.is_histogram_data());
        let distribution = input.is_distribution();
        let mut output = WorkspaceFactory::instance()
            .create_from(&input, Some(Dimensions::new(input.number_histograms(), n_x, n_y)))?;
        output.clear_bin_masks();

        ctx.for_each_spectrum(output.spectra_mut(), |i, spectrum| {
            let source = input.histogram(i)?;
            let (x, y, e) = numeric::rebunch(source.read_x(), source.read_y(), source.read_e(), n_bunch, distribution)?;
            spectrum.replace(Arc::new(x), y, e)
        })?;
        drop(input);
        ctx.set_property("OutputWorkspace", Workspace::from_matrix(output))
    }
}

// ---------------------------------------------------------------------------
// RebinToWorkspace
// ---------------------------------------------------------------------------

/// Rebin one workspace onto the bin boundaries of another, through a child
/// `Rebin`.
#[derive(Debug, Default)]
pub struct RebinToWorkspace;

/// `x1, dx1, x2, ...` reproducing `edges` exactly.
fn params_for_edges(edges: &[f64]) -> Vec<f64> {
    let mut params = Vec::with_capacity(edges.len() * 2);
    for w in edges.windows(2) {
        if params.is_empty() {
            params.push(w[0]);
        }
        params.push(w[1] - w[0]);
        params.push(w[1]);
    }
    params
}

impl Algorithm for RebinToWorkspace {
    fn name(&self) -> &str {
        "RebinToWorkspace"
    }

    fn category(&self) -> &str {
        "Transforms\\Rebin"
    }

    fn summary(&self) -> &str {
        "Rebin a selected workspace to the same binning as a different workspace"
    }

    fn init(&mut self, props: &mut PropertyManager) -> Result<()> {
        props.declare_workspace(
            "WorkspaceToRebin",
            Direction::Input,
            false,
            Some(Arc::new(HistogramValidator::new())),
        )?;
        props.declare_workspace(
            "WorkspaceToMatch",
            Direction::Input,
            false,
            Some(Arc::new(CommonBinsValidator)),
        )?;
        props.declare_workspace("OutputWorkspace", Direction::Output, false, None)?;
        Ok(())
    }

    fn validate_inputs(&self, props: &PropertyManager) -> BTreeMap<String, String> {
        let mut violations = BTreeMap::new();
        if let Ok(m) = props.get_property::<MatrixHandle>("WorkspaceToMatch") {
            let ws = m.read();
            if !ws.is_histogram_data() || ws.number_histograms() == 0 {
                violations.insert(
                    "WorkspaceToMatch".to_string(),
                    "The workspace must contain histogram data".to_string(),
                );
            }
        }
        violations
    }

    fn exec(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        let to_rebin = ctx.input_matrix("WorkspaceToRebin")?;
        let to_match = ctx.input_matrix("WorkspaceToMatch")?;
        let params = params_for_edges(to_match.read().read_x(0)?);

        let mut rebin = ctx.create_child_algorithm("Rebin", None, 0.0, 1.0, false)?;
        rebin.set_property("InputWorkspace", Workspace::Matrix(to_rebin))?;
        rebin.set_property("Params", params)?;
        rebin.execute()?;
        let output = rebin.output_matrix("OutputWorkspace")?;
        ctx.set_property("OutputWorkspace", output)
    }
}
