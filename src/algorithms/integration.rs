use std::sync::Arc;

use crate::api::algorithm::{Algorithm, ExecutionContext};
use crate::data::factory::{Dimensions, WorkspaceFactory};
use crate::data::histogram::Histogram;
use crate::data::selection;
use crate::data::workspace::{MatrixWorkspace, Workspace};
use crate::error::{FrameworkError, Result};
use crate::kernel::property::Direction;
use crate::kernel::property_manager::PropertyManager;
use crate::kernel::validators::{BoundedValidator, IndexOrder, OrderedPair};
use crate::numeric;

/// `StartWorkspaceIndex` / `EndWorkspaceIndex`, shared by both algorithms here.
fn declare_index_range(props: &mut PropertyManager) -> Result<()> {
    props.declare_property(
        "StartWorkspaceIndex",
        0_i64,
        Some(Arc::new(BoundedValidator::new().lower(0.0))),
        Direction::Input,
    )?;
    props.declare_property("EndWorkspaceIndex", -1_i64, None, Direction::Input)?;
    props.add_cross_check(Arc::new(IndexOrder::new("StartWorkspaceIndex", "EndWorkspaceIndex")));
    Ok(())
}

fn selected_indices(ctx: &ExecutionContext<'_>, n_spectra: usize) -> Result<std::ops::RangeInclusive<usize>> {
    let start: i64 = ctx.get_property("StartWorkspaceIndex")?;
    let end: i64 = ctx.get_property("EndWorkspaceIndex")?;
    selection::index_range(n_spectra, start, end)
}

// ---------------------------------------------------------------------------
// Integration
// ---------------------------------------------------------------------------

/// Sum the bins of each spectrum that lie in `[RangeLower, RangeUpper]`.
///
/// The output has one bin per selected spectrum spanning the integrated
/// range. Masked bins contribute nothing; whole-spectrum masks carry over.
#[derive(Debug, Default)]
pub struct Integration;

impl Algorithm for Integration {
    fn name(&self) -> &str {
        "Integration"
    }

    fn category(&self) -> &str {
        "Arithmetic\\Transforms"
    }

    fn summary(&self) -> &str {
        "Integration takes a 2D workspace as input and sums the data values. Optionally, the range summed can be restricted in either dimension."
    }

    fn init(&mut self, props: &mut PropertyManager) -> Result<()> {
        props.declare_workspace("InputWorkspace", Direction::Input, false, None)?;
        props.declare_workspace("OutputWorkspace", Direction::Output, false, None)?;
        props.declare_property("RangeLower", f64::NEG_INFINITY, None, Direction::Input)?;
        props.declare_property("RangeUpper", f64::INFINITY, None, Direction::Input)?;
        props.add_cross_check(Arc::new(OrderedPair::new("RangeLower", "RangeUpper")));
        declare_index_range(props)
    }

    fn exec(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        let input = ctx.input_matrix("InputWorkspace")?;
        let lower: f64 = ctx.get_property("RangeLower")?;
        let upper: f64 = ctx.get_property("RangeUpper")?;
        let input = input.read();
        let indices = selected_indices(ctx, input.number_histograms())?;
        let first = *indices.start();
        let n_out = indices.count();

        let mut output =
            WorkspaceFactory::instance().create_from(&input, Some(Dimensions::new(n_out, 2, 1)))?;
        output.clear_bin_masks();
        output.clear_spectrum_masks();
        output.set_distribution(false);

        let histogram = input.is_histogram_data();
        let distribution = input.is_distribution();
        ctx.for_each_spectrum(output.spectra_mut(), |j, spectrum| {
            let i = first + j;
            let source = input.histogram(i)?;
            let x = source.read_x();
            let (lo, hi) = selection::bins_within(x, histogram, lower, upper);
            let edges = if histogram {
                vec![x[lo], x[hi]]
            } else if hi > lo {
                vec![x[lo], x[hi - 1]]
            } else {
                let anchor = x.get(lo).or(x.last()).copied().unwrap_or(0.0);
                vec![anchor, anchor]
            };
            let weights = input.bin_weights(i)?;
            let (sum, err) =
                numeric::integrate(x, source.read_y(), source.read_e(), &weights, (lo, hi), distribution);
            spectrum.replace(Arc::new(edges), vec![sum], vec![err])
        })?;

        for j in 0..n_out {
            if input.is_spectrum_masked(first + j) {
                output.mask_spectrum(j)?;
            }
        }
        drop(input);
        ctx.set_property("OutputWorkspace", Workspace::from_matrix(output))
    }
}

// ---------------------------------------------------------------------------
// CropWorkspace
// ---------------------------------------------------------------------------

/// Keep the bins inside `[XMin, XMax]` of the spectra in the index range.
#[derive(Debug, Default)]
pub struct CropWorkspace;

impl Algorithm for CropWorkspace {
    fn name(&self) -> &str {
        "CropWorkspace"
    }

    fn category(&self) -> &str {
        "Transforms\\Splitting"
    }

    fn summary(&self) -> &str {
        "Extracts a 'block' from a workspace and places it in a new workspace."
    }

    fn init(&mut self, props: &mut PropertyManager) -> Result<()> {
        props.declare_workspace("InputWorkspace", Direction::Input, false, None)?;
        props.declare_workspace("OutputWorkspace", Direction::Output, false, None)?;
        props.declare_property("XMin", f64::NEG_INFINITY, None, Direction::Input)?;
        props.declare_property("XMax", f64::INFINITY, None, Direction::Input)?;
        props.add_cross_check(Arc::new(OrderedPair::new("XMin", "XMax")));
        declare_index_range(props)
    }

    fn exec(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        let input = ctx.input_matrix("InputWorkspace")?;
        let x_min: f64 = ctx.get_property("XMin")?;
        let x_max: f64 = ctx.get_property("XMax")?;
        let input = input.read();
        let indices = selected_indices(ctx, input.number_histograms())?;
        let histogram = input.is_histogram_data();

        let mut spectra = Vec::new();
        let mut windows = Vec::new();
        // (source spectrum, lo, hi, cropped X) of the previous spectrum
        let mut last_x: Option<(usize, usize, usize, Arc<Vec<f64>>)> = None;
        for i in indices {
            ctx.interruption_point()?;
            let source = input.histogram(i)?;
            let x = source.read_x();
            let (lo, hi) = selection::bins_within(x, histogram, x_min, x_max);
            if hi <= lo {
                return Err(FrameworkError::computation(format!(
                    "no bins of spectrum {i} lie within [{x_min}, {x_max}]"
                )));
            }
            let cropped_x = match &last_x {
                Some((prev, plo, phi, shared))
                    if (*plo, *phi) == (lo, hi) && source.shares_x_with(input.histogram(*prev)?) =>
                {
                    Arc::clone(shared)
                }
                _ => Arc::new(x[lo..hi + usize::from(histogram)].to_vec()),
            };
            last_x = Some((i, lo, hi, Arc::clone(&cropped_x)));
            spectra.push(Histogram::with_shared_x(
                cropped_x,
                source.read_y()[lo..hi].to_vec(),
                source.read_e()[lo..hi].to_vec(),
            )?);
            windows.push((i, lo, hi));
        }

        let mut output = MatrixWorkspace::from_histograms(input.id(), spectra)?;
        output.copy_metadata_from(&input);
        output.clear_bin_masks();
        output.clear_spectrum_masks();
        for (j, &(i, lo, hi)) in windows.iter().enumerate() {
            if input.is_spectrum_masked(i) {
                output.mask_spectrum(j)?;
            }
            if let Some(masked) = input.masked_bins(i) {
                for (&bin, &weight) in masked.range(lo..hi) {
                    output.mask_bin(j, bin - lo, weight)?;
                }
            }
        }
        drop(input);
        ctx.set_property("OutputWorkspace", Workspace::from_matrix(output))
    }
}
