use std::sync::Arc;

use crate::api::algorithm::{Algorithm, ExecutionContext};
use crate::api::parallel::CriticalSection;
use crate::data::factory::{Dimensions, WorkspaceFactory};
use crate::data::selection;
use crate::data::workspace::Workspace;
use crate::error::Result;
use crate::kernel::property::Direction;
use crate::kernel::property_manager::PropertyManager;
use crate::kernel::validators::{MandatoryValidator, OrderedPair};
use crate::numeric;

// ---------------------------------------------------------------------------
// MaskBins
// ---------------------------------------------------------------------------

/// Flag every bin whose centre lies in `[XMin, XMax]`, on the listed spectra
/// or on all of them when `SpectraList` is empty.
#[derive(Debug, Default)]
pub struct MaskBins;

impl Algorithm for MaskBins {
    fn name(&self) -> &str {
        "MaskBins"
    }

    fn category(&self) -> &str {
        "Transforms\\Masking"
    }

    fn summary(&self) -> &str {
        "Marks bins in a workspace as being masked."
    }

    fn init(&mut self, props: &mut PropertyManager) -> Result<()> {
        props.declare_workspace("InputWorkspace", Direction::Input, false, None)?;
        props.declare_workspace("OutputWorkspace", Direction::Output, false, None)?;
        props.declare_property("XMin", f64::NAN, Some(Arc::new(MandatoryValidator)), Direction::Input)?;
        props.declare_property("XMax", f64::NAN, Some(Arc::new(MandatoryValidator)), Direction::Input)?;
        props.declare_property("SpectraList", Vec::<i64>::new(), None, Direction::Input)?;
        props.add_cross_check(Arc::new(OrderedPair::new("XMin", "XMax")));
        Ok(())
    }

    fn exec(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        let input = ctx.input_matrix("InputWorkspace")?;
        let x_min: f64 = ctx.get_property("XMin")?;
        let x_max: f64 = ctx.get_property("XMax")?;
        let list: Vec<i64> = ctx.get_property("SpectraList")?;

        let mut output = input.read().clone();
        let indices = selection::index_list(output.number_histograms(), &list)?;
        let mut n_masked = 0usize;
        for i in indices {
            let centres = output.histogram(i)?.points();
            for (bin, centre) in centres.into_iter().enumerate() {
                if (x_min..=x_max).contains(&centre) {
                    output.mask_bin(i, bin, 1.0)?;
                    n_masked += 1;
                }
            }
        }
        log::debug!("{}: masked {n_masked} bins", ctx.label());
        ctx.set_property("OutputWorkspace", Workspace::from_matrix(output))
    }
}

// ---------------------------------------------------------------------------
// FindDetectorsOutsideLimits
// ---------------------------------------------------------------------------

/// Integrate each unmasked spectrum and flag those whose total lies outside
/// `[LowThreshold, HighThreshold]`.
///
/// The output has one bin per spectrum: 1 for a failing spectrum, 0
/// otherwise. Failing spectra are also masked there when `MaskBadSpectra`.
#[derive(Debug, Default)]
pub struct FindDetectorsOutsideLimits;

impl Algorithm for FindDetectorsOutsideLimits {
    fn name(&self) -> &str {
        "FindDetectorsOutsideLimits"
    }

    fn category(&self) -> &str {
        "Diagnostics"
    }

    fn summary(&self) -> &str {
        "Identifies histograms and their detectors that have total numbers of counts over a user defined maximum or less than the user define minimum."
    }

    fn init(&mut self, props: &mut PropertyManager) -> Result<()> {
        props.declare_workspace("InputWorkspace", Direction::Input, false, None)?;
        props.declare_workspace("OutputWorkspace", Direction::Output, false, None)?;
        props.declare_property("LowThreshold", 0.0, None, Direction::Input)?;
        props.declare_property("HighThreshold", f64::INFINITY, None, Direction::Input)?;
        props.declare_property("RangeLower", f64::NEG_INFINITY, None, Direction::Input)?;
        props.declare_property("RangeUpper", f64::INFINITY, None, Direction::Input)?;
        props.declare_property("MaskBadSpectra", true, None, Direction::Input)?;
        props.declare_property("NumberOfFailures", 0_i64, None, Direction::Output)?;
        props.declare_property("BadIndices", Vec::<i64>::new(), None, Direction::Output)?;
        props.add_cross_check(Arc::new(OrderedPair::new("LowThreshold", "HighThreshold")));
        props.add_cross_check(Arc::new(OrderedPair::new("RangeLower", "RangeUpper")));
        Ok(())
    }

    fn exec(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        let input = ctx.input_matrix("InputWorkspace")?;
        let low: f64 = ctx.get_property("LowThreshold")?;
        let high: f64 = ctx.get_property("HighThreshold")?;
        let lower: f64 = ctx.get_property("RangeLower")?;
        let upper: f64 = ctx.get_property("RangeUpper")?;
        let mask_bad: bool = ctx.get_property("MaskBadSpectra")?;

        let input = input.read();
        let n_spectra = input.number_histograms();
        let tested = selection::unmasked_indices(&input, |i| !input.spectra()[i].is_empty());
        let histogram = input.is_histogram_data();
        let distribution = input.is_distribution();

        let bad = CriticalSection::new(Vec::new());
        ctx.map_spectra(tested.len(), |k| {
            let i = tested[k];
            let spectrum = input.histogram(i)?;
            let x = spectrum.read_x();
            let range = selection::bins_within(x, histogram, lower, upper);
            let weights = input.bin_weights(i)?;
            let (total, _) =
                numeric::integrate(x, spectrum.read_y(), spectrum.read_e(), &weights, range, distribution);
            if !(low..=high).contains(&total) {
                bad.with(|b| b.push(i));
            }
            Ok(())
        })?;
        let mut bad = bad.into_inner();
        bad.sort_unstable();

        let mut output =
            WorkspaceFactory::instance().create_from(&input, Some(Dimensions::new(n_spectra, 2, 1)))?;
        output.clear_bin_masks();
        output.clear_spectrum_masks();
        output.set_distribution(false);
        output.set_y_unit("");
        for i in 0..n_spectra {
            let (x0, x1) = input.histogram(i)?.x_range().unwrap_or((0.0, 0.0));
            let flag = if bad.binary_search(&i).is_ok() { 1.0 } else { 0.0 };
            output.set_histogram(i, Arc::new(vec![x0, x1]), vec![flag], vec![0.0])?;
        }
        if mask_bad {
            for &i in &bad {
                output.mask_spectrum(i)?;
            }
        }
        drop(input);

        log::info!("{} spectra found outside limits", bad.len());
        ctx.set_property("NumberOfFailures", bad.len())?;
        ctx.set_property("BadIndices", bad.iter().map(|&i| i as i64).collect::<Vec<_>>())?;
        ctx.set_property("OutputWorkspace", Workspace::from_matrix(output))
    }
}
