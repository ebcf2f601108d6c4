use std::sync::Arc;

use crate::api::algorithm::{Algorithm, ExecutionContext};
use crate::error::{FrameworkError, Result};
use crate::kernel::property::Direction;
use crate::kernel::property_manager::PropertyManager;
use crate::kernel::validators::{CompositeValidator, HistogramValidator, RawCountValidator};
use crate::numeric;

/// Divide (or multiply) every spectrum of the in/out `Workspace` by its bin
/// widths and flip the distribution flag.
fn convert_in_place(ctx: &mut ExecutionContext<'_>, to_distribution: bool) -> Result<()> {
    let handle = ctx.input_matrix("Workspace")?;
    let mut ws = handle.write();
    if to_distribution {
        for (i, spectrum) in ws.spectra().iter().enumerate() {
            if numeric::bin_widths(spectrum.read_x()).contains(&0.0) {
                return Err(FrameworkError::computation(format!(
                    "spectrum {i} has a zero-width bin"
                )));
            }
        }
    }
    ctx.for_each_spectrum(ws.spectra_mut(), |_, spectrum| {
        let x = spectrum.shared_x();
        let (y, e) = spectrum.data_ye();
        numeric::scale_by_bin_width(&x, y, e, to_distribution)
    })?;
    ws.set_distribution(to_distribution);
    Ok(())
}

/// Make a histogram workspace a distribution by dividing by bin width.
#[derive(Debug, Default)]
pub struct ConvertToDistribution;

impl Algorithm for ConvertToDistribution {
    fn name(&self) -> &str {
        "ConvertToDistribution"
    }

    fn category(&self) -> &str {
        "Transforms\\Distribution"
    }

    fn summary(&self) -> &str {
        "Makes a histogram workspace a distribution i.e. divides by the bin width."
    }

    fn init(&mut self, props: &mut PropertyManager) -> Result<()> {
        let validator = CompositeValidator::new()
            .with(HistogramValidator::new())
            .with(RawCountValidator::new());
        props.declare_workspace("Workspace", Direction::InOut, false, Some(Arc::new(validator)))
    }

    fn exec(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        convert_in_place(ctx, true)
    }
}

/// Turn a distribution back into counts by multiplying by bin width.
#[derive(Debug, Default)]
pub struct ConvertFromDistribution;

impl Algorithm for ConvertFromDistribution {
    fn name(&self) -> &str {
        "ConvertFromDistribution"
    }

    fn category(&self) -> &str {
        "Transforms\\Distribution"
    }

    fn summary(&self) -> &str {
        "Converts a histogram workspace from a distribution i.e. multiplies by the bin width."
    }

    fn init(&mut self, props: &mut PropertyManager) -> Result<()> {
        let validator = CompositeValidator::new()
            .with(HistogramValidator::new())
            .with(RawCountValidator::distribution());
        props.declare_workspace("Workspace", Direction::InOut, false, Some(Arc::new(validator)))
    }

    fn exec(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        convert_in_place(ctx, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::framework::Framework;
    use crate::data::workspace::{MatrixWorkspace, Workspace};
    use crate::error::FrameworkError;

    fn counts(fw: &Framework) {
        let mut ws = MatrixWorkspace::new("Workspace2D", 2, 4, 3).unwrap();
        let x = Arc::new(vec![0.0, 1.0, 3.0, 7.0]);
        for i in 0..2 {
            ws.set_histogram(i, Arc::clone(&x), vec![2.0, 4.0, 8.0], vec![2.0, 2.0, 4.0])
                .unwrap();
        }
        fw.ads().add("ws", Workspace::from_matrix(ws)).unwrap();
    }

    #[test]
    fn convert_to_and_back() {
        let fw = Framework::new();
        counts(&fw);

        let mut to = fw.create_algorithm("ConvertToDistribution", None).unwrap();
        to.set_property_value("Workspace", "ws").unwrap();
        assert!(to.execute().unwrap());
        {
            let handle = fw.ads().retrieve_matrix("ws").unwrap();
            let ws = handle.read();
            assert!(ws.is_distribution());
            assert_eq!(ws.read_y(1).unwrap(), &[2.0, 2.0, 2.0]);
            assert_eq!(ws.read_e(0).unwrap(), &[2.0, 1.0, 1.0]);
            // X stays shared between spectra.
            assert!(ws.spectra()[0].shares_x_with(&ws.spectra()[1]));
        }

        let mut back = fw.create_algorithm("ConvertFromDistribution", None).unwrap();
        back.set_property_value("Workspace", "ws").unwrap();
        assert!(back.execute().unwrap());
        let handle = fw.ads().retrieve_matrix("ws").unwrap();
        let ws = handle.read();
        assert!(!ws.is_distribution());
        assert_eq!(ws.read_y(0).unwrap(), &[2.0, 4.0, 8.0]);
        assert_eq!(ws.history().size(), 2);
    }

    #[test]
    fn converting_twice_is_rejected() {
        let fw = Framework::new();
        counts(&fw);
        let mut to = fw.create_algorithm("ConvertToDistribution", None).unwrap();
        to.set_rethrows(true);
        to.set_property_value("Workspace", "ws").unwrap();
        to.execute().unwrap();
        to.set_property_value("Workspace", "ws").unwrap();
        let err = to.execute().unwrap_err();
        match err {
            FrameworkError::InvalidProperties(v) => {
                assert!(v["Workspace"].contains("numbers of counts"), "{v:?}")
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
