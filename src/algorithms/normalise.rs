use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::algorithm::{Algorithm, ExecutionContext};
use crate::data::workspace::{MatrixHandle, Workspace};
use crate::error::Result;
use crate::kernel::property::Direction;
use crate::kernel::property_manager::PropertyManager;
use crate::kernel::validators::{BoundedValidator, OrderedPair};

/// Divide every spectrum by the integrated counts of a monitor spectrum.
///
/// The monitor total comes from a child `Integration`. If that child fails,
/// or the total is not a positive finite number, a warning is logged and the
/// data are normalised by 1.
#[derive(Debug, Default)]
pub struct NormaliseToMonitor;

impl NormaliseToMonitor {
    fn monitor_total(ctx: &ExecutionContext<'_>, input: &MatrixHandle) -> Result<f64> {
        let monitor: i64 = ctx.get_property("MonitorSpectrum")?;
        let mut integration = ctx.create_child_algorithm("Integration", None, 0.0, 0.5, false)?;
        integration.set_property("InputWorkspace", Workspace::Matrix(Arc::clone(input)))?;
        integration.set_property("RangeLower", ctx.get_property::<f64>("IntegrationRangeMin")?)?;
        integration.set_property("RangeUpper", ctx.get_property::<f64>("IntegrationRangeMax")?)?;
        integration.set_property("StartWorkspaceIndex", monitor)?;
        integration.set_property("EndWorkspaceIndex", monitor)?;
        integration.execute()?;
        let summed = integration.output_matrix("OutputWorkspace")?;
        let total = summed.read().read_y(0)?[0];
        Ok(total)
    }
}

impl Algorithm for NormaliseToMonitor {
    fn name(&self) -> &str {
        "NormaliseToMonitor"
    }

    fn category(&self) -> &str {
        "CorrectionFunctions\\NormalisationCorrections"
    }

    fn summary(&self) -> &str {
        "Normalises a 2D workspace by the integrated counts of a monitor spectrum."
    }

    fn init(&mut self, props: &mut PropertyManager) -> Result<()> {
        props.declare_workspace("InputWorkspace", Direction::Input, false, None)?;
        props.declare_workspace("OutputWorkspace", Direction::Output, false, None)?;
        props.declare_property(
            "MonitorSpectrum",
            0_i64,
            Some(Arc::new(BoundedValidator::new().lower(0.0))),
            Direction::Input,
        )?;
        props.declare_property("IntegrationRangeMin", f64::NEG_INFINITY, None, Direction::Input)?;
        props.declare_property("IntegrationRangeMax", f64::INFINITY, None, Direction::Input)?;
        props.declare_property("NormalisationFactor", 1.0, None, Direction::Output)?;
        props.add_cross_check(Arc::new(OrderedPair::new("IntegrationRangeMin", "IntegrationRangeMax")));
        Ok(())
    }

    fn validate_inputs(&self, props: &PropertyManager) -> BTreeMap<String, String> {
        let mut violations = BTreeMap::new();
        if let (Ok(ws), Ok(monitor)) = (
            props.get_property::<MatrixHandle>("InputWorkspace"),
            props.get_property::<usize>("MonitorSpectrum"),
        ) {
            let n = ws.read().number_histograms();
            if monitor >= n {
                violations.insert(
                    "MonitorSpectrum".to_string(),
                    format!("Workspace index {monitor} is out of range; the workspace has {n} spectra"),
                );
            }
        }
        violations
    }

    fn exec(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        let input = ctx.input_matrix("InputWorkspace")?;

        let factor = match Self::monitor_total(ctx, &input) {
            Ok(total) if total.is_finite() && total > 0.0 => total,
            Ok(total) => {
                log::warn!("{}: monitor total is {total}; normalising by 1", ctx.label());
                1.0
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                log::warn!("{}: monitor integration failed ({e}); normalising by 1", ctx.label());
                1.0
            }
        };
        ctx.interruption_point()?;

        let mut output = input.read().clone();
        ctx.for_each_spectrum(output.spectra_mut(), |_, spectrum| {
            let (y, e) = spectrum.data_ye();
            y.iter_mut().for_each(|v| *v /= factor);
            e.iter_mut().for_each(|v| *v /= factor);
            Ok(())
        })?;
        ctx.progress(1.0, "Normalised");

        ctx.set_property("NormalisationFactor", factor)?;
        ctx.set_property("OutputWorkspace", Workspace::from_matrix(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::framework::Framework;
    use crate::data::workspace::MatrixWorkspace;
    use crate::error::FrameworkError;
    use approx::assert_relative_eq;

    fn with_monitor(fw: &Framework) {
        let mut ws = MatrixWorkspace::new("Workspace2D", 3, 4, 3).unwrap();
        let x = Arc::new(vec![0.0, 1.0, 2.0, 3.0]);
        ws.set_histogram(0, Arc::clone(&x), vec![2.0, 4.0, 4.0], vec![1.0; 3]).unwrap();
        for i in 1..3 {
            ws.set_histogram(i, Arc::clone(&x), vec![20.0; 3], vec![10.0; 3]).unwrap();
        }
        fw.ads().add("run", Workspace::from_matrix(ws)).unwrap();
    }

    #[test]
    fn divides_by_monitor_total() {
        let fw = Framework::new();
        with_monitor(&fw);
        let mut alg = fw.create_algorithm("NormaliseToMonitor", None).unwrap();
        alg.set_properties("InputWorkspace=run;OutputWorkspace=norm").unwrap();
        assert!(alg.execute().unwrap());
        assert_relative_eq!(alg.get_property::<f64>("NormalisationFactor").unwrap(), 10.0);

        let out = fw.ads().retrieve_matrix("norm").unwrap();
        let ws = out.read();
        assert_eq!(ws.read_y(1).unwrap(), &[2.0; 3]);
        assert_eq!(ws.read_e(2).unwrap(), &[1.0; 3]);
        let entry = ws.history().last_algorithm().unwrap();
        assert_eq!(entry.child(0).unwrap().name(), "Integration");
    }

    #[test]
    fn empty_monitor_range_falls_back_to_one() {
        let fw = Framework::new();
        with_monitor(&fw);
        let mut alg = fw.create_algorithm("NormaliseToMonitor", None).unwrap();
        alg.set_properties("InputWorkspace=run;OutputWorkspace=norm;IntegrationRangeMin=100;IntegrationRangeMax=200")
            .unwrap();
        assert!(alg.execute().unwrap());
        assert_eq!(alg.get_property::<f64>("NormalisationFactor").unwrap(), 1.0);
        let out = alg.output_matrix("OutputWorkspace").unwrap();
        assert_eq!(out.read().read_y(1).unwrap(), &[20.0; 3]);
    }

    /// Stands in for `Integration` and always fails.
    #[derive(Default)]
    struct BrokenIntegration;

    impl Algorithm for BrokenIntegration {
        fn name(&self) -> &str {
            "Integration"
        }
        fn init(&mut self, props: &mut PropertyManager) -> Result<()> {
            props.declare_workspace("InputWorkspace", Direction::Input, false, None)?;
            props.declare_workspace("OutputWorkspace", Direction::Output, false, None)?;
            for name in ["RangeLower", "RangeUpper"] {
                props.declare_property(name, 0.0, None, Direction::Input)?;
            }
            for name in ["StartWorkspaceIndex", "EndWorkspaceIndex"] {
                props.declare_property(name, 0_i64, None, Direction::Input)?;
            }
            Ok(())
        }
        fn exec(&mut self, _ctx: &mut ExecutionContext<'_>) -> Result<()> {
            Err(FrameworkError::computation("detector electronics on fire"))
        }
    }

    #[test]
    fn failing_child_falls_back_to_one() {
        let fw = Framework::new();
        fw.algorithms().subscribe::<BrokenIntegration>();
        with_monitor(&fw);
        let mut alg = fw.create_algorithm("NormaliseToMonitor", None).unwrap();
        alg.set_properties("InputWorkspace=run;OutputWorkspace=norm").unwrap();
        assert!(alg.execute().unwrap());
        assert_eq!(alg.get_property::<f64>("NormalisationFactor").unwrap(), 1.0);
        // The failed child leaves no trace in the history.
        assert!(alg.history().unwrap().child_histories().is_empty());
    }

    #[test]
    fn monitor_index_is_checked() {
        let fw = Framework::new();
        with_monitor(&fw);
        let mut alg = fw.create_algorithm("NormaliseToMonitor", None).unwrap();
        alg.set_rethrows(true);
        alg.set_properties("InputWorkspace=run;OutputWorkspace=norm;MonitorSpectrum=3").unwrap();
        match alg.execute().unwrap_err() {
            FrameworkError::InvalidProperties(v) => assert!(v.contains_key("MonitorSpectrum")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
