use std::collections::BTreeMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

use crate::api::algorithm::{Algorithm, ExecutionContext};
use crate::data::factory::{WorkspaceFactory, WORKSPACE_2D};
use crate::data::instrument::SimpleInstrument;
use crate::data::run::{LogValue, PROTON_CHARGE_LOG};
use crate::data::workspace::Workspace;
use crate::error::{FrameworkError, Result};
use crate::kernel::property::Direction;
use crate::kernel::property_manager::PropertyManager;
use crate::kernel::validators::{BoundedValidator, ListValidator, MandatoryValidator};

// ---------------------------------------------------------------------------
// CreateWorkspace
// ---------------------------------------------------------------------------

/// Build a workspace from flat DataX / DataY / DataE arrays.
///
/// DataX holds either one X array shared by every spectrum or NSpec arrays
/// back to back; bin edges or points are inferred from its length.
#[derive(Debug, Default)]
pub struct CreateWorkspace;

/// `(shared, n_x)` for the given array lengths.
fn x_layout(n_x_total: usize, n_y_total: usize, n_spec: usize) -> std::result::Result<(bool, usize), String> {
    if n_spec == 0 || n_y_total % n_spec != 0 {
        return Err(format!(
            "DataY has {n_y_total} values, which is not a multiple of NSpec ({n_spec})"
        ));
    }
    let n_y = n_y_total / n_spec;
    for n_x in [n_y + 1, n_y] {
        if n_x_total == n_x {
            return Ok((true, n_x));
        }
        if n_x_total == n_x * n_spec {
            return Ok((false, n_x));
        }
    }
    Err(format!(
        "DataX must hold {} or {} values per spectrum, shared or for each of the {n_spec} spectra; got {n_x_total}",
        n_y + 1,
        n_y
    ))
}

impl Algorithm for CreateWorkspace {
    fn name(&self) -> &str {
        "CreateWorkspace"
    }

    fn category(&self) -> &str {
        "Utility\\Workspaces"
    }

    fn summary(&self) -> &str {
        "Creates a workspace from lists of X, Y and E values."
    }

    fn init(&mut self, props: &mut PropertyManager) -> Result<()> {
        props.declare_property("DataX", Vec::<f64>::new(), Some(Arc::new(MandatoryValidator)), Direction::Input)?;
        props.declare_property("DataY", Vec::<f64>::new(), Some(Arc::new(MandatoryValidator)), Direction::Input)?;
        props.declare_property("DataE", Vec::<f64>::new(), None, Direction::Input)?;
        props.declare_property(
            "NSpec",
            1_i64,
            Some(Arc::new(BoundedValidator::new().lower(1.0))),
            Direction::Input,
        )?;
        props.declare_property("UnitX", "", None, Direction::Input)?;
        props.declare_property("YUnitLabel", "", None, Direction::Input)?;
        props.declare_property("Distribution", false, None, Direction::Input)?;
        props.declare_property("WorkspaceTitle", "", None, Direction::Input)?;
        props.declare_workspace("OutputWorkspace", Direction::Output, false, None)?;
        Ok(())
    }

    fn validate_inputs(&self, props: &PropertyManager) -> BTreeMap<String, String> {
        let mut violations = BTreeMap::new();
        let x: Vec<f64> = props.get_property("DataX").unwrap_or_default();
        let y: Vec<f64> = props.get_property("DataY").unwrap_or_default();
        let e: Vec<f64> = props.get_property("DataE").unwrap_or_default();
        let n_spec: usize = props.get_property("NSpec").unwrap_or(1);
        if let Err(msg) = x_layout(x.len(), y.len(), n_spec) {
            violations.insert("DataX".to_string(), msg);
        }
        if !e.is_empty() && e.len() != y.len() {
            violations.insert(
                "DataE".to_string(),
                format!("DataE must be empty or match DataY ({} values)", y.len()),
            );
        }
        violations
    }

    fn exec(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        let x: Vec<f64> = ctx.get_property("DataX")?;
        let y: Vec<f64> = ctx.get_property("DataY")?;
        let mut e: Vec<f64> = ctx.get_property("DataE")?;
        let n_spec: usize = ctx.get_property("NSpec")?;
        let (shared, n_x) = x_layout(x.len(), y.len(), n_spec).map_err(FrameworkError::invalid_size)?;
        let n_y = y.len() / n_spec;
        if e.is_empty() {
            e = vec![0.0; y.len()];
        }

        let mut ws = WorkspaceFactory::instance().create(WORKSPACE_2D, n_spec, n_x, n_y)?;
        let common = Arc::new(x[..n_x].to_vec());
        for i in 0..n_spec {
            let xi = if shared {
                Arc::clone(&common)
            } else {
                Arc::new(x[i * n_x..(i + 1) * n_x].to_vec())
            };
            ws.set_histogram(
                i,
                xi,
                y[i * n_y..(i + 1) * n_y].to_vec(),
                e[i * n_y..(i + 1) * n_y].to_vec(),
            )?;
        }
        ws.set_x_unit(ctx.get_property::<String>("UnitX")?);
        let y_unit: String = ctx.get_property("YUnitLabel")?;
        if !y_unit.is_empty() {
            ws.set_y_unit(y_unit);
        }
        ws.set_title(ctx.get_property::<String>("WorkspaceTitle")?);
        ws.set_distribution(ctx.get_property("Distribution")?);
        ctx.set_property("OutputWorkspace", Workspace::from_matrix(ws))
    }
}

// ---------------------------------------------------------------------------
// CreateSampleWorkspace
// ---------------------------------------------------------------------------

const BACKGROUND: f64 = 0.3;

/// Peak centre, width and height along the time-of-flight axis.
#[derive(Debug, Clone, Copy)]
struct Peak {
    centre: f64,
    sigma: f64,
    height: f64,
}

impl Peak {
    fn at(&self, x: f64) -> f64 {
        let z = (x - self.centre) / self.sigma;
        self.height * (-0.5 * z * z).exp()
    }
}

/// Counting noise scaled to a tenth of the Poisson error of the signal.
fn with_noise(signal: f64, rng: &mut StdRng) -> f64 {
    let z: f64 = StandardNormal.sample(rng);
    (signal + 0.1 * signal.sqrt() * z).max(0.0)
}

/// Time-of-flight histograms with Gaussian peaks on a flat background, a
/// ring instrument and a proton-charge log.
#[derive(Debug, Default)]
pub struct CreateSampleWorkspace;

const FUNCTIONS: [&str; 3] = ["Flat background", "One Peak", "Multiple Peaks"];

impl Algorithm for CreateSampleWorkspace {
    fn name(&self) -> &str {
        "CreateSampleWorkspace"
    }

    fn category(&self) -> &str {
        "Utility\\Workspaces"
    }

    fn summary(&self) -> &str {
        "Creates sample workspaces for usage examples and other situations."
    }

    fn init(&mut self, props: &mut PropertyManager) -> Result<()> {
        props.declare_property(
            "Function",
            "One Peak",
            Some(Arc::new(ListValidator::new(FUNCTIONS))),
            Direction::Input,
        )?;
        let positive = Arc::new(BoundedValidator::new().lower(1.0));
        props.declare_property("NumSpectra", 10_i64, Some(positive.clone()), Direction::Input)?;
        props.declare_property("NumBins", 100_i64, Some(positive), Direction::Input)?;
        props.declare_property("XMin", 0.0, None, Direction::Input)?;
        props.declare_property(
            "BinWidth",
            200.0,
            Some(Arc::new(BoundedValidator::new().lower(0.0).exclusive())),
            Direction::Input,
        )?;
        props.declare_property("Random", false, None, Direction::Input)?;
        props.declare_property("Seed", 42_i64, None, Direction::Input)?;
        props.declare_workspace("OutputWorkspace", Direction::Output, false, None)?;
        Ok(())
    }

    fn exec(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        let function: String = ctx.get_property("Function")?;
        let n_spec: usize = ctx.get_property("NumSpectra")?;
        let n_bins: usize = ctx.get_property("NumBins")?;
        let x_min: f64 = ctx.get_property("XMin")?;
        let width: f64 = ctx.get_property("BinWidth")?;
        let random: bool = ctx.get_property("Random")?;
        let seed: i64 = ctx.get_property("Seed")?;

        let x: Arc<Vec<f64>> = Arc::new((0..=n_bins).map(|i| x_min + i as f64 * width).collect());
        let span = width * n_bins as f64;
        let peak = |fraction: f64, width: f64, height: f64| Peak {
            centre: x_min + fraction * span,
            sigma: width * span,
            height,
        };
        let peaks: Vec<Peak> = match function.as_str() {
            "Flat background" => Vec::new(),
            "Multiple Peaks" => vec![peak(0.3, 0.02, 10.0), peak(0.7, 0.035, 8.0)],
            _ => vec![peak(0.5, 0.05, 10.0)],
        };
        let centres: Vec<f64> = x.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();

        let mut ws = WorkspaceFactory::instance().create(WORKSPACE_2D, n_spec, n_bins + 1, n_bins)?;
        let mut rng = StdRng::seed_from_u64(seed as u64);
        for i in 0..n_spec {
            ctx.interruption_point()?;
            let y: Vec<f64> = centres
                .iter()
                .map(|&c| {
                    let signal = BACKGROUND + peaks.iter().map(|p| p.at(c)).sum::<f64>();
                    if random {
                        with_noise(signal, &mut rng)
                    } else {
                        signal
                    }
                })
                .collect();
            let e = y.iter().map(|v| v.sqrt()).collect();
            ws.set_histogram(i, Arc::clone(&x), y, e)?;
            ctx.progress((i + 1) as f64 / n_spec as f64, "Generating spectra");
        }

        ws.set_title("Sample workspace");
        ws.set_x_unit("TOF");
        let two_thetas: Vec<f64> = (0..n_spec).map(|i| 10.0 + 5.0 * i as f64).collect();
        ws.set_instrument(Some(Arc::new(SimpleInstrument::ring("basic_ring", 10.0, 2.0, &two_thetas))));
        ws.run_mut()
            .add_property(PROTON_CHARGE_LOG, LogValue::Number(10.0), true)?;
        ctx.set_property("OutputWorkspace", Workspace::from_matrix(ws))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::framework::Framework;
    use crate::data::workspace::MatrixHandle;
    use approx::assert_relative_eq;

    #[test]
    fn layouts() {
        assert_eq!(x_layout(3, 4, 2), Ok((true, 3)));
        assert_eq!(x_layout(6, 4, 2), Ok((false, 3)));
        assert_eq!(x_layout(4, 4, 2), Ok((false, 2)));
        assert!(x_layout(5, 4, 2).is_err());
        assert!(x_layout(3, 5, 2).is_err());
    }

    #[test]
    fn shared_x_is_shared() {
        let fw = Framework::new();
        let mut alg = fw.create_algorithm("CreateWorkspace", None).unwrap();
        alg.set_properties("DataX=0,1,2;DataY=1,2,3,4;NSpec=2;UnitX=TOF;OutputWorkspace=ws")
            .unwrap();
        assert!(alg.execute().unwrap());
        let out: MatrixHandle = alg.output_matrix("OutputWorkspace").unwrap();
        let ws = out.read();
        assert!(ws.spectra()[0].shares_x_with(&ws.spectra()[1]));
        assert_eq!(ws.read_y(1).unwrap(), &[3.0, 4.0]);
        assert_eq!(ws.read_e(1).unwrap(), &[0.0, 0.0]);
        assert_eq!(ws.x_unit(), "TOF");
    }

    #[test]
    fn bad_layout_is_a_validation_error() {
        let fw = Framework::new();
        let mut alg = fw.create_algorithm("CreateWorkspace", None).unwrap();
        alg.set_rethrows(true);
        alg.set_properties("DataX=0,1,2,3,4;DataY=1,2,3,4;NSpec=2;OutputWorkspace=ws")
            .unwrap();
        let err = alg.execute().unwrap_err();
        assert!(matches!(err, FrameworkError::InvalidProperties(ref m) if m.contains_key("DataX")));
        assert!(!fw.ads().does_exist("ws"));
    }

    #[test]
    fn sample_workspace_is_deterministic() {
        let fw = Framework::new();
        let run = |name: &str| {
            let mut alg = fw.create_algorithm("CreateSampleWorkspace", None).unwrap();
            alg.set_properties(&format!("NumSpectra=3;NumBins=20;Random=1;OutputWorkspace={name}"))
                .unwrap();
            alg.execute().unwrap();
            alg.output_matrix("OutputWorkspace").unwrap()
        };
        let a = run("a");
        let b = run("b");
        assert_eq!(a.read().read_y(2).unwrap(), b.read().read_y(2).unwrap());
        let ws = a.read();
        assert_eq!(ws.blocksize(), 20);
        assert!(ws.instrument().is_some());
        assert_relative_eq!(ws.run().proton_charge().unwrap(), 10.0);
    }

    #[test]
    fn single_peak_sits_mid_range_above_background() {
        let fw = Framework::new();
        let mut alg = fw.create_algorithm("CreateSampleWorkspace", None).unwrap();
        alg.set_properties("NumSpectra=1;NumBins=100;BinWidth=1;OutputWorkspace=peak").unwrap();
        assert!(alg.execute().unwrap());
        let ws = alg.output_matrix("OutputWorkspace").unwrap();
        let ws = ws.read();
        let y = ws.read_y(0).unwrap();
        // Centres fall at 49.5 and 50.5, half a bin either side of the peak.
        let expected = BACKGROUND + 10.0 * (-0.5_f64 * 0.1 * 0.1).exp();
        assert_relative_eq!(y[49], expected, epsilon = 1e-12);
        assert_relative_eq!(y[50], expected, epsilon = 1e-12);
        assert_relative_eq!(y[0], BACKGROUND, epsilon = 1e-6);
    }
}
