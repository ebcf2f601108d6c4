use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::api::algorithm::{Algorithm, ExecutionContext};
use crate::data::loader;
use crate::data::run::LogValue;
use crate::data::workspace::Workspace;
use crate::error::Result;
use crate::kernel::property::Direction;
use crate::kernel::property_manager::PropertyManager;
use crate::kernel::validators::MandatoryValidator;

const EXTENSIONS: [&str; 2] = ["json", "csv"];

fn declare_filename(props: &mut PropertyManager) -> Result<()> {
    props.declare_property("Filename", "", Some(Arc::new(MandatoryValidator)), Direction::Input)
}

fn check_extension(props: &PropertyManager) -> BTreeMap<String, String> {
    let mut violations = BTreeMap::new();
    if let Ok(filename) = props.get_property::<String>("Filename") {
        let ext = Path::new(&filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !EXTENSIONS.contains(&ext.as_str()) {
            violations.insert(
                "Filename".to_string(),
                "File extension must be one of: .json, .csv".to_string(),
            );
        }
    }
    violations
}

/// Read spectra from a `.json` or `.csv` file.
#[derive(Debug, Default)]
pub struct LoadSpectra;

impl Algorithm for LoadSpectra {
    fn name(&self) -> &str {
        "LoadSpectra"
    }

    fn category(&self) -> &str {
        "DataHandling"
    }

    fn summary(&self) -> &str {
        "Loads spectra from a JSON or CSV file into a workspace."
    }

    fn init(&mut self, props: &mut PropertyManager) -> Result<()> {
        declare_filename(props)?;
        props.declare_workspace("OutputWorkspace", Direction::Output, false, None)
    }

    fn validate_inputs(&self, props: &PropertyManager) -> BTreeMap<String, String> {
        check_extension(props)
    }

    fn exec(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        let filename: String = ctx.get_property("Filename")?;
        ctx.progress(0.1, "Reading");
        let mut ws = loader::load_file(Path::new(&filename))?;
        ws.run_mut()
            .add_property("Filename", LogValue::Text(filename.clone()), true)?;
        log::info!(
            "{}: read {} spectra from {filename}",
            ctx.label(),
            ws.number_histograms()
        );
        ctx.set_property("OutputWorkspace", Workspace::from_matrix(ws))
    }
}

/// Write a matrix workspace to a `.json` or `.csv` file.
#[derive(Debug, Default)]
pub struct SaveSpectra;

impl Algorithm for SaveSpectra {
    fn name(&self) -> &str {
        "SaveSpectra"
    }

    fn category(&self) -> &str {
        "DataHandling"
    }

    fn summary(&self) -> &str {
        "Saves the spectra of a workspace to a JSON or CSV file."
    }

    fn init(&mut self, props: &mut PropertyManager) -> Result<()> {
        props.declare_workspace("InputWorkspace", Direction::Input, false, None)?;
        declare_filename(props)
    }

    fn validate_inputs(&self, props: &PropertyManager) -> BTreeMap<String, String> {
        check_extension(props)
    }

    fn exec(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        let input = ctx.input_matrix("InputWorkspace")?;
        let filename: String = ctx.get_property("Filename")?;
        loader::save_file(&input.read(), Path::new(&filename))?;
        log::info!("{}: wrote {filename}", ctx.label());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::framework::Framework;
    use crate::error::FrameworkError;

    #[test]
    fn save_then_load_keeps_data_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");
        let path = path.to_str().unwrap();

        let fw = Framework::new();
        let mut create = fw.create_algorithm("CreateSampleWorkspace", None).unwrap();
        create.set_properties("OutputWorkspace=sample;NumSpectra=3;NumBins=20").unwrap();
        assert!(create.execute().unwrap());

        let mut save = fw.create_algorithm("SaveSpectra", None).unwrap();
        save.set_property_value("InputWorkspace", "sample").unwrap();
        save.set_property_value("Filename", path).unwrap();
        assert!(save.execute().unwrap());

        let mut load = fw.create_algorithm("LoadSpectra", None).unwrap();
        load.set_property_value("Filename", path).unwrap();
        load.set_property_value("OutputWorkspace", "reloaded").unwrap();
        assert!(load.execute().unwrap());

        let original = fw.ads().retrieve_matrix("sample").unwrap();
        let reloaded = fw.ads().retrieve_matrix("reloaded").unwrap();
        let (a, b) = (original.read(), reloaded.read());
        assert_eq!(b.number_histograms(), 3);
        assert_eq!(a.read_y(2).unwrap(), b.read_y(2).unwrap());
        assert_eq!(b.x_unit(), "TOF");
        assert_eq!(b.run().proton_charge().unwrap(), 10.0);
        assert_eq!(
            b.run().get_property("Filename").unwrap(),
            &LogValue::Text(path.to_string())
        );
        assert!(b.has_common_bins());
    }

    #[test]
    fn unknown_extension_is_rejected_before_running() {
        let fw = Framework::new();
        let mut load = fw.create_algorithm("LoadSpectra", None).unwrap();
        load.set_rethrows(true);
        load.set_properties("Filename=data.nxs;OutputWorkspace=x").unwrap();
        match load.execute().unwrap_err() {
            FrameworkError::InvalidProperties(v) => assert!(v["Filename"].contains(".json")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let fw = Framework::new();
        let mut load = fw.create_algorithm("LoadSpectra", None).unwrap();
        load.set_property_value("Filename", dir.path().join("absent.csv").to_str().unwrap())
            .unwrap();
        load.set_property_value("OutputWorkspace", "x").unwrap();
        assert!(!load.execute().unwrap());
        assert!(!fw.ads().does_exist("x"));
    }
}
