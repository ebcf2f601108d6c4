use anyhow::{Context, Result};

use rusty_reduce::Framework;

/// Writes a sample workspace (several Gaussian peaks on a flat background,
/// with noise) to the path given as the first argument, `sample_data.json`
/// by default. A `.csv` path writes the CSV form instead.
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let output_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "sample_data.json".to_string());

    let framework = Framework::new();
    let mut create = framework.create_algorithm("CreateSampleWorkspace", None)?;
    create.set_rethrows(true);
    create.set_properties(
        "OutputWorkspace=sample;Function=Multiple Peaks;NumSpectra=12;NumBins=500;BinWidth=40;Random=1;Seed=42",
    )?;
    create.execute().context("creating the sample workspace")?;

    let mut save = framework.create_algorithm("SaveSpectra", None)?;
    save.set_rethrows(true);
    save.set_property_value("InputWorkspace", "sample")?;
    save.set_property_value("Filename", &output_path)?;
    save.execute()
        .with_context(|| format!("writing {output_path}"))?;

    let ws = framework.ads().retrieve_matrix("sample")?;
    let ws = ws.read();
    println!(
        "Wrote {} spectra ({} bins each) to {output_path}",
        ws.number_histograms(),
        ws.blocksize()
    );
    Ok(())
}
