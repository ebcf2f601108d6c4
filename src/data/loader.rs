use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::factory::WORKSPACE_2D;
use super::histogram::Histogram;
use super::run::{LogValue, Run};
use super::workspace::MatrixWorkspace;
use crate::error::Result;

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a workspace from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.json` – either the document written by [`save_file`], or records
///   `[{ "x": [...], "y": [...], "e": [...], ...meta }, ...]`
/// * `.csv`  – columns `x`, `y` (and optionally `e`) containing
///   semicolon-separated floats, one spectrum per row
pub fn load_file(path: &Path) -> Result<MatrixWorkspace> {
    let ws = match extension(path).as_str() {
        "json" => load_json(path)?,
        "csv" => load_csv(path)?,
        other => return Err(anyhow::anyhow!("Unsupported file extension: .{other}").into()),
    };
    Ok(ws)
}

/// Save a workspace; same extension rules as [`load_file`].
pub fn save_file(ws: &MatrixWorkspace, path: &Path) -> Result<()> {
    match extension(path).as_str() {
        "json" => save_json(ws, path)?,
        "csv" => save_csv(ws, path)?,
        other => return Err(anyhow::anyhow!("Unsupported file extension: .{other}").into()),
    }
    Ok(())
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// JSON document
// ---------------------------------------------------------------------------

/// On-disk form of a workspace.
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkspaceDocument {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub distribution: bool,
    #[serde(default)]
    pub x_unit: String,
    #[serde(default)]
    pub y_unit: String,
    #[serde(default)]
    pub logs: Run,
    pub spectra: Vec<SpectrumRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SpectrumRecord {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    #[serde(default)]
    pub e: Vec<f64>,
}

impl WorkspaceDocument {
    pub fn from_workspace(ws: &MatrixWorkspace) -> Self {
        WorkspaceDocument {
            title: ws.title().to_string(),
            distribution: ws.is_distribution(),
            x_unit: ws.x_unit().to_string(),
            y_unit: ws.y_unit().to_string(),
            logs: ws.run().clone(),
            spectra: ws
                .spectra()
                .iter()
                .map(|h| SpectrumRecord {
                    x: h.read_x().to_vec(),
                    y: h.read_y().to_vec(),
                    e: h.read_e().to_vec(),
                })
                .collect(),
        }
    }

    pub fn into_workspace(self) -> anyhow::Result<MatrixWorkspace> {
        let spectra = self
            .spectra
            .into_iter()
            .enumerate()
            .map(|(i, rec)| build_histogram(rec.x, rec.y, rec.e).with_context(|| format!("spectrum {i}")))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let mut ws = MatrixWorkspace::from_histograms(WORKSPACE_2D, share_common_x(spectra)?)?;
        ws.set_title(self.title);
        ws.set_distribution(self.distribution);
        ws.set_x_unit(self.x_unit);
        if !self.y_unit.is_empty() {
            ws.set_y_unit(self.y_unit);
        }
        *ws.run_mut() = self.logs;
        Ok(ws)
    }
}

/// Missing errors default to zero.
fn build_histogram(x: Vec<f64>, y: Vec<f64>, e: Vec<f64>) -> anyhow::Result<Histogram> {
    let e = if e.is_empty() { vec![0.0; y.len()] } else { e };
    Ok(Histogram::from_parts(x, y, e)?)
}

/// Let spectra with identical X values share one array.
fn share_common_x(mut spectra: Vec<Histogram>) -> anyhow::Result<Vec<Histogram>> {
    let Some(first) = spectra.first().map(Histogram::shared_x) else {
        return Ok(spectra);
    };
    for h in spectra.iter_mut().skip(1) {
        if h.read_x() == first.as_slice() {
            h.set_shared_x(Arc::clone(&first))?;
        }
    }
    Ok(spectra)
}

fn load_json(path: &Path) -> anyhow::Result<MatrixWorkspace> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    if root.is_object() {
        let doc: WorkspaceDocument =
            serde_json::from_value(root).context("parsing workspace document")?;
        return doc.into_workspace();
    }
    load_json_records(&root)
}

/// Records-oriented layout, one object per spectrum:
///
/// ```json
/// [
///   { "x": [0.0, 1.0, 2.0], "y": [5.0, 7.0], "e": [2.2, 2.6], "run_number": 1234 },
///   ...
/// ]
/// ```
///
/// Metadata keys whose value is identical in every record become run logs.
fn load_json_records(root: &JsonValue) -> anyhow::Result<MatrixWorkspace> {
    let records = root.as_array().context("Expected top-level JSON array")?;

    let mut spectra = Vec::with_capacity(records.len());
    let mut common: Option<BTreeMap<String, JsonValue>> = None;

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let x = json_array_to_f64(obj.get("x"), i, "x")?;
        let y = json_array_to_f64(obj.get("y"), i, "y")?;
        let e = match obj.get("e") {
            Some(_) => json_array_to_f64(obj.get("e"), i, "e")?,
            None => Vec::new(),
        };
        spectra.push(build_histogram(x, y, e).with_context(|| format!("Row {i}"))?);

        let meta: BTreeMap<String, JsonValue> = obj
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "x" | "y" | "e"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        common = Some(match common {
            None => meta,
            Some(prev) => prev
                .into_iter()
                .filter(|(k, v)| meta.get(k) == Some(v))
                .collect(),
        });
    }

    let mut ws = MatrixWorkspace::from_histograms(WORKSPACE_2D, share_common_x(spectra)?)?;
    for (key, val) in common.unwrap_or_default() {
        if let Some(log) = json_to_log(&val) {
            ws.run_mut().add_property(&key, log, true)?;
        }
    }
    Ok(ws)
}

fn json_array_to_f64(val: Option<&JsonValue>, row: usize, col: &str) -> anyhow::Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Row {row}: missing or invalid '{col}' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| {
            v.as_f64()
                .with_context(|| format!("Row {row}, {col}[{j}]: not a number"))
        })
        .collect()
}

fn json_to_log(val: &JsonValue) -> Option<LogValue> {
    match val {
        JsonValue::String(s) => Some(LogValue::Text(s.clone())),
        JsonValue::Number(n) => n
            .as_i64()
            .map(LogValue::Integer)
            .or_else(|| n.as_f64().map(LogValue::Number)),
        JsonValue::Bool(b) => Some(LogValue::Integer(*b as i64)),
        _ => None,
    }
}

fn save_json(ws: &MatrixWorkspace, path: &Path) -> anyhow::Result<()> {
    let doc = WorkspaceDocument::from_workspace(ws);
    let text = serde_json::to_string_pretty(&doc).context("serialising workspace")?;
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// CSV layout:  header row with column names.
/// `x`, `y` and the optional `e` column contain semicolon-separated floats:
///   `"0.0;1.0;2.0"`, `"5.0;7.0"`
/// Other columns are ignored.
fn load_csv(path: &Path) -> anyhow::Result<MatrixWorkspace> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let column = |name: &str| headers.iter().position(|h| h == name);
    let x_idx = column("x").context("CSV missing 'x' column")?;
    let y_idx = column("y").context("CSV missing 'y' column")?;
    let e_idx = column("e");

    let mut spectra = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;

        let x = parse_semicolon_floats(record.get(x_idx).unwrap_or(""), row_no, "x")?;
        let y = parse_semicolon_floats(record.get(y_idx).unwrap_or(""), row_no, "y")?;
        let e = match e_idx.and_then(|i| record.get(i)) {
            Some(text) if !text.trim().is_empty() => parse_semicolon_floats(text, row_no, "e")?,
            _ => Vec::new(),
        };

        if x.len() != y.len() && x.len() != y.len() + 1 {
            bail!(
                "CSV row {row_no}: x has {} values but y has {}",
                x.len(),
                y.len()
            );
        }
        spectra.push(build_histogram(x, y, e).with_context(|| format!("CSV row {row_no}"))?);
    }

    Ok(MatrixWorkspace::from_histograms(WORKSPACE_2D, share_common_x(spectra)?)?)
}

fn parse_semicolon_floats(s: &str, row: usize, col: &str) -> anyhow::Result<Vec<f64>> {
    s.split(';')
        .filter(|tok| !tok.trim().is_empty())
        .enumerate()
        .map(|(j, tok)| {
            tok.trim()
                .parse::<f64>()
                .with_context(|| format!("Row {row}, {col}[{j}]: '{tok}' is not a number"))
        })
        .collect()
}

fn save_csv(ws: &MatrixWorkspace, path: &Path) -> anyhow::Result<()> {
    let join = |values: &[f64]| {
        values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(";")
    };
    let mut writer = csv::Writer::from_path(path).context("creating CSV")?;
    writer.write_record(["spectrum", "x", "y", "e"])?;
    for (i, h) in ws.spectra().iter().enumerate() {
        writer.write_record([
            i.to_string(),
            join(h.read_x()),
            join(h.read_y()),
            join(h.read_e()),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn records_json_with_common_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"[{{"x":[0,1,2],"y":[5,7],"run_number":42,"sample":"V"}},
                {{"x":[0,1,2],"y":[1,2],"e":[1,1],"run_number":42,"sample":"Nb"}}]"#
        )
        .unwrap();

        let ws = load_file(&path).unwrap();
        assert_eq!(ws.number_histograms(), 2);
        assert!(ws.is_histogram_data());
        assert_eq!(ws.read_e(0).unwrap(), &[0.0, 0.0]);
        assert!(ws.spectra()[0].shares_x_with(&ws.spectra()[1]));
        assert_eq!(ws.run().get_property("run_number").unwrap(), &LogValue::Integer(42));
        assert!(!ws.run().has_property("sample"));
    }

    #[test]
    fn only_matching_x_arrays_are_shared() {
        let h = |x: &[f64]| Histogram::from_parts(x.to_vec(), vec![1.0; 2], vec![1.0; 2]).unwrap();
        let spectra = share_common_x(vec![h(&[0.0, 1.0, 2.0]), h(&[0.0, 2.0, 4.0]), h(&[0.0, 1.0, 2.0])])
            .unwrap();
        assert!(spectra[0].shares_x_with(&spectra[2]));
        assert!(!spectra[0].shares_x_with(&spectra[1]));
        assert!(share_common_x(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn csv_rejects_bad_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "x,y\n\"0;1;2;3\",\"1\"\n").unwrap();
        let err = load_file(&path).unwrap_err();
        assert!(err.to_string().contains("x has 4 values but y has 1"), "{err}");
    }

    #[test]
    fn unsupported_extension() {
        let err = load_file(Path::new("data.nxs")).unwrap_err();
        assert!(err.to_string().contains("Unsupported file extension: .nxs"));
    }
}
