/// Data layer: spectra, workspaces, metadata, provenance and file interchange.
///
/// Architecture:
/// ```text
///   .json / .csv
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → MatrixWorkspace
///   └──────────┘
///        │
///        ▼
///   ┌─────────────────┐      ┌───────────┐
///   │ MatrixWorkspace  │─────▶│ Histogram │  x (shared, copy-on-write), y, e
///   └─────────────────┘      └───────────┘
///     │  run · instrument · masks · history
///     ▼
///   ┌──────────┐
///   │ selection │  index ranges, spectra lists, bins in an X window
///   └──────────┘
/// ```
///
/// New workspaces are allocated through [`factory::WorkspaceFactory`], which
/// can copy a parent's metadata onto a freshly sized workspace.

pub mod factory;
pub mod histogram;
pub mod history;
pub mod instrument;
pub mod loader;
pub mod run;
pub mod selection;
pub mod workspace;
