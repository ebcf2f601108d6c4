//! The algorithm contract and the engine that runs it.
//!
//! ```text
//!   Uninitialized ──initialize()──▶ Initialized ──execute()──▶ Executing
//!                                     ▲   │                      │   │
//!                      set_property() │   │ validation fails     │   │ exec() ok
//!                                     │   ▼                      │   ▼
//!                                    Failed ◀──── exec() err ────┘  Executed
//! ```
//!
//! A concrete [`Algorithm`] only declares properties and computes. The
//! [`AlgorithmRunner`] owns everything around that: workspace resolution,
//! validation, in-place claims, timing, history, publication to the data
//! service and the rethrow policy.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;

use crate::ads::AnalysisDataService;
use crate::api::async_exec::AsyncExecution;
use crate::api::framework::Framework;
use crate::api::parallel;
use crate::config::FrameworkConfig;
use crate::data::histogram::Histogram;
use crate::data::history::AlgorithmHistory;
use crate::data::workspace::{MatrixHandle, Workspace, WorkspaceClaim};
use crate::error::{FrameworkError, Result};
use crate::kernel::progress::{CancellationToken, ProgressCallback, ProgressReporter};
use crate::kernel::property::{Direction, FromPropertyValue, PropertyValue};
use crate::kernel::property_manager::PropertyManager;

// ---------------------------------------------------------------------------
// Algorithm – what concrete algorithms implement
// ---------------------------------------------------------------------------

/// A named, versioned, property-driven unit of computation.
pub trait Algorithm: Send {
    fn name(&self) -> &str;

    fn version(&self) -> u32 {
        1
    }

    fn category(&self) -> &str {
        "General"
    }

    fn summary(&self) -> &str {
        ""
    }

    /// Declare every property. Called exactly once.
    fn init(&mut self, props: &mut PropertyManager) -> Result<()>;

    /// Checks that need resolved input workspaces. Always run and merged
    /// with `validate_all`; an input that failed to resolve reads as unset.
    fn validate_inputs(&self, _props: &PropertyManager) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn exec(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Uninitialized,
    Initialized,
    Executing,
    Executed,
    Failed,
}

// ---------------------------------------------------------------------------
// AlgorithmRunner – lifecycle, history and publication
// ---------------------------------------------------------------------------

type HistorySink = Arc<Mutex<Vec<AlgorithmHistory>>>;

pub struct AlgorithmRunner {
    algorithm: Box<dyn Algorithm>,
    properties: PropertyManager,
    state: ExecutionState,
    framework: Framework,
    rethrow: bool,
    child: bool,
    store_in_ads: bool,
    record_child_history: bool,
    cancel: CancellationToken,
    progress: ProgressReporter,
    /// Parent's collector for child history entries.
    parent_sink: Option<HistorySink>,
    last_history: Option<AlgorithmHistory>,
}

impl fmt::Debug for AlgorithmRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlgorithmRunner")
            .field("algorithm", &self.label())
            .field("state", &self.state)
            .field("child", &self.child)
            .field("properties", &self.properties.as_string())
            .finish()
    }
}

impl AlgorithmRunner {
    /// Wrap an uninitialised algorithm; the framework supplies the data
    /// service, the algorithm registry for children and the configuration.
    pub fn new(algorithm: Box<dyn Algorithm>, framework: Framework) -> Self {
        let rethrow = framework.config().rethrow_errors;
        let record_child_history = framework.config().record_child_history_in_workspace;
        AlgorithmRunner {
            algorithm,
            properties: PropertyManager::new(),
            state: ExecutionState::Uninitialized,
            rethrow,
            record_child_history,
            framework,
            child: false,
            store_in_ads: true,
            cancel: CancellationToken::new(),
            progress: ProgressReporter::new(),
            parent_sink: None,
            last_history: None,
        }
    }

    pub fn name(&self) -> &str {
        self.algorithm.name()
    }

    pub fn version(&self) -> u32 {
        self.algorithm.version()
    }

    pub fn category(&self) -> &str {
        self.algorithm.category()
    }

    pub fn summary(&self) -> &str {
        self.algorithm.summary()
    }

    fn label(&self) -> String {
        format!("{}-v{}", self.algorithm.name(), self.algorithm.version())
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state != ExecutionState::Uninitialized
    }

    pub fn is_executed(&self) -> bool {
        self.state == ExecutionState::Executed
    }

    pub fn is_child(&self) -> bool {
        self.child
    }

    /// Whether a failed `execute()` returns `Err` instead of `Ok(false)`.
    /// Child algorithms always rethrow.
    pub fn set_rethrows(&mut self, rethrow: bool) {
        self.rethrow = rethrow;
    }

    pub fn set_child(&mut self, child: bool) {
        self.child = child;
    }

    pub fn set_always_store_in_ads(&mut self, store: bool) {
        self.store_in_ads = store;
    }

    pub fn set_record_child_history(&mut self, record: bool) {
        self.record_child_history = record;
    }

    pub fn ads(&self) -> &Arc<AnalysisDataService> {
        self.framework.ads()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cooperative cancellation; honoured at the next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn progress_reporter(&self) -> &ProgressReporter {
        &self.progress
    }

    pub fn add_progress_observer(&self, callback: ProgressCallback) {
        self.progress.add_observer(callback);
    }

    /// History entry of the last successful execution.
    pub fn history(&self) -> Option<&AlgorithmHistory> {
        self.last_history.as_ref()
    }

    // -- lifecycle --

    pub fn initialize(&mut self) -> Result<()> {
        if self.state != ExecutionState::Uninitialized {
            return Err(FrameworkError::AlreadyInitialized(self.label()));
        }
        self.algorithm.init(&mut self.properties)?;
        self.state = ExecutionState::Initialized;
        Ok(())
    }

    // -- properties --

    pub fn properties(&self) -> &PropertyManager {
        &self.properties
    }

    fn properties_for_update(&mut self) -> Result<&mut PropertyManager> {
        match self.state {
            ExecutionState::Uninitialized => Err(FrameworkError::NotInitialized(self.label())),
            ExecutionState::Executing => Err(FrameworkError::computation(format!(
                "{} is executing; its properties are frozen",
                self.label()
            ))),
            ExecutionState::Failed => {
                // Correcting an input makes a failed algorithm runnable again.
                self.state = ExecutionState::Initialized;
                Ok(&mut self.properties)
            }
            _ => Ok(&mut self.properties),
        }
    }

    pub fn set_property(&mut self, name: &str, value: impl Into<PropertyValue>) -> Result<()> {
        self.properties_for_update()?.set_property(name, value)
    }

    pub fn set_property_value(&mut self, name: &str, text: &str) -> Result<()> {
        self.properties_for_update()?.set_property_value(name, text)
    }

    pub fn set_properties(&mut self, assignments: &str) -> Result<()> {
        self.properties_for_update()?.set_properties(assignments)
    }

    /// Typed read. Output properties are only readable after execution.
    pub fn get_property<T: FromPropertyValue>(&self, name: &str) -> Result<T> {
        self.check_readable(name)?;
        self.properties.get_property(name)
    }

    pub fn get_property_value(&self, name: &str) -> Result<String> {
        self.check_readable(name)?;
        self.properties.get_property_value(name)
    }

    fn check_readable(&self, name: &str) -> Result<()> {
        let property = self.properties.property(name)?;
        if property.direction() == Direction::Output && self.state != ExecutionState::Executed {
            return Err(FrameworkError::OutputNotReady(property.name().to_string()));
        }
        Ok(())
    }

    /// Convenience for an output matrix workspace.
    pub fn output_matrix(&self, name: &str) -> Result<MatrixHandle> {
        self.get_property::<MatrixHandle>(name)
    }

    // -- execution --

    /// Run the algorithm.
    ///
    /// `Ok(true)` on success. On failure the runner is left `Failed` and the
    /// error is returned when rethrowing (always for children), otherwise
    /// `Ok(false)`.
    pub fn execute(&mut self) -> Result<bool> {
        self.reset_run_signals();
        self.execute_prepared()
    }

    /// Clear the cancel flag and progress of a top-level runner before a run.
    /// Called on the caller's thread so a cancel issued after this point holds.
    pub(crate) fn reset_run_signals(&self) {
        if !self.child {
            self.cancel.reset();
            self.progress.reset();
        }
    }

    pub(crate) fn execute_prepared(&mut self) -> Result<bool> {
        match self.state {
            ExecutionState::Uninitialized => return Err(FrameworkError::NotInitialized(self.label())),
            ExecutionState::Executing => {
                return Err(FrameworkError::computation(format!("{} is already executing", self.label())))
            }
            ExecutionState::Failed => {
                return Err(FrameworkError::computation(format!(
                    "{} failed; set a property before executing again",
                    self.label()
                )))
            }
            ExecutionState::Initialized | ExecutionState::Executed => {}
        }

        match self.run() {
            Ok(()) => Ok(true),
            Err(e) => {
                self.state = ExecutionState::Failed;
                if e.is_cancelled() {
                    log::warn!("{} cancelled", self.label());
                } else {
                    log::error!("Error in execution of algorithm {}: {e}", self.label());
                }
                if self.rethrow || self.child {
                    Err(e)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Move the runner to a worker thread and run it there.
    pub fn execute_async(self) -> AsyncExecution {
        AsyncExecution::spawn(self)
    }

    fn run(&mut self) -> Result<()> {
        let label = self.label();
        if self.cancel.is_cancelled() {
            return Err(FrameworkError::Cancelled(label));
        }

        // (1) resolve input workspaces, then validate everything.
        let mut violations = self.resolve_input_workspaces();
        for (name, msg) in self
            .properties
            .validate_all()
            .into_iter()
            .chain(self.algorithm.validate_inputs(&self.properties))
        {
            violations.entry(name).or_insert(msg);
        }
        if !violations.is_empty() {
            for (name, msg) in &violations {
                log::error!("{label}: invalid value for {name}: {msg}");
            }
            return Err(FrameworkError::InvalidProperties(violations));
        }

        // Exclusive claims on in/out workspaces, released when this frame ends.
        let _claims = self.claim_inout_workspaces(&label)?;
        self.clear_stale_outputs();

        // (2) timestamps and (3) the body.
        self.state = ExecutionState::Executing;
        let start = Utc::now();
        let timer = Instant::now();
        let child_histories: HistorySink = Arc::default();
        {
            let mut ctx = ExecutionContext {
                properties: &mut self.properties,
                framework: &self.framework,
                label: &label,
                cancel: &self.cancel,
                progress: &self.progress,
                child_histories: &child_histories,
                record_child_history: self.record_child_history,
            };
            self.algorithm.exec(&mut ctx)?;
        }
        self.check_outputs_set()?;
        let end = Utc::now();

        // (4)/(5) history.
        let mut entry = AlgorithmHistory::new(
            self.algorithm.name(),
            self.algorithm.version(),
            start,
            end,
            self.properties.to_history(),
        );
        for child in child_histories.lock().drain(..) {
            entry.add_child(child);
        }
        match (&self.parent_sink, self.child) {
            (Some(sink), true) => {
                sink.lock().push(entry.clone());
                if self.record_child_history {
                    self.record_history(&entry);
                }
            }
            _ => self.record_history(&entry),
        }

        // (6) publish.
        if !self.child || self.store_in_ads {
            self.publish_outputs()?;
        }
        self.progress.report(1.0, "");
        self.state = ExecutionState::Executed;
        self.last_history = Some(entry);
        log::info!(
            "{label} successful, Duration {:.2} seconds",
            timer.elapsed().as_secs_f64()
        );
        Ok(())
    }

    /// Look up every named Input/InOut workspace in the data service.
    fn resolve_input_workspaces(&mut self) -> BTreeMap<String, String> {
        let ads = Arc::clone(self.framework.ads());
        let mut violations = BTreeMap::new();
        for property in self.properties.properties_mut() {
            if !property.is_workspace() || !property.direction().is_input() {
                continue;
            }
            let Some(value) = property.workspace_value() else {
                continue;
            };
            if value.name.is_empty() {
                continue;
            }
            match ads.retrieve(&value.name) {
                Ok(ws) => property.resolve_workspace(ws),
                Err(_) if value.handle.is_some() => {}
                Err(_) => {
                    violations.insert(
                        property.name().to_string(),
                        format!("Workspace \"{}\" was not found in the Analysis Data Service", value.name),
                    );
                }
            }
        }
        violations
    }

    fn claim_inout_workspaces(&self, label: &str) -> Result<Vec<WorkspaceClaim>> {
        self.properties
            .properties()
            .iter()
            .filter(|p| p.direction() == Direction::InOut)
            .filter_map(|p| p.workspace_value().and_then(|w| w.handle.as_ref()))
            .map(|ws| ws.claim(label))
            .collect()
    }

    fn clear_stale_outputs(&mut self) {
        for property in self.properties.properties_mut() {
            if property.direction() == Direction::Output {
                property.clear_workspace_handle();
            }
        }
    }

    fn check_outputs_set(&self) -> Result<()> {
        for property in self.properties.properties() {
            if !property.direction().is_output() || property.is_optional() {
                continue;
            }
            if let Some(w) = property.workspace_value() {
                if w.handle.is_none() {
                    return Err(FrameworkError::computation(format!(
                        "{} did not set output workspace property {}",
                        self.label(),
                        property.name()
                    )));
                }
            }
        }
        Ok(())
    }

    fn workspaces_in(&self, pred: impl Fn(Direction) -> bool) -> Vec<Workspace> {
        self.properties
            .properties()
            .iter()
            .filter(|p| pred(p.direction()))
            .filter_map(|p| p.workspace_value().and_then(|w| w.handle.clone()))
            .collect()
    }

    /// Append `entry` to every output workspace after merging the histories
    /// of the inputs it was derived from.
    fn record_history(&self, entry: &AlgorithmHistory) {
        let inputs = self.workspaces_in(Direction::is_input);
        let mut outputs: Vec<Workspace> = Vec::new();
        for ws in self.workspaces_in(Direction::is_output) {
            if !outputs.iter().any(|o| o.ptr_eq(&ws)) {
                outputs.push(ws);
            }
        }
        for output in &outputs {
            let inherited: Vec<_> = inputs
                .iter()
                .filter(|input| !input.ptr_eq(output))
                .map(Workspace::history)
                .collect();
            output.with_history_mut(|history| {
                for h in &inherited {
                    history.add_histories(h);
                }
                history.add_history(entry.clone());
            });
        }
    }

    fn publish_outputs(&self) -> Result<()> {
        let ads = self.framework.ads();
        for property in self.properties.properties() {
            if !property.direction().is_output() {
                continue;
            }
            if let Some(w) = property.workspace_value() {
                if let (false, Some(handle)) = (w.name.is_empty(), &w.handle) {
                    ads.add_or_replace(&w.name, handle.clone())?;
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ExecutionContext – what `exec()` sees
// ---------------------------------------------------------------------------

/// Property access, progress, cancellation and child creation for a running
/// algorithm body.
pub struct ExecutionContext<'a> {
    properties: &'a mut PropertyManager,
    framework: &'a Framework,
    label: &'a str,
    cancel: &'a CancellationToken,
    progress: &'a ProgressReporter,
    child_histories: &'a HistorySink,
    record_child_history: bool,
}

impl<'a> ExecutionContext<'a> {
    /// `name-vversion` of the running algorithm.
    pub fn label(&self) -> &str {
        self.label
    }

    pub fn get_property<T: FromPropertyValue>(&self, name: &str) -> Result<T> {
        self.properties.get_property(name)
    }

    pub fn set_property(&mut self, name: &str, value: impl Into<PropertyValue>) -> Result<()> {
        self.properties.set_property(name, value)
    }

    pub fn properties(&self) -> &PropertyManager {
        self.properties
    }

    /// The resolved matrix workspace behind a workspace property.
    pub fn input_matrix(&self, name: &str) -> Result<MatrixHandle> {
        let property = self.properties.property(name)?;
        match property.workspace_value().and_then(|w| w.handle.as_ref()) {
            Some(Workspace::Matrix(m)) => Ok(Arc::clone(m)),
            Some(Workspace::Group(_)) => Err(FrameworkError::UnsupportedType(format!(
                "{name} holds a WorkspaceGroup, a matrix workspace is required"
            ))),
            None => Err(FrameworkError::computation(format!("{name} has no workspace"))),
        }
    }

    /// Data-service name given to a workspace property.
    pub fn workspace_name(&self, name: &str) -> Result<String> {
        Ok(self
            .properties
            .property(name)?
            .workspace_value()
            .map(|w| w.name.clone())
            .unwrap_or_default())
    }

    pub fn ads(&self) -> &Arc<AnalysisDataService> {
        self.framework.ads()
    }

    pub fn config(&self) -> &FrameworkConfig {
        self.framework.config()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        self.cancel
    }

    /// Report progress in `[0, 1]`; values never go backwards.
    pub fn progress(&self, fraction: f64, message: &str) {
        let value = self.progress.report(fraction, message);
        log::debug!("{}: {:.0}% {message}", self.label, value * 100.0);
    }

    /// Cancellation checkpoint.
    pub fn interruption_point(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(FrameworkError::Cancelled(self.label.to_string()));
        }
        Ok(())
    }

    /// Run `f` over the spectra of `ws` in parallel, with cancellation checks.
    pub fn for_each_spectrum<F>(&self, spectra: &mut [Histogram], f: F) -> Result<()>
    where
        F: Fn(usize, &mut Histogram) -> Result<()> + Send + Sync,
    {
        parallel::for_each_spectrum(spectra, self.cancel, self.label, f)
    }

    pub fn map_spectra<T, F>(&self, n_spectra: usize, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Send + Sync,
    {
        parallel::map_spectra(n_spectra, self.cancel, self.label, f)
    }

    /// An initialised child algorithm.
    ///
    /// The child shares this algorithm's cancellation flag, reports progress
    /// into `[start_progress, end_progress]` of this one and always rethrows.
    /// Its outputs stay out of the data service unless `store_in_ads`.
    pub fn create_child_algorithm(
        &self,
        name: &str,
        version: Option<u32>,
        start_progress: f64,
        end_progress: f64,
        store_in_ads: bool,
    ) -> Result<AlgorithmRunner> {
        let algorithm = self.framework.algorithms().create(name, version)?;
        let mut child = AlgorithmRunner::new(algorithm, self.framework.clone());
        child.initialize()?;
        child.child = true;
        child.rethrow = true;
        child.store_in_ads = store_in_ads;
        child.record_child_history = self.record_child_history;
        child.cancel = self.cancel.clone();
        child.progress = self.progress.sub_range(start_progress, end_progress);
        child.parent_sink = Some(Arc::clone(self.child_histories));
        if !store_in_ads {
            for property in child.properties.properties_mut() {
                if property.is_workspace() && property.direction() == Direction::Output {
                    property.set_optional(true);
                }
            }
        }
        log::debug!("{} created child {}", self.label, child.label());
        Ok(child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::workspace::MatrixWorkspace;
    use crate::kernel::validators::BoundedValidator;

    /// Writes `Value` into every Y of a new workspace.
    #[derive(Default)]
    struct Fill;

    impl Algorithm for Fill {
        fn name(&self) -> &str {
            "Fill"
        }
        fn init(&mut self, props: &mut PropertyManager) -> Result<()> {
            props.declare_property(
                "Value",
                1.0,
                Some(Arc::new(BoundedValidator::new().lower(0.0))),
                Direction::Input,
            )?;
            props.declare_workspace("OutputWorkspace", Direction::Output, false, None)?;
            Ok(())
        }
        fn exec(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
            let value: f64 = ctx.get_property("Value")?;
            let mut ws = MatrixWorkspace::new("Workspace2D", 2, 3, 2)?;
            for i in 0..2 {
                ws.data_y(i)?.fill(value);
            }
            ctx.set_property("OutputWorkspace", Workspace::from_matrix(ws))
        }
    }

    fn runner() -> AlgorithmRunner {
        let framework = Framework::new();
        let mut r = AlgorithmRunner::new(Box::new(Fill), framework);
        r.initialize().unwrap();
        r
    }

    #[test]
    fn initialize_twice_fails() {
        let mut r = runner();
        assert!(matches!(r.initialize(), Err(FrameworkError::AlreadyInitialized(_))));
    }

    #[test]
    fn execute_before_initialize_fails() {
        let mut r = AlgorithmRunner::new(Box::new(Fill), Framework::new());
        assert!(matches!(r.execute(), Err(FrameworkError::NotInitialized(_))));
    }

    #[test]
    fn missing_output_name_fails_validation_without_rethrow() {
        let mut r = runner();
        assert!(!r.execute().unwrap());
        assert_eq!(r.state(), ExecutionState::Failed);
        r.set_property_value("OutputWorkspace", "out").unwrap();
        assert_eq!(r.state(), ExecutionState::Initialized);
        assert!(r.execute().unwrap());
    }

    #[test]
    fn output_not_readable_before_execution() {
        let mut r = runner();
        r.set_property_value("OutputWorkspace", "out").unwrap();
        assert!(matches!(
            r.get_property::<MatrixHandle>("OutputWorkspace"),
            Err(FrameworkError::OutputNotReady(_))
        ));
        r.execute().unwrap();
        let out = r.output_matrix("OutputWorkspace").unwrap();
        assert_eq!(out.read().read_y(1).unwrap(), &[1.0, 1.0]);
        assert!(r.ads().does_exist("out"));
    }

    #[test]
    fn history_records_parameters() {
        let mut r = runner();
        r.set_properties("Value=2.5;OutputWorkspace=out").unwrap();
        r.execute().unwrap();
        let out = r.output_matrix("OutputWorkspace").unwrap();
        let ws = out.read();
        let entry = ws.history().last_algorithm().unwrap();
        assert_eq!(entry.name(), "Fill");
        let value = entry.parameter("Value").unwrap();
        assert_eq!(value.value, "2.5");
        assert!(!value.is_default);
    }

    #[test]
    fn rethrow_returns_the_error() {
        let mut r = runner();
        r.set_rethrows(true);
        let err = r.execute().unwrap_err();
        assert!(matches!(err, FrameworkError::InvalidProperties(ref m) if m.contains_key("OutputWorkspace")));
    }

    #[test]
    fn cancelled_before_body_check() {
        #[derive(Default)]
        struct Spin;
        impl Algorithm for Spin {
            fn name(&self) -> &str {
                "Spin"
            }
            fn init(&mut self, _props: &mut PropertyManager) -> Result<()> {
                Ok(())
            }
            fn exec(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
                ctx.cancellation_token().cancel();
                ctx.interruption_point()
            }
        }
        let mut r = AlgorithmRunner::new(Box::new(Spin), Framework::new());
        r.initialize().unwrap();
        r.set_rethrows(true);
        assert!(r.execute().unwrap_err().is_cancelled());
    }
}
