use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use rusty_reduce::{
    AdsEvent, Algorithm, Direction, ExecutionContext, ExecutionState, Framework, FrameworkConfig,
    FrameworkError, PropertyManager, Result,
};

fn create_counts(fw: &Framework, name: &str) {
    let mut alg = fw.create_algorithm("CreateWorkspace", None).unwrap();
    alg.set_properties(&format!(
        "OutputWorkspace={name};DataX=0,1,2,3,4;DataY=1,2,3,4,5,6,7,8;NSpec=2;UnitX=TOF"
    ))
    .unwrap();
    assert!(alg.execute().unwrap());
}

#[test]
fn lifecycle_from_creation_to_published_output() {
    let fw = Framework::new();
    let mut alg = fw.create_algorithm("Rebin", None).unwrap();
    assert_eq!(alg.state(), ExecutionState::Initialized);
    assert!(matches!(
        alg.output_matrix("OutputWorkspace"),
        Err(FrameworkError::OutputNotReady(_))
    ));

    create_counts(&fw, "raw");
    alg.set_properties("InputWorkspace=raw;Params=0,2,4;OutputWorkspace=coarse").unwrap();
    assert!(alg.execute().unwrap());
    assert_eq!(alg.state(), ExecutionState::Executed);

    let coarse = fw.ads().retrieve_matrix("coarse").unwrap();
    assert!(Arc::ptr_eq(&coarse, &alg.output_matrix("OutputWorkspace").unwrap()));
    assert_eq!(coarse.read().read_y(1).unwrap(), &[11.0, 15.0]);
    assert_eq!(coarse.read().x_unit(), "TOF");
}

#[test]
fn bounded_validator_message_names_the_bound() {
    let fw = Framework::new();
    let mut alg = fw.create_algorithm("Rebunch", None).unwrap();
    let err = alg.set_property_value("NBunch", "0").unwrap_err();
    match err {
        FrameworkError::Validation { property, message } => {
            assert_eq!(property, "NBunch");
            assert!(message.contains("lower bound (1)"), "{message}");
        }
        other => panic!("unexpected {other:?}"),
    }
    // The rejected value was not stored.
    assert_eq!(alg.get_property::<i64>("NBunch").unwrap(), 1);
}

#[test]
fn unknown_input_name_fails_validation() {
    let quiet = Framework::new();
    let mut alg = quiet.create_algorithm("Integration", None).unwrap();
    alg.set_properties("InputWorkspace=nowhere;OutputWorkspace=out").unwrap();
    assert!(!alg.execute().unwrap());
    assert_eq!(alg.state(), ExecutionState::Failed);

    let strict = Framework::with_config(FrameworkConfig {
        rethrow_errors: true,
        ..FrameworkConfig::default()
    });
    let mut alg = strict.create_algorithm("Integration", None).unwrap();
    alg.set_properties("InputWorkspace=nowhere;OutputWorkspace=out").unwrap();
    match alg.execute().unwrap_err() {
        FrameworkError::InvalidProperties(v) => {
            assert!(v["InputWorkspace"].contains("was not found"), "{v:?}")
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn publication_notifies_observers() {
    let fw = Framework::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    fw.ads().subscribe(Arc::new(move |event: &AdsEvent| {
        let kind = match event {
            AdsEvent::Add { .. } => "add",
            AdsEvent::Replace { .. } => "replace",
            AdsEvent::Delete { .. } => "delete",
            AdsEvent::Rename { .. } => "rename",
            AdsEvent::Clear => "clear",
        };
        sink.lock().push(format!("{kind}:{}", event.name().unwrap_or("")));
    }));

    create_counts(&fw, "a");
    create_counts(&fw, "a");
    fw.ads().rename("a", "b").unwrap();
    fw.ads().remove("b").unwrap();
    assert_eq!(
        *seen.lock(),
        vec!["add:a", "replace:a", "rename:b", "delete:b"]
    );
}

#[test]
fn execute_async_runs_on_a_worker() {
    let fw = Framework::new();
    let mut alg = fw.create_algorithm("CreateSampleWorkspace", None).unwrap();
    alg.set_properties("OutputWorkspace=bg;NumSpectra=4;NumBins=50;Function=Flat background")
        .unwrap();
    let running = alg.execute_async();
    let result = running.join().unwrap();
    assert!(result.outcome.unwrap());
    assert!(result.algorithm.is_executed());
    assert_eq!(fw.ads().retrieve_matrix("bg").unwrap().read().number_histograms(), 4);
}

/// Reports progress, then waits for cancellation.
#[derive(Default)]
struct WaitForCancel;

impl Algorithm for WaitForCancel {
    fn name(&self) -> &str {
        "WaitForCancel"
    }

    fn init(&mut self, props: &mut PropertyManager) -> Result<()> {
        props.declare_property("Iterations", 0_i64, None, Direction::Output)
    }

    fn exec(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        ctx.progress(0.5, "waiting");
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut iterations = 0_i64;
        while Instant::now() < deadline {
            ctx.interruption_point()?;
            iterations += 1;
            std::thread::sleep(Duration::from_millis(1));
        }
        ctx.set_property("Iterations", iterations)
    }
}

#[test]
fn cancellation_stops_an_async_run() {
    let fw = Framework::new();
    fw.algorithms().subscribe::<WaitForCancel>();
    let alg = fw.create_algorithm("WaitForCancel", None).unwrap();
    let running = alg.execute_async();

    let started = Instant::now();
    while running.progress() < 0.5 {
        assert!(started.elapsed() < Duration::from_secs(5), "algorithm never started");
        std::thread::sleep(Duration::from_millis(1));
    }
    running.cancel();
    let result = running.join().unwrap();
    assert!(!result.outcome.unwrap());
    assert_eq!(result.algorithm.state(), ExecutionState::Failed);
    assert!(result.algorithm.history().is_none());
}

#[test]
fn child_outputs_stay_out_of_the_data_service() {
    let fw = Framework::new();
    create_counts(&fw, "fine");
    let mut coarse = fw.create_algorithm("Rebin", None).unwrap();
    coarse.set_properties("InputWorkspace=fine;Params=0,4,4;OutputWorkspace=coarse").unwrap();
    coarse.execute().unwrap();

    let mut alg = fw.create_algorithm("RebinToWorkspace", None).unwrap();
    alg.set_properties("WorkspaceToRebin=fine;WorkspaceToMatch=coarse;OutputWorkspace=matched")
        .unwrap();
    assert!(alg.execute().unwrap());
    assert_eq!(fw.ads().names(), vec!["coarse", "fine", "matched"]);
}

#[test]
fn cancel_right_after_spawning_is_honoured() {
    let fw = Framework::new();
    fw.algorithms().subscribe::<WaitForCancel>();
    for _ in 0..5 {
        let alg = fw.create_algorithm("WaitForCancel", None).unwrap();
        let running = alg.execute_async();
        running.cancel();
        let result = running.join().unwrap();
        assert!(!result.outcome.unwrap());
        assert_eq!(result.algorithm.state(), ExecutionState::Failed);
    }
}

#[test]
fn every_violation_is_reported_together() {
    let fw = Framework::new();
    let mut crop = fw.create_algorithm("CropWorkspace", None).unwrap();
    crop.set_rethrows(true);
    crop.set_properties("XMin=5;XMax=1;OutputWorkspace=out").unwrap();

    let listed = crop.properties().validate_all();
    assert!(listed.contains_key("InputWorkspace"), "{listed:?}");
    assert_eq!(listed["XMax"], "XMax must be greater than XMin");

    match crop.execute().unwrap_err() {
        FrameworkError::InvalidProperties(v) => {
            assert!(v.contains_key("InputWorkspace"), "{v:?}");
            assert!(v.contains_key("XMax"), "{v:?}");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(!fw.ads().does_exist("out"));
}
