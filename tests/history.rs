use rusty_reduce::data::history::HISTORY_HEADER;
use rusty_reduce::{Framework, FrameworkConfig, WorkspaceHistory};

fn run(fw: &Framework, name: &str, assignments: &str) {
    let mut alg = fw.create_algorithm(name, None).unwrap();
    alg.set_rethrows(true);
    alg.set_properties(assignments).unwrap();
    assert!(alg.execute().unwrap(), "{name} failed");
}

fn reduce_chain(fw: &Framework) {
    run(
        fw,
        "CreateWorkspace",
        "OutputWorkspace=raw;DataX=0,1,2,3,4,5,6,7,8;DataY=1,1,2,2,3,3,4,4;UnitX=TOF",
    );
    run(fw, "Rebin", "InputWorkspace=raw;Params=0,2,8;OutputWorkspace=binned");
    run(fw, "ConvertToDistribution", "Workspace=binned");
}

#[test]
fn chain_history_is_chronological() {
    let fw = Framework::new();
    reduce_chain(&fw);

    let binned = fw.ads().retrieve("binned").unwrap();
    let history = binned.history();
    let names: Vec<_> = history.algorithm_histories().iter().map(|h| h.name().to_string()).collect();
    assert_eq!(names, ["CreateWorkspace", "Rebin", "ConvertToDistribution"]);
    let ends: Vec<_> = history.algorithm_histories().iter().map(|h| h.execution_end()).collect();
    assert!(ends.windows(2).all(|w| w[0] <= w[1]));

    // The source keeps only its own provenance.
    assert_eq!(fw.ads().retrieve("raw").unwrap().history().size(), 1);

    let rebin = history.algorithm_history(1).unwrap();
    assert_eq!(rebin.parameter("Params").unwrap().value, "0,2,8");
    assert!(!rebin.parameter("Params").unwrap().is_default);
    assert!(rebin.parameter("FullBinsOnly").unwrap().is_default);
}

#[test]
fn text_form_lists_every_step() {
    let fw = Framework::new();
    reduce_chain(&fw);
    let text = fw.ads().retrieve("binned").unwrap().history().to_string();

    assert!(text.starts_with(HISTORY_HEADER));
    assert!(text.contains(&format!("OS name: {}", std::env::consts::OS)));
    let create = text.find("Algorithm: CreateWorkspace v1").unwrap();
    let rebin = text.find("Algorithm: Rebin v1").unwrap();
    let convert = text.find("Algorithm: ConvertToDistribution v1").unwrap();
    assert!(create < rebin && rebin < convert);
    assert!(text.contains("Name: Params, Value: 0,2,8, Default?: No, Direction: 0"));
}

#[test]
fn json_round_trip_preserves_history() {
    let fw = Framework::new();
    reduce_chain(&fw);
    let history = fw.ads().retrieve("binned").unwrap().history();

    let json = history.to_json().unwrap();
    let restored = WorkspaceHistory::from_json(&json).unwrap();
    assert_eq!(restored, history);
    assert_eq!(restored.last_algorithm().unwrap().name(), "ConvertToDistribution");
}

#[test]
fn child_steps_can_be_recorded_in_the_output() {
    let count_rebins = |record: bool| {
        let fw = Framework::with_config(FrameworkConfig {
            record_child_history_in_workspace: record,
            ..FrameworkConfig::default()
        });
        run(
            &fw,
            "CreateWorkspace",
            "OutputWorkspace=fine;DataX=0,1,2,3,4;DataY=1,1,1,1",
        );
        run(
            &fw,
            "CreateWorkspace",
            "OutputWorkspace=coarse;DataX=0,2,4;DataY=0,0",
        );
        run(
            &fw,
            "RebinToWorkspace",
            "WorkspaceToRebin=fine;WorkspaceToMatch=coarse;OutputWorkspace=matched",
        );
        let history = fw.ads().retrieve("matched").unwrap().history();
        assert_eq!(history.last_algorithm().unwrap().name(), "RebinToWorkspace");
        history
            .algorithm_histories()
            .iter()
            .filter(|h| h.name() == "Rebin")
            .count()
    };

    assert_eq!(count_rebins(false), 0);
    assert_eq!(count_rebins(true), 1);
}

#[test]
fn repeated_runs_append_separate_entries() {
    let fw = Framework::new();
    run(&fw, "CreateWorkspace", "OutputWorkspace=ws;DataX=0,1,2,3,4;DataY=1,2,3,4");
    run(&fw, "Rebin", "InputWorkspace=ws;Params=0,1,4;OutputWorkspace=ws");
    run(&fw, "Rebin", "InputWorkspace=ws;Params=0,1,4;OutputWorkspace=ws");

    let history = fw.ads().retrieve("ws").unwrap().history();
    let entries = history.algorithm_histories();
    let names: Vec<_> = entries.iter().map(|h| h.name()).collect();
    assert_eq!(names, ["CreateWorkspace", "Rebin", "Rebin"]);
    assert_ne!(entries[1].execution_id(), entries[2].execution_id());
    assert!(entries[1].execution_end() <= entries[2].execution_end());
}
