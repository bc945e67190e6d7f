//! Loop-level tests for full engine runs.
//!
//! These drive `run_engine` with scripted generators and executors to verify
//! the attempt budget, promotion policy, feedback routing, and determinism.

use std::fs;

use engine::compile::{CANDIDATE_FILE, OUTCOME_FILE, run_engine};
use engine::core::feedback::{CRASH_LABEL, WRONG_OUTPUT_LABEL};
use engine::core::types::{EngineStop, FailureKind};
use engine::io::attempt_log::AttemptPaths;
use engine::io::generator::GeneratorUnavailable;
use engine::test_support::{
    Behavior, GeneratorCall, RecordingStore, ScriptedExecutor, ScriptedGenerator,
    classified_csv, compile_request, expected, settings, write_inputs,
};

const TITAN_COUNTS: [(&str, usize); 4] = [
    ("Normal", 80),
    ("Liquidation", 10),
    ("Review", 5),
    ("VIP_Keep", 5),
];

/// A generator whose code always validates wrong burns the whole budget.
///
/// Exactly `max_attempts` generation calls, `Exhausted`, and no promotion.
#[test]
fn always_wrong_output_exhausts_without_promoting() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (data, rules) = write_inputs(temp.path()).expect("inputs");
    let output = temp.path().join("out.csv");

    let generator = ScriptedGenerator::always("wrong");
    let executor = ScriptedExecutor::new(vec![(
        "wrong",
        Behavior::Writes(classified_csv(&[
            ("Normal", 80),
            ("Liquidation", 9),
            ("Review", 5),
            ("VIP_Keep", 6),
        ])),
    )]);
    let store = RecordingStore::default();
    let request = compile_request(&data, &rules, &output, Some(expected(&TITAN_COUNTS)));

    let outcome = run_engine(
        &generator,
        &executor,
        &store,
        &settings(&temp.path().join("work"), 3),
        &request,
    )
    .expect("run");

    assert!(!outcome.succeeded);
    assert_eq!(
        outcome.stop,
        EngineStop::Exhausted {
            attempts: 3,
            max_attempts: 3
        }
    );
    assert_eq!(outcome.attempts_used, 3);
    assert_eq!(generator.call_count(), 3);
    assert!(store.promotions().is_empty());
    assert_eq!(outcome.final_code, None);

    // Every mismatched category is named, not just the first.
    assert!(
        outcome
            .last_validation_report
            .contains("Liquidation: expected=10, actual=9")
    );
    assert!(
        outcome
            .last_validation_report
            .contains("VIP_Keep: expected=5, actual=6")
    );
    assert!(outcome.attempts.iter().all(|record| {
        record.failure == Some(FailureKind::DistributionMismatch)
    }));
}

/// Second attempt succeeds: `attempts_used = 2`, exactly one promotion, and
/// the repair call sees the crash feedback and the prior code.
#[test]
fn second_attempt_success_promotes_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (data, rules) = write_inputs(temp.path()).expect("inputs");
    let output = temp.path().join("out.csv");
    let work = temp.path().join("work");

    let generator = ScriptedGenerator::sequence(&["crashes", "good"]);
    let executor = ScriptedExecutor::new(vec![
        (
            "crashes",
            Behavior::Crashes("KeyError: 'Profit_Margin'".to_string()),
        ),
        ("good", Behavior::Writes(classified_csv(&TITAN_COUNTS))),
    ]);
    let store = RecordingStore::default();
    let request = compile_request(&data, &rules, &output, Some(expected(&TITAN_COUNTS)));

    let outcome = run_engine(&generator, &executor, &store, &settings(&work, 3), &request)
        .expect("run");

    assert!(outcome.succeeded);
    assert_eq!(outcome.attempts_used, 2);
    assert_eq!(outcome.stop, EngineStop::Succeeded { attempt: 2 });
    assert_eq!(outcome.final_code.as_deref(), Some("good"));

    let promotions = store.promotions();
    assert_eq!(promotions.len(), 1);
    assert_eq!(promotions[0].attempt, 2);
    assert_eq!(promotions[0].slot, "current");

    let calls = generator.calls();
    assert_eq!(calls[0], GeneratorCall::Generate);
    let GeneratorCall::Repair {
        prior_code,
        feedback,
    } = &calls[1]
    else {
        panic!("second call should be a repair");
    };
    assert_eq!(prior_code, "crashes");
    assert_eq!(feedback.kind, FailureKind::ExecutionFailed);
    assert!(feedback.text.starts_with(CRASH_LABEL));
    assert!(feedback.text.contains("KeyError: 'Profit_Margin'"));

    assert_eq!(outcome.attempts[0].failure, Some(FailureKind::ExecutionFailed));
    assert_eq!(outcome.attempts[1].failure, None);
    assert!(outcome.attempts[1].report.contains("Total rows: 100"));

    // Archive and fixed candidate path.
    assert_eq!(
        fs::read_to_string(work.join(CANDIDATE_FILE)).expect("candidate"),
        "good"
    );
    let first = AttemptPaths::new(&work, 1);
    assert_eq!(
        fs::read_to_string(&first.candidate_path).expect("archived candidate"),
        "crashes"
    );
    assert!(
        fs::read_to_string(&first.execution_log_path)
            .expect("execution log")
            .contains("KeyError")
    );
    assert!(work.join(OUTCOME_FILE).exists());
}

/// Wrong output is routed back with the wrong-output label, not the crash label.
#[test]
fn validation_failure_feedback_is_labelled_wrong_output() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (data, rules) = write_inputs(temp.path()).expect("inputs");
    let output = temp.path().join("out.csv");

    let generator = ScriptedGenerator::sequence(&["no-status", "good"]);
    let executor = ScriptedExecutor::new(vec![
        (
            "no-status",
            Behavior::Writes("Item,Price\na,1\n".to_string()),
        ),
        ("good", Behavior::Writes(classified_csv(&[("Normal", 3)]))),
    ]);
    let store = RecordingStore::default();
    let request = compile_request(&data, &rules, &output, None);

    let outcome = run_engine(
        &generator,
        &executor,
        &store,
        &settings(&temp.path().join("work"), 3),
        &request,
    )
    .expect("run");

    assert!(outcome.succeeded);
    assert_eq!(outcome.attempts[0].failure, Some(FailureKind::SchemaViolation));
    let GeneratorCall::Repair { feedback, .. } = &generator.calls()[1] else {
        panic!("second call should be a repair");
    };
    assert!(feedback.text.starts_with(WRONG_OUTPUT_LABEL));
    assert_eq!(feedback.kind, FailureKind::SchemaViolation);
}

/// Crash-type failures cover timeouts, missing sentinels, and missing artifacts.
#[test]
fn every_failure_kind_consumes_one_attempt() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (data, rules) = write_inputs(temp.path()).expect("inputs");
    let output = temp.path().join("out.csv");

    let generator = ScriptedGenerator::sequence(&["slow", "quiet", "silent-writer"]);
    let executor = ScriptedExecutor::new(vec![
        ("slow", Behavior::TimesOut),
        ("quiet", Behavior::SkipsSentinel),
        ("silent-writer", Behavior::WritesNothing),
    ]);
    let store = RecordingStore::default();
    let request = compile_request(&data, &rules, &output, None);

    let outcome = run_engine(
        &generator,
        &executor,
        &store,
        &settings(&temp.path().join("work"), 3),
        &request,
    )
    .expect("run");

    let kinds: Vec<_> = outcome.attempts.iter().map(|r| r.failure).collect();
    assert_eq!(
        kinds,
        vec![
            Some(FailureKind::ExecutionFailed),
            Some(FailureKind::ExecutionFailed),
            Some(FailureKind::MissingArtifact),
        ]
    );
    assert!(outcome.attempts[0].report.contains("exceeded 30 seconds"));
    assert!(outcome.attempts[1].report.contains("PROCESS_COMPLETE"));
    assert_eq!(executor.runs(), 3);
    assert!(store.promotions().is_empty());
}

/// An unreachable generator ends the run at once instead of burning retries.
#[test]
fn generator_unavailable_aborts_immediately() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (data, rules) = write_inputs(temp.path()).expect("inputs");
    let output = temp.path().join("out.csv");

    let generator = ScriptedGenerator::new(vec![
        Ok("crashes".to_string()),
        Err(GeneratorUnavailable::new("503 from upstream")),
    ]);
    let executor = ScriptedExecutor::new(vec![(
        "crashes",
        Behavior::Crashes("boom".to_string()),
    )]);
    let store = RecordingStore::default();
    let request = compile_request(&data, &rules, &output, None);

    let outcome = run_engine(
        &generator,
        &executor,
        &store,
        &settings(&temp.path().join("work"), 5),
        &request,
    )
    .expect("run");

    assert_eq!(
        outcome.stop,
        EngineStop::GeneratorUnavailable {
            attempt: 2,
            reason: "503 from upstream".to_string()
        }
    );
    assert_eq!(generator.call_count(), 2);
    assert_eq!(executor.runs(), 1);
    assert_eq!(
        outcome.attempts.last().and_then(|r| r.failure),
        Some(FailureKind::GeneratorUnavailable)
    );
    assert!(store.promotions().is_empty());
}

/// A stale output file from an earlier run cannot satisfy the validator.
#[test]
fn stale_output_is_removed_before_execution() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (data, rules) = write_inputs(temp.path()).expect("inputs");
    let output = temp.path().join("out.csv");
    fs::write(&output, classified_csv(&[("Normal", 3)])).expect("stale");

    let generator = ScriptedGenerator::always("silent-writer");
    let executor = ScriptedExecutor::new(vec![("silent-writer", Behavior::WritesNothing)]);
    let store = RecordingStore::default();
    let request = compile_request(&data, &rules, &output, None);

    let outcome = run_engine(
        &generator,
        &executor,
        &store,
        &settings(&temp.path().join("work"), 1),
        &request,
    )
    .expect("run");

    assert!(!outcome.succeeded);
    assert_eq!(outcome.attempts[0].failure, Some(FailureKind::MissingArtifact));
}

/// An output path naming an input file is refused before anything is deleted.
#[test]
fn output_aliasing_an_input_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (data, rules) = write_inputs(temp.path()).expect("inputs");
    let data_before = fs::read_to_string(&data).expect("read data");
    let generator = ScriptedGenerator::always("good");
    let executor = ScriptedExecutor::new(Vec::new());
    let store = RecordingStore::default();

    let dotted = temp.path().join(".").join(data.file_name().expect("data file name"));
    for output in [data.clone(), dotted, rules.clone()] {
        let request = compile_request(&data, &rules, &output, None);
        let err = run_engine(
            &generator,
            &executor,
            &store,
            &settings(&temp.path().join("work"), 3),
            &request,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("same file as input"), "{err:#}");
    }

    assert_eq!(fs::read_to_string(&data).expect("data kept"), data_before);
    assert!(rules.exists());
    assert_eq!(generator.call_count(), 0);
    assert!(store.promotions().is_empty());
}

/// Identical inputs and a deterministic generator give identical outcomes.
#[test]
fn reruns_are_deterministic() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (data, rules) = write_inputs(temp.path()).expect("inputs");
    let output = temp.path().join("out.csv");
    let request = compile_request(&data, &rules, &output, Some(expected(&TITAN_COUNTS)));

    let run_once = || {
        let generator = ScriptedGenerator::sequence(&["slow", "good"]);
        let executor = ScriptedExecutor::new(vec![
            ("slow", Behavior::TimesOut),
            ("good", Behavior::Writes(classified_csv(&TITAN_COUNTS))),
        ]);
        let store = RecordingStore::default();
        run_engine(
            &generator,
            &executor,
            &store,
            &settings(&temp.path().join("work"), 3),
            &request,
        )
        .expect("run")
    };

    assert_eq!(run_once(), run_once());
}

/// Missing rule documents are setup errors, not attempt failures.
#[test]
fn missing_rules_file_is_an_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (data, _) = write_inputs(temp.path()).expect("inputs");
    let generator = ScriptedGenerator::always("good");
    let executor = ScriptedExecutor::new(Vec::new());
    let store = RecordingStore::default();
    let request = compile_request(
        &data,
        &temp.path().join("absent.json"),
        &temp.path().join("out.csv"),
        None,
    );

    let err = run_engine(
        &generator,
        &executor,
        &store,
        &settings(&temp.path().join("work"), 3),
        &request,
    )
    .unwrap_err();
    assert!(format!("{err:#}").contains("absent.json"));
    assert_eq!(generator.call_count(), 0);
}
