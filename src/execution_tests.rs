use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::config::Options;
use crate::engine::Engine;
use crate::error::{ExecutionError, HandlerError, VariableError};
use crate::library::Library;
use crate::page::Page;
use crate::trigger::{TriggerCategory, TriggerKey};
use crate::variable::Value;

type Log = Arc<Mutex<Vec<String>>>;

fn logged(library: &mut Library, log: &Log, category: TriggerCategory, id: i32, result: bool) {
    let log = Arc::clone(log);
    library.register(
        category,
        id,
        move |reader| {
            log.lock().unwrap().push(reader.trigger().to_string());
            Ok(result)
        },
        None,
    );
}

fn test_library(log: &Log) -> Library {
    let mut library = Library::new("test");
    logged(&mut library, log, TriggerCategory::Cause, 1, true);
    logged(&mut library, log, TriggerCategory::Cause, 2, false);
    logged(&mut library, log, TriggerCategory::Condition, 1, true);
    logged(&mut library, log, TriggerCategory::Condition, 2, false);
    for id in 1..=5 {
        logged(&mut library, log, TriggerCategory::Effect, id, true);
    }
    // loops while its iteration count is below the operand
    logged(&mut library, log, TriggerCategory::Flow, 3, true);

    let flow_log = Arc::clone(log);
    library.register(
        TriggerCategory::Flow,
        1,
        move |reader| {
            flow_log.lock().unwrap().push(reader.trigger().to_string());
            let times = reader.read_number()?;
            Ok((reader.iteration() as f64) < times)
        },
        None,
    );
    let once_log = Arc::clone(log);
    library.register(
        TriggerCategory::Flow,
        2,
        move |reader| {
            once_log.lock().unwrap().push(reader.trigger().to_string());
            Ok(reader.iteration() == 0)
        },
        None,
    );
    let exit_log = Arc::clone(log);
    library.register(
        TriggerCategory::Effect,
        10,
        move |reader| {
            exit_log.lock().unwrap().push(reader.trigger().to_string());
            reader.exit_loop();
            Ok(true)
        },
        None,
    );
    library.register(
        TriggerCategory::Effect,
        11,
        |_| Err(HandlerError::Custom("boom".to_string())),
        Some("fail loudly."),
    );
    let param_log = Arc::clone(log);
    library.register(
        TriggerCategory::Effect,
        20,
        move |reader| {
            let param = reader.parameter(0).map(|v| v.to_string()).unwrap_or_default();
            let entry = format!("{}@{}", param, reader.current_block_index());
            param_log.lock().unwrap().push(entry);
            Ok(true)
        },
        None,
    );
    let text_log = Arc::clone(log);
    library.register(
        TriggerCategory::Effect,
        21,
        move |reader| {
            let text = reader.read_string()?;
            text_log.lock().unwrap().push(text);
            Ok(true)
        },
        None,
    );
    library.register(
        TriggerCategory::Effect,
        22,
        |reader| {
            let n = reader.read_number()?;
            reader.set_variable("%out", n * 2.0)?;
            Ok(true)
        },
        None,
    );
    library.register(
        TriggerCategory::Effect,
        23,
        |reader| {
            reader.set_variable("%const", 2)?;
            Ok(true)
        },
        None,
    );
    library.register(
        TriggerCategory::Effect,
        24,
        |reader| {
            let key = reader.parameter(0).map(Value::as_text).unwrap_or_default();
            reader.set_table_entry("%seen", &key, 1)?;
            Ok(true)
        },
        None,
    );
    library
}

fn harness_with(source: &str, options: Options) -> (Page, Log) {
    let mut page = Engine::new(options)
        .load_from_str(source)
        .expect("script loads");
    let log = Log::default();
    page.load_library(&test_library(&log)).expect("no conflicts");
    (page, log)
}

fn harness(source: &str) -> (Page, Log) {
    harness_with(source, Options::default())
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn count(log: &Log, entry: &str) -> usize {
    entries(log).iter().filter(|e| e.as_str() == entry).count()
}

#[test]
fn any_passing_cause_enters_the_block_once() {
    let (page, log) = harness("(0:2) (0:1) (5:1)");
    assert!(page.execute(&[]).is_ok());
    assert_eq!(entries(&log), vec!["(0:2)", "(0:1)", "(5:1)"]);
}

#[test]
fn remaining_causes_are_skipped_after_a_pass() {
    let (page, log) = harness("(0:1) (0:2) (5:1)");
    page.execute(&[]);
    assert_eq!(entries(&log), vec!["(0:1)", "(5:1)"]);
}

#[test]
fn no_passing_cause_runs_nothing() {
    let (page, log) = harness("(0:2) (0:2) (5:1)");
    assert!(page.execute(&[]).is_ok());
    assert_eq!(entries(&log), vec!["(0:2)", "(0:2)"]);
}

#[test]
fn failed_condition_stops_its_chain() {
    let (page, log) = harness("(0:1) (1:1) (1:2) (5:1)");
    page.execute(&[]);
    assert_eq!(entries(&log), vec!["(0:1)", "(1:1)", "(1:2)"]);
}

#[test]
fn passing_conditions_run_the_effect_once() {
    let (page, log) = harness("(0:1) (1:1) (1:1) (5:1)");
    assert!(page.execute(&[]).is_ok());
    assert_eq!(count(&log, "(5:1)"), 1);
}

#[test]
fn failed_condition_after_an_effect_skips_to_a_fresh_chain() {
    let (page, log) = harness("(0:1) (1:1) (5:1) (1:2) (1:1) (5:2) (1:1) (5:3)");
    page.execute(&[]);
    assert_eq!(
        entries(&log),
        vec!["(0:1)", "(1:1)", "(5:1)", "(1:2)", "(1:1)", "(5:3)"]
    );
    assert_eq!(count(&log, "(5:2)"), 0);
}

#[test]
fn failed_condition_jumps_to_the_next_chain() {
    let (page, log) = harness("(0:1) (1:2) (1:1) (5:1) (1:1) (5:2)");
    page.execute(&[]);
    assert_eq!(entries(&log), vec!["(0:1)", "(1:2)", "(1:1)", "(5:2)"]);
}

#[test]
fn effects_run_regardless_of_result() {
    let (mut page, log) = harness("(0:1) (5:30) (5:1)");
    page.add_handler(TriggerCategory::Effect, 30, |_| Ok(false), None)
        .expect("free key");
    page.execute(&[]);
    assert_eq!(entries(&log), vec!["(0:1)", "(5:1)"]);
}

#[test]
fn flow_loops_until_it_fails() {
    let (page, log) = harness("(0:1) (6:1) 3 (5:1) (6:2) (5:2)");
    assert!(page.execute(&[]).is_ok());
    assert_eq!(
        entries(&log),
        vec![
            "(0:1)", "(6:1)", "(5:1)", "(6:1)", "(5:1)", "(6:1)", "(5:1)", "(6:1)", "(6:2)",
            "(5:2)", "(6:2)",
        ]
    );
}

#[test]
fn failed_flow_skips_its_body() {
    let (page, log) = harness("(0:1) (6:1) 0 (5:1) (6:2) (5:2)");
    page.execute(&[]);
    assert_eq!(count(&log, "(5:1)"), 0);
    assert_eq!(count(&log, "(5:2)"), 1);
}

#[test]
fn loop_limit_reports_one_error() {
    let options = Options {
        loop_limit: 5,
        ..Options::default()
    };
    let (mut page, log) = harness_with("(0:1) (6:3) (5:1) (0:1) (5:2)", options);
    let reported = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reported);
    page.on_error(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let report = page.execute(&[]);
    assert_eq!(report.blocks, 2);
    assert_eq!(report.errors.len(), 1);
    assert!(matches!(
        report.errors[0],
        ExecutionError::LoopLimitExceeded { limit: 5, .. }
    ));
    assert_eq!(reported.load(Ordering::SeqCst), 1);
    assert_eq!(count(&log, "(5:1)"), 5);
    // the sibling block still ran
    assert_eq!(count(&log, "(5:2)"), 1);
}

#[test]
fn exit_loop_leaves_the_enclosing_loop() {
    let (page, log) = harness("(0:1) (6:3) (5:1) (5:10) (5:2) (6:2) (5:3)");
    assert!(page.execute(&[]).is_ok());
    assert_eq!(
        entries(&log),
        vec!["(0:1)", "(6:3)", "(5:1)", "(5:10)", "(6:2)", "(5:3)", "(6:2)"]
    );
}

#[test]
fn exit_loop_outside_a_loop_ends_the_block() {
    let (page, log) = harness("(0:1) (5:10) (5:1)");
    assert!(page.execute(&[]).is_ok());
    assert_eq!(entries(&log), vec!["(0:1)", "(5:10)"]);
}

#[test]
fn missing_handler_aborts_only_its_block() {
    let (mut page, log) = harness("(0:1) (5:99) (5:1) (0:1) (5:2)");
    let descriptions = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&descriptions);
    page.on_error(move |_, description| seen.lock().unwrap().push(description.to_string()));

    let report = page.execute(&[]);
    assert_eq!(report.errors.len(), 1);
    match &report.errors[0] {
        ExecutionError::HandlerNotFound { trigger } => {
            assert_eq!(trigger.key(), TriggerKey::new(TriggerCategory::Effect, 99))
        }
        other => panic!("unexpected error {}", other),
    }
    assert_eq!(*descriptions.lock().unwrap(), vec!["(5:99) <unhandled>".to_string()]);
    assert_eq!(entries(&log), vec!["(0:1)", "(0:1)", "(5:2)"]);
}

#[test]
fn handler_error_aborts_the_block() {
    let (page, log) = harness("(0:1) (5:11) (5:1)");
    let report = page.execute(&[]);
    assert_eq!(report.errors.len(), 1);
    match &report.errors[0] {
        ExecutionError::Handler { trigger, source } => {
            assert_eq!(trigger.id(), 11);
            assert_eq!(source.to_string(), "boom");
        }
        other => panic!("unexpected error {}", other),
    }
    assert_eq!(entries(&log), vec!["(0:1)"]);
}

#[test]
fn panicking_handler_aborts_only_its_block() {
    let (mut page, log) = harness("(0:1) (5:40) (5:1) (0:1) (5:2)");
    page.add_handler(TriggerCategory::Effect, 40, |_| panic!("handler blew up"), None)
        .expect("free key");
    let reported = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reported);
    page.on_error(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let report = page.execute(&[]);
    assert_eq!(report.blocks, 2);
    assert_eq!(report.errors.len(), 1);
    match &report.errors[0] {
        ExecutionError::HandlerPanicked { trigger, message } => {
            assert_eq!(trigger.id(), 40);
            assert_eq!(message, "handler blew up");
        }
        other => panic!("unexpected error {}", other),
    }
    assert_eq!(reported.load(Ordering::SeqCst), 1);
    assert_eq!(entries(&log), vec!["(0:1)", "(0:1)", "(5:2)"]);
}

#[test]
fn trigger_limit_bounds_a_block_run() {
    let options = Options {
        trigger_limit: 4,
        ..Options::default()
    };
    let (page, log) = harness_with("(0:1) (6:3) (5:1)", options);
    let report = page.execute(&[]);
    assert_eq!(report.errors.len(), 1);
    let err = &report.errors[0];
    assert!(matches!(err, ExecutionError::TriggerLimitExceeded { limit: 4, .. }));
    assert_eq!(err.trigger().key(), TriggerKey::new(TriggerCategory::Effect, 1));
    assert_eq!(entries(&log).len(), 4);
}

#[test]
fn parameters_and_block_index_reach_handlers() {
    let (page, log) = harness("(0:1) (5:20) (0:1) (5:20)");
    page.execute(&[Value::from("a"), Value::from(2)]);
    assert_eq!(entries(&log), vec!["(0:1)", "a@0", "(0:1)", "a@1"]);
}

#[test]
fn execute_from_skips_leading_triggers() {
    let (page, log) = harness("(0:2) (5:1)");
    page.execute_from(1, &[]);
    assert_eq!(entries(&log), vec!["(5:1)"]);
}

#[test]
fn strings_interpolate_variables() {
    let (page, log) = harness("(0:1) (5:21) {Hi %name, %t[k] and %missing!}");
    page.set_variable("%name", "Ann").expect("plain variable");
    let mut table = IndexMap::new();
    table.insert("k".to_string(), Value::from(7));
    page.set_variable("%t", Value::Table(table)).expect("plain variable");

    page.execute(&[]);
    assert_eq!(entries(&log)[1], "Hi Ann, 7 and %missing!");
}

#[test]
fn numbers_can_come_from_variables() {
    let (page, _) = harness("(0:1) (5:22) %x");
    page.set_variable("%x", "21").expect("plain variable");
    assert!(page.execute(&[]).is_ok());
    assert_eq!(page.variable("%out").map(|v| v.value().clone()), Some(Value::from(42)));
}

#[test]
fn missing_operand_is_a_handler_error() {
    let (page, _) = harness("(0:1) (5:22)");
    let report = page.execute(&[]);
    assert!(matches!(
        &report.errors[0],
        ExecutionError::Handler {
            source: HandlerError::MissingOperand { .. },
            ..
        }
    ));
}

#[test]
fn assigning_a_constant_fails_the_block() {
    let (page, _) = harness("(0:1) (5:23)");
    page.install_constant("%const", 1);
    let report = page.execute(&[]);
    assert!(matches!(
        &report.errors[0],
        ExecutionError::Handler {
            source: HandlerError::Variable(VariableError::Constant(name)),
            ..
        } if name == "%const"
    ));
    assert_eq!(page.variable("%const").map(|v| v.value().clone()), Some(Value::from(1)));
}

#[test]
fn one_page_runs_on_many_threads() {
    let (page, log) = harness("(0:1) (5:1)");
    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                assert!(page.execute(&[]).is_ok());
            });
        }
    });
    assert_eq!(count(&log, "(5:1)"), 4);
}

#[test]
fn concurrent_table_writes_are_not_lost() {
    let (page, _) = harness("(0:1) (5:24)");
    std::thread::scope(|s| {
        for i in 0..8 {
            let page = &page;
            s.spawn(move || {
                assert!(page.execute(&[Value::from(i)]).is_ok());
            });
        }
    });
    match page.variable("%seen").map(|v| v.value().clone()) {
        Some(Value::Table(entries)) => assert_eq!(entries.len(), 8),
        other => panic!("expected a table, got {:?}", other),
    }
}
