//! Payload tests for trigger expressions
//!
//! Exercises the full path an authored routine takes: JSON token array in,
//! compiled AST out, evaluated against fact snapshots.

use chrono::{Local, NaiveDate, NaiveTime, TimeZone};
use routine_core::{ControlEvent, FactSnapshot, FixedAstro, NumericLiteral};
use routine_expr::{compile, CompileError, Evaluator, ExprToken};
use serde_json::json;

fn parse(tokens: serde_json::Value) -> Vec<ExprToken> {
    serde_json::from_value(tokens).unwrap()
}

fn astro() -> FixedAstro {
    FixedAstro::new(
        NaiveTime::from_hms_opt(6, 30, 0).unwrap(),
        NaiveTime::from_hms_opt(19, 45, 0).unwrap(),
    )
}

// ============================================================================
// Expression payloads
// ============================================================================

#[test]
fn test_state_and_state_payload() {
    let tokens = parse(json!([
        {"kind": "state", "device": "thermostat_1", "property": "ST",
         "op": ">", "value": 75.0, "uom": 17, "precision": 1},
        {"kind": "and"},
        {"kind": "state", "device": "pool_pump", "property": "ST",
         "op": "==", "value": 0.0, "uom": 25}
    ]));

    let ast = compile(&tokens).unwrap();
    let evaluator = Evaluator::new();

    let both = FactSnapshot::new(Local::now())
        .with_property("thermostat_1", "ST", 80.0)
        .with_property("pool_pump", "ST", 0.0);
    assert!(evaluator.evaluate(&ast, &both, &astro()).result);

    let pump_on = FactSnapshot::new(Local::now())
        .with_property("thermostat_1", "ST", 80.0)
        .with_property("pool_pump", "ST", 1.0);
    assert!(!evaluator.evaluate(&ast, &pump_on, &astro()).result);
}

#[test]
fn test_parenthesized_mixed_operators_payload() {
    let tokens = parse(json!([
        {"kind": "lparen"},
        {"kind": "state", "device": "a", "property": "ST", "op": "==", "value": 1.0, "uom": 25},
        {"kind": "or"},
        {"kind": "state", "device": "b", "property": "ST", "op": "==", "value": 1.0, "uom": 25},
        {"kind": "rparen"},
        {"kind": "and"},
        {"kind": "state", "device": "c", "property": "ST", "op": "==", "value": 1.0, "uom": 25}
    ]));

    let ast = compile(&tokens).unwrap();
    let evaluator = Evaluator::new();

    let snap = FactSnapshot::new(Local::now())
        .with_property("a", "ST", 0.0)
        .with_property("b", "ST", 1.0)
        .with_property("c", "ST", 1.0);
    assert!(evaluator.evaluate(&ast, &snap, &astro()).result);

    let snap = snap.with_property("c", "ST", 0.0);
    assert!(!evaluator.evaluate(&ast, &snap, &astro()).result);
}

#[test]
fn test_unparenthesized_mixed_operators_rejected() {
    let tokens = parse(json!([
        {"kind": "state", "device": "a", "property": "ST", "op": "==", "value": 1.0, "uom": 25},
        {"kind": "and"},
        {"kind": "state", "device": "b", "property": "ST", "op": "==", "value": 1.0, "uom": 25},
        {"kind": "or"},
        {"kind": "state", "device": "c", "property": "ST", "op": "==", "value": 1.0, "uom": 25}
    ]));

    assert!(matches!(
        compile(&tokens),
        Err(CompileError::MixedOperators(_))
    ));
}

#[test]
fn test_control_and_schedule_payload() {
    // Keypad press during the evening window
    let tokens = parse(json!([
        {"kind": "control", "device": "keypad_3", "equality": "is",
         "command": "DON", "parameters": []},
        {"kind": "and"},
        {"kind": "schedule",
         "weekly": {"days": "mon,tue,wed,thu,fri,sat,sun",
                    "from": {"time": "18:00"},
                    "to": {"time": "23:00", "day": 0}}}
    ]));

    let ast = compile(&tokens).unwrap();
    let evaluator = Evaluator::new();

    let evening = Local
        .from_local_datetime(
            &NaiveDate::from_ymd_opt(2026, 8, 31)
                .unwrap()
                .and_hms_opt(20, 0, 0)
                .unwrap(),
        )
        .unwrap();

    let pressed = FactSnapshot::new(evening)
        .with_control_event(ControlEvent::new("keypad_3", "DON"));
    assert!(evaluator.evaluate(&ast, &pressed, &astro()).result);

    // Same press at noon falls outside the window
    let noon = Local
        .from_local_datetime(
            &NaiveDate::from_ymd_opt(2026, 8, 31)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        )
        .unwrap();
    let pressed = FactSnapshot::new(noon)
        .with_control_event(ControlEvent::new("keypad_3", "DON"));
    assert!(!evaluator.evaluate(&ast, &pressed, &astro()).result);
}

#[test]
fn test_control_parameters_payload() {
    let tokens = parse(json!([
        {"kind": "control", "device": "keypad_3", "equality": "is",
         "command": "DON",
         "parameters": [{"id": "level", "value": 100.0, "uom": 51}]}
    ]));

    let ast = compile(&tokens).unwrap();
    let evaluator = Evaluator::new();

    let full = FactSnapshot::new(Local::now()).with_control_event(
        ControlEvent::new("keypad_3", "DON")
            .with_parameter("level", NumericLiteral::new(100.0, 51)),
    );
    assert!(evaluator.evaluate(&ast, &full, &astro()).result);

    let dimmed = FactSnapshot::new(Local::now()).with_control_event(
        ControlEvent::new("keypad_3", "DON")
            .with_parameter("level", NumericLiteral::new(40.0, 51)),
    );
    assert!(!evaluator.evaluate(&ast, &dimmed, &astro()).result);
}

// ============================================================================
// Schedule payloads
// ============================================================================

#[test]
fn test_weekly_window_payload() {
    // Monday 15:00 to 18:00: true at 16:00, false at 19:00 and on Tuesday
    let tokens = parse(json!([
        {"kind": "schedule",
         "weekly": {"days": "mon",
                    "from": {"time": "15:00"},
                    "to": {"time": "18:00", "day": 0}}}
    ]));

    let ast = compile(&tokens).unwrap();
    let evaluator = Evaluator::new();

    let at = |date: (i32, u32, u32), h: u32, m: u32| {
        Local
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(date.0, date.1, date.2)
                    .unwrap()
                    .and_hms_opt(h, m, 0)
                    .unwrap(),
            )
            .unwrap()
    };

    // 2026-08-31 is a Monday
    let monday = (2026, 8, 31);
    let tuesday = (2026, 9, 1);

    assert!(
        evaluator
            .evaluate(&ast, &FactSnapshot::new(at(monday, 16, 0)), &astro())
            .result
    );
    assert!(
        !evaluator
            .evaluate(&ast, &FactSnapshot::new(at(monday, 19, 0)), &astro())
            .result
    );
    assert!(
        !evaluator
            .evaluate(&ast, &FactSnapshot::new(at(tuesday, 16, 0)), &astro())
            .result
    );
}

#[test]
fn test_sunset_offset_payload() {
    // Half an hour before sunset (19:45) through 23:00
    let tokens = parse(json!([
        {"kind": "schedule",
         "weekly": {"days": "mon,tue,wed,thu,fri,sat,sun",
                    "from": {"sunset": -1800},
                    "to": {"time": "23:00", "day": 0}}}
    ]));

    let ast = compile(&tokens).unwrap();
    let evaluator = Evaluator::new();

    let at = |h: u32, m: u32| {
        Local
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(2026, 8, 31)
                    .unwrap()
                    .and_hms_opt(h, m, 0)
                    .unwrap(),
            )
            .unwrap()
    };

    assert!(
        !evaluator
            .evaluate(&ast, &FactSnapshot::new(at(19, 0)), &astro())
            .result
    );
    assert!(
        evaluator
            .evaluate(&ast, &FactSnapshot::new(at(19, 30)), &astro())
            .result
    );
    assert!(
        evaluator
            .evaluate(&ast, &FactSnapshot::new(at(22, 0)), &astro())
            .result
    );
    assert!(
        !evaluator
            .evaluate(&ast, &FactSnapshot::new(at(23, 30)), &astro())
            .result
    );
}

// ============================================================================
// Structural errors
// ============================================================================

#[test]
fn test_structural_errors_from_payloads() {
    let dangling = parse(json!([
        {"kind": "state", "device": "a", "property": "ST", "op": "==", "value": 1.0, "uom": 25},
        {"kind": "and"}
    ]));
    assert!(matches!(
        compile(&dangling),
        Err(CompileError::DanglingOperator(1))
    ));

    let unbalanced = parse(json!([
        {"kind": "lparen"},
        {"kind": "state", "device": "a", "property": "ST", "op": "==", "value": 1.0, "uom": 25}
    ]));
    assert!(matches!(
        compile(&unbalanced),
        Err(CompileError::UnbalancedParens)
    ));

    let adjacent = parse(json!([
        {"kind": "state", "device": "a", "property": "ST", "op": "==", "value": 1.0, "uom": 25},
        {"kind": "state", "device": "b", "property": "ST", "op": "==", "value": 1.0, "uom": 25}
    ]));
    assert!(matches!(
        compile(&adjacent),
        Err(CompileError::AdjacentSubexpressions(1))
    ));
}
