// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn bare_object_extracts_whole() {
    assert_eq!(extract_json(r#"{"a": 1}"#).unwrap(), r#"{"a": 1}"#);
}

#[test]
fn prose_before_and_after_is_discarded() {
    let raw = "Thinking...\nHere is the plan:\n{\"tasks\": []}\nDone, let me know!";
    assert_eq!(extract_json(raw).unwrap(), "{\"tasks\": []}");
}

#[test]
fn nested_objects_balance() {
    let raw = r#"x {"a": {"b": {"c": 1}}} y"#;
    assert_eq!(extract_json(raw).unwrap(), r#"{"a": {"b": {"c": 1}}}"#);
}

#[test]
fn braces_inside_strings_are_ignored() {
    let raw = r#"note {"summary": "use {braces} wisely", "n": 1} end"#;
    assert_eq!(
        extract_json(raw).unwrap(),
        r#"{"summary": "use {braces} wisely", "n": 1}"#
    );
}

#[test]
fn escaped_quotes_inside_strings() {
    let raw = r#"{"s": "he said \"hi {\" ok"}"#;
    assert_eq!(extract_json(raw).unwrap(), raw);
}

#[test]
fn outermost_object_wins_over_later_ones() {
    let raw = r#"{"first": 1} {"second": 2}"#;
    assert_eq!(extract_json(raw).unwrap(), r#"{"first": 1}"#);
}

#[test]
fn no_object_is_an_error() {
    assert!(matches!(extract_json("just prose"), Err(PlanError::NoJson)));
    assert!(matches!(extract_json(""), Err(PlanError::NoJson)));
}

#[test]
fn unterminated_object_is_an_error() {
    assert!(matches!(extract_json(r#"{"a": {"b": 1}"#), Err(PlanError::Unbalanced)));
}
