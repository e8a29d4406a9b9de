//! Tests for ghost-core: urls, messages, configuration, errors

use ghost_core::*;
use serde_json::json;

// ===========================================================================
// Url
// ===========================================================================

#[test]
fn url_equality_ignores_args() {
    let a = Url::stage("booking", "ask_date").with_arg("city", json!("Paris"));
    let b = Url::stage("booking", "ask_date");
    assert_eq!(a, b);
    assert_ne!(a, Url::stage("booking", "confirm"));
    assert_ne!(a, Url::stage("weather", "ask_date"));
}

#[test]
fn url_hash_matches_equality() {
    use std::collections::HashSet;
    let mut set = HashSet::new();
    set.insert(Url::stage("t", "s").with_arg("x", json!(1)));
    assert!(set.contains(&Url::stage("t", "s")));
    assert!(!set.contains(&Url::new("t")));
}

#[test]
fn url_parse_and_display() {
    let url = Url::parse("/child#confirm");
    assert_eq!(url.think, "/child");
    assert_eq!(url.stage, "confirm");
    assert_eq!(url.to_string(), "/child#confirm");

    let entry: Url = "/child".into();
    assert!(entry.is_entry());
    assert_eq!(entry.to_string(), "/child");
}

#[test]
fn url_to_stage_keeps_args() {
    let url = Url::new("t").with_arg("k", json!("v"));
    let moved = url.to_stage("next");
    assert_eq!(moved.stage, "next");
    assert_eq!(moved.arg("k"), Some(&json!("v")));
}

#[test]
fn url_serde_skips_empty_fields() {
    let json = serde_json::to_string(&Url::new("main")).unwrap();
    assert_eq!(json, r#"{"think":"main"}"#);
    let back: Url = serde_json::from_str(r#"{"think":"main","stage":"s","args":{"a":1}}"#).unwrap();
    assert_eq!(back.stage, "s");
    assert_eq!(back.arg("a"), Some(&json!(1)));
}

// ===========================================================================
// Message / Input / Output
// ===========================================================================

#[test]
fn message_serializes_with_type_tag() {
    let json = serde_json::to_value(Message::text("hi")).unwrap();
    assert_eq!(json, json!({"type": "text", "text": "hi"}));

    let tasked = Message::tasked("abc", Url::new("reminder"));
    let json = serde_json::to_value(&tasked).unwrap();
    assert_eq!(json["type"], "tasked");
    assert_eq!(json["tid"], "abc");
    let back: Message = serde_json::from_value(json).unwrap();
    assert_eq!(back, tasked);
}

#[test]
fn message_accessors() {
    assert_eq!(Message::text("x").as_text(), Some("x"));
    assert!(Message::json(json!({})).as_text().is_none());
    assert!(Message::error("busy", "wait").is_error());
}

#[test]
fn input_text_constructor() {
    let input = Input::text("S1", "hi");
    assert_eq!(input.session_id(), "S1");
    assert_eq!(input.text_payload(), Some("hi"));
    assert!(!input.is_async);
    assert!(input.url.is_none());
    assert!(!input.mid.is_empty());
}

#[test]
fn input_ids_are_unique() {
    let a = Input::text("S1", "a");
    let b = Input::text("S1", "b");
    assert_ne!(a.mid, b.mid);
}

#[test]
fn input_builders() {
    let input = Input::text("S1", "go").with_url("/second").as_async();
    assert!(input.is_async);
    assert_eq!(input.url.unwrap().think, "/second");
}

#[test]
fn output_reply_inherits_trace_and_async_flag() {
    let input = Input::text("S9", "hello").as_async();
    let output = Output::reply(&input, Message::text("busy"));
    assert_eq!(output.trace.session_id, "S9");
    assert!(output.is_async);
    assert!(output.tid.is_none());
    assert_eq!(output.text(), "busy");
}

#[test]
fn output_text_joins_text_messages_only() {
    let mut output = Output::new("m1", Trace::new("S"), Some("t1".into()));
    output.push(Message::text("a"));
    output.push(Message::json(json!(1)));
    output.push(Message::text("b"));
    assert_eq!(output.text(), "a\nb");
}

// ===========================================================================
// GhostConfig
// ===========================================================================

#[test]
fn config_defaults() {
    let config = GhostConfig::default();
    assert_eq!(config.process_max_tasks, 20);
    assert_eq!(config.process_lock_overdue, 30);
    assert_eq!(config.operator_depth_cap, 100);
    assert_eq!(config.root_url, Url::new("main"));
}

#[test]
fn config_partial_toml_uses_defaults() {
    let config = GhostConfig::from_toml(
        r#"
process_max_tasks = 3
on_busy = "hold on"

[root_url]
think = "/root"
"#,
    )
    .unwrap();
    assert_eq!(config.process_max_tasks, 3);
    assert_eq!(config.on_busy, "hold on");
    assert_eq!(config.root_url.think, "/root");
    assert_eq!(config.process_lock_overdue, 30);
}

#[test]
fn config_load_missing_file_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let config = GhostConfig::load(&dir.path().join("absent.toml"));
    assert_eq!(config.process_max_tasks, 20);
}

#[test]
fn config_load_invalid_file_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ghost.toml");
    std::fs::write(&path, "process_max_tasks = \"many\"").unwrap();
    let config = GhostConfig::load(&path);
    assert_eq!(config.process_max_tasks, 20);
}

#[test]
fn config_toml_roundtrip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ghost.toml");
    let mut config = GhostConfig::default();
    config.session_overdue = 42;
    std::fs::write(&path, config.to_toml()).unwrap();
    let loaded = GhostConfig::load(&path);
    assert_eq!(loaded.session_overdue, 42);
}

// ===========================================================================
// Error
// ===========================================================================

#[test]
fn error_kinds_and_fatality() {
    assert_eq!(Error::busy("S").kind(), ErrorKind::Busy);
    assert_eq!(Error::OperatorDepthExceeded { limit: 5 }.kind(), ErrorKind::Logic);
    assert_eq!(Error::logic("x").kind(), ErrorKind::Logic);
    assert!(!Error::stage("t", "s", "boom").is_fatal());
    assert!(!Error::think_not_found("ghost").is_fatal());
    assert!(Error::bootstrap("no cache").is_fatal());
    assert!(Error::cache("down").is_fatal());
}

#[test]
fn error_display() {
    assert_eq!(
        Error::stage_not_found("t", "s").to_string(),
        "mindset not found: t#s"
    );
    assert_eq!(Error::think_not_found("t").to_string(), "mindset not found: t");
    assert_eq!(
        Error::stage("t", "s", "boom").to_string(),
        "stage error: t#s - boom"
    );
}

#[test]
fn error_traceback_follows_sources() {
    let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
    let err = Error::from(io);
    let frames = err.traceback(8);
    assert_eq!(frames[0], "io error: disk gone");
    assert!(err.traceback(1).len() == 1);
}
