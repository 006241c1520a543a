// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn params() -> LogStreamParams {
    LogStreamParams {
        ws_url: "wss://node1.ingress.example".into(),
        job: JobAddress::new("J1"),
        auth_header: "J1:sigbytes".into(),
        signer_address: "addr1".into(),
    }
}

#[test]
fn node_urls_follow_ingress_scheme() {
    let client = NodeClient::new("ingress.example").unwrap();
    assert_eq!(
        client.job_definition_url("node1", &JobAddress::new("J1")),
        "https://node1.ingress.example/job/J1/job-definition"
    );
    assert_eq!(client.ws_url("node1"), "wss://node1.ingress.example");
}

#[test]
fn subscribe_frame_carries_auth_and_address() {
    let frame: serde_json::Value =
        serde_json::from_str(&subscribe_frame(&params())).unwrap();
    assert_eq!(frame["path"], "/log");
    assert_eq!(frame["body"]["jobAddress"], "J1");
    assert_eq!(frame["body"]["address"], "addr1");
    assert_eq!(frame["header"], "J1:sigbytes");
}

#[parameterized(
    log_field = { r#"{"log": "hello"}"#, Some("hello") },
    typed_frame = { r#"{"type": "log", "data": "line"}"#, Some("line") },
    other_type = { r#"{"type": "status", "data": "x"}"#, None },
    not_json = { "plain text", None },
    no_payload = { r#"{"type": "log"}"#, None },
)]
fn log_frame_parsing(input: &str, expected: Option<&str>) {
    assert_eq!(parse_log_frame(input).as_deref(), expected);
}

#[test]
fn structured_log_payloads_are_stringified() {
    let line = parse_log_frame(r#"{"log": {"level": "info", "msg": "up"}}"#).unwrap();
    assert!(line.contains("\"msg\""));
}

#[parameterized(
    normal_close = { Some(1000), false },
    no_status = { Some(1005), false },
    abnormal = { Some(1006), true },
    going_away = { Some(1001), true },
    missing_frame = { None, true },
)]
fn reconnect_decision(code: Option<u16>, expect_reconnect: bool) {
    assert_eq!(should_reconnect(code), expect_reconnect);
}
