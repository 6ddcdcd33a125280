use mendbot_agent::event::{looks_like_usage_limit, parse_stream};

// ── parse_stream ─────────────────────────────────────────────────────────

#[test]
fn result_event_wins_over_assistant_text() {
    let stream = concat!(
        r#"{"type":"system","subtype":"init","session_id":"sid-1"}"#,
        "\n",
        r#"{"type":"assistant","message":{"content":[{"type":"text","text":"thinking out loud"}]}}"#,
        "\n",
        r#"{"type":"result","subtype":"success","result":"Fixed in abc123.","session_id":"sid-1","is_error":false}"#,
        "\n",
    );
    let summary = parse_stream(stream);
    assert_eq!(summary.text, "Fixed in abc123.");
    assert_eq!(summary.session_id.as_deref(), Some("sid-1"));
    assert!(!summary.is_error);
}

#[test]
fn assistant_text_stands_in_when_result_is_empty() {
    let stream = concat!(
        r#"{"type":"assistant","message":{"content":[{"type":"text","text":"first turn"}]}}"#,
        "\n",
        r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"bash","input":{}}]}}"#,
        "\n",
        r#"{"type":"assistant","message":{"content":[{"type":"text","text":"second turn"}]}}"#,
        "\n",
        r#"{"type":"result","subtype":"success","session_id":"sid-2"}"#,
        "\n",
    );
    let summary = parse_stream(stream);
    assert_eq!(summary.text, "first turn\nsecond turn");
    assert_eq!(summary.session_id.as_deref(), Some("sid-2"));
}

#[test]
fn session_id_comes_from_the_system_event_alone() {
    let stream = r#"{"type":"system","subtype":"init","session_id":"sid-3"}"#;
    let summary = parse_stream(stream);
    assert_eq!(summary.session_id.as_deref(), Some("sid-3"));
    assert!(summary.text.is_empty());
}

#[test]
fn result_session_id_overrides_system() {
    let stream = concat!(
        r#"{"type":"system","subtype":"init","session_id":"old"}"#,
        "\n",
        r#"{"type":"result","subtype":"success","result":"ok","session_id":"new"}"#,
    );
    let summary = parse_stream(stream);
    assert_eq!(summary.session_id.as_deref(), Some("new"));
}

#[test]
fn error_flag_is_set_by_is_error() {
    let stream =
        r#"{"type":"result","subtype":"success","result":"partial","is_error":true}"#;
    assert!(parse_stream(stream).is_error);
}

#[test]
fn error_flag_is_set_by_error_subtype() {
    let stream = r#"{"type":"result","subtype":"error_max_turns","result":null}"#;
    assert!(parse_stream(stream).is_error);
}

#[test]
fn malformed_and_unknown_lines_are_skipped() {
    let stream = concat!(
        "not json at all\n",
        r#"{"type":"user","message":{}}"#,
        "\n",
        "{\"type\":\n",
        r#"{"type":"result","subtype":"success","result":"still parsed"}"#,
        "\n",
    );
    let summary = parse_stream(stream);
    assert_eq!(summary.text, "still parsed");
    assert!(!summary.is_error);
}

#[test]
fn empty_stream_yields_defaults() {
    let summary = parse_stream("");
    assert!(summary.text.is_empty());
    assert!(summary.session_id.is_none());
    assert!(!summary.is_error);
}

// ── looks_like_usage_limit ───────────────────────────────────────────────

#[test]
fn usage_limit_phrasings_are_recognised() {
    assert!(looks_like_usage_limit(
        "Claude AI usage limit reached|1735689600"
    ));
    assert!(looks_like_usage_limit("Rate limit exceeded, retry later"));
    assert!(looks_like_usage_limit("openai: quota exceeded for project"));
    assert!(looks_like_usage_limit("HTTP 429 Too Many Requests"));
}

#[test]
fn ordinary_failures_are_not_usage_limits() {
    assert!(!looks_like_usage_limit("compilation failed: missing semicolon"));
    assert!(!looks_like_usage_limit("network timeout talking to github"));
    assert!(!looks_like_usage_limit(""));
}
