//! Tests for frame decoding, stream assembly, and message log guards.

use policy_pilot_client::{
    ChatTurn, LogError, LogMutation, MessageLog, ProtocolError, ServerFrame, StreamAssembler,
};

// ── Frame decoding ──────────────────────────────────────────────────────

#[test]
fn decodes_all_frame_kinds() {
    assert_eq!(
        ServerFrame::decode(r#"{"type":"start"}"#).unwrap(),
        ServerFrame::Start
    );
    assert_eq!(
        ServerFrame::decode(r#"{"type":"token","content":"Your "}"#).unwrap(),
        ServerFrame::Token("Your ".into())
    );
    assert_eq!(
        ServerFrame::decode(r#"{"type":"end"}"#).unwrap(),
        ServerFrame::End
    );
    assert_eq!(
        ServerFrame::decode(r#"{"type":"error","content":"no index"}"#).unwrap(),
        ServerFrame::Error("no index".into())
    );
}

#[test]
fn rejects_malformed_frames() {
    assert!(matches!(
        ServerFrame::decode("not json"),
        Err(ProtocolError::Json(_))
    ));
    assert!(matches!(
        ServerFrame::decode(r#"{"content":"x"}"#),
        Err(ProtocolError::MissingType)
    ));
    match ServerFrame::decode(r#"{"type":"status"}"#) {
        Err(ProtocolError::UnknownType(t)) => assert_eq!(t, "status"),
        other => panic!("expected UnknownType, got {:?}", other),
    }
    // A token frame without its content field is malformed, not empty.
    assert!(matches!(
        ServerFrame::decode(r#"{"type":"token"}"#),
        Err(ProtocolError::Json(_))
    ));
}

// ── Stream assembly ─────────────────────────────────────────────────────

#[test]
fn token_sequence_accumulates_in_order() {
    let mut assembler = StreamAssembler::new();
    assert_eq!(
        assembler.handle(ServerFrame::Start),
        Some(LogMutation::OpenAssistantTurn)
    );
    assert!(assembler.is_streaming());
    assert_eq!(
        assembler.handle(ServerFrame::Token("Your ".into())),
        Some(LogMutation::ReplaceLast("Your ".into()))
    );
    assert_eq!(
        assembler.handle(ServerFrame::Token("plan covers dental.".into())),
        Some(LogMutation::ReplaceLast("Your plan covers dental.".into()))
    );
    assert_eq!(assembler.handle(ServerFrame::End), None);
    assert!(!assembler.is_streaming());
}

#[test]
fn second_start_is_ignored_while_streaming() {
    let mut assembler = StreamAssembler::new();
    assembler.handle(ServerFrame::Start);
    assembler.handle(ServerFrame::Token("abc".into()));
    // The violating start must not reset the buffer.
    assert_eq!(assembler.handle(ServerFrame::Start), None);
    assert_eq!(
        assembler.handle(ServerFrame::Token("def".into())),
        Some(LogMutation::ReplaceLast("abcdef".into()))
    );
}

#[test]
fn token_and_end_with_no_open_stream_are_ignored() {
    let mut assembler = StreamAssembler::new();
    assert_eq!(assembler.handle(ServerFrame::Token("stray".into())), None);
    assert_eq!(assembler.handle(ServerFrame::End), None);
    assert!(!assembler.is_streaming());
}

#[test]
fn error_closes_stream_from_any_state() {
    let mut assembler = StreamAssembler::new();
    assembler.handle(ServerFrame::Start);
    assert_eq!(
        assembler.handle(ServerFrame::Error("boom".into())),
        Some(LogMutation::AppendErrorTurn("boom".into()))
    );
    assert!(!assembler.is_streaming());

    // Even with no open stream, error still surfaces and leaves us idle.
    assert_eq!(
        assembler.handle(ServerFrame::Error("cold".into())),
        Some(LogMutation::AppendErrorTurn("cold".into()))
    );
    assert!(!assembler.is_streaming());
}

#[test]
fn fresh_stream_starts_with_an_empty_buffer() {
    let mut assembler = StreamAssembler::new();
    assembler.handle(ServerFrame::Start);
    assembler.handle(ServerFrame::Token("first answer".into()));
    assembler.handle(ServerFrame::End);

    assembler.handle(ServerFrame::Start);
    assert_eq!(
        assembler.handle(ServerFrame::Token("second".into())),
        Some(LogMutation::ReplaceLast("second".into()))
    );
}

#[test]
fn abandon_forces_idle_without_a_mutation() {
    let mut assembler = StreamAssembler::new();
    assembler.handle(ServerFrame::Start);
    assembler.handle(ServerFrame::Token("partial".into()));
    assembler.abandon();
    assert!(!assembler.is_streaming());
}

// ── Message log ─────────────────────────────────────────────────────────

#[test]
fn log_preserves_insertion_order() {
    let mut log = MessageLog::new();
    log.append(ChatTurn::user("What is covered?"));
    log.append(ChatTurn::assistant(""));
    log.replace_last("Your plan covers dental.".into()).unwrap();
    let snapshot = log.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0], ChatTurn::user("What is covered?"));
    assert_eq!(snapshot[1], ChatTurn::assistant("Your plan covers dental."));
}

#[test]
fn replace_last_requires_a_trailing_assistant_turn() {
    let mut log = MessageLog::new();
    assert_eq!(log.replace_last("x".into()), Err(LogError::Empty));

    log.append(ChatTurn::user("hi"));
    assert_eq!(log.replace_last("x".into()), Err(LogError::LastNotAssistant));

    log.append(ChatTurn::assistant("draft"));
    log.append(ChatTurn::error("boom"));
    assert_eq!(log.replace_last("x".into()), Err(LogError::LastNotAssistant));
    // Failed replacements mutate nothing.
    assert_eq!(log.snapshot()[1], ChatTurn::assistant("draft"));
}

#[test]
fn snapshot_is_a_detached_copy() {
    let mut log = MessageLog::new();
    log.append(ChatTurn::user("q"));
    let before = log.snapshot();
    log.append(ChatTurn::assistant("a"));
    assert_eq!(before.len(), 1);
    assert_eq!(log.len(), 2);
}
