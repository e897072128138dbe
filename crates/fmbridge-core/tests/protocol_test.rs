use fmbridge_core::{
    channel, Event, HandlerRegistry, ProtocolError, ReadyInfo, Request, Response, ResponseKind,
    VersionInfo,
};
use fmbridge_ports::types::BankId;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn version(tag: &str) -> Response {
    Response::GetVersion(VersionInfo {
        bridge: "0.1.0".to_string(),
        engine: tag.to_string(),
        emulator: "Nuked OPL3 (v 1.8)".to_string(),
    })
}

#[test]
fn registry_fires_oldest_handler_once() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut registry: HandlerRegistry<ResponseKind, u32> = HandlerRegistry::new();

    for name in ["first", "second"] {
        let seen = seen.clone();
        registry.once(ResponseKind::SetBank, move |value| {
            seen.lock().push(format!("{name}:{value}"));
        });
    }
    assert_eq!(registry.pending(ResponseKind::SetBank), 2);

    assert_eq!(registry.fire(ResponseKind::SetBank, 1), Ok(()));
    assert_eq!(registry.fire(ResponseKind::SetBank, 2), Ok(()));
    assert_eq!(registry.fire(ResponseKind::SetBank, 3), Err(3));

    assert_eq!(*seen.lock(), vec!["first:1", "second:2"]);
    assert!(registry.is_empty());
}

#[test]
fn registry_cancel_removes_only_that_handler() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut registry: HandlerRegistry<ResponseKind, u32> = HandlerRegistry::new();

    let early = {
        let seen = seen.clone();
        registry.once(ResponseKind::LoadBank, move |v| seen.lock().push(v))
    };
    {
        let seen = seen.clone();
        registry.once(ResponseKind::LoadBank, move |v| seen.lock().push(v * 10));
    }

    assert!(registry.cancel(ResponseKind::LoadBank, early));
    assert!(!registry.cancel(ResponseKind::LoadBank, early));
    assert_eq!(registry.fire(ResponseKind::LoadBank, 4), Ok(()));
    assert_eq!(*seen.lock(), vec![40]);
}

#[test]
fn set_bank_request_round_trip() {
    let (mut client, mut link) = channel(8, 8);

    let reply = client.set_bank(72).expect("queued");
    assert_eq!(link.pop_request(), Some(Request::SetBank { bank: 72 }));
    assert!(!reply.is_settled());

    link.push_response(Response::SetBank {
        success: true,
        bank: 72,
        error: None,
    })
    .expect("room for response");
    assert_eq!(client.poll(), 1);

    assert_eq!(reply.try_take(), Some(Ok(72)));
    assert_eq!(reply.try_take(), None);
}

#[test]
fn failed_command_is_rejected_with_engine_message() {
    let (mut client, mut link) = channel(8, 8);
    let reply = client
        .get_instrument(BankId::melodic(3, 0), 5)
        .expect("queued");
    link.pop_request();

    link.push_response(Response::GetInstrument {
        success: false,
        bank_id: BankId::melodic(3, 0),
        program: 5,
        instrument: None,
        error: Some("bank not found".to_string()),
    })
    .expect("room");
    client.poll();

    assert_eq!(
        reply.try_take(),
        Some(Err(ProtocolError::Rejected("bank not found".to_string())))
    );
}

#[test]
fn same_kind_requests_resolve_in_order() {
    let (mut client, mut link) = channel(8, 8);
    let first = client.query_version().expect("queued");
    let second = client.query_version().expect("queued");

    link.push_response(version("one")).expect("room");
    link.push_response(version("two")).expect("room");
    client.poll();

    let first = first.try_take().expect("settled").expect("ok");
    let second = second.try_take().expect("settled").expect("ok");
    assert_eq!(first.engine, "one");
    assert_eq!(second.engine, "two");
}

#[test]
fn orphaned_response_is_dropped() {
    let (mut client, mut link) = channel(8, 8);
    link.push_response(version("stray")).expect("room");

    assert_eq!(client.poll(), 1);
    assert!(client.drain_events().is_empty());

    let reply = client.query_version().expect("queued");
    link.push_response(version("answer")).expect("room");
    client.poll();
    assert_eq!(reply.try_take().expect("settled").expect("ok").engine, "answer");
}

#[test]
fn full_command_queue_withdraws_the_handler() {
    let (mut client, mut link) = channel(1, 8);
    client.send(Request::Panic).expect("first fits");

    let err = client.set_bank(1).err();
    assert_eq!(err, Some(ProtocolError::QueueFull));

    assert_eq!(link.pop_request(), Some(Request::Panic));
    let reply = client.set_bank(5).expect("queued");
    link.push_response(Response::SetBank {
        success: true,
        bank: 5,
        error: None,
    })
    .expect("room");
    client.poll();
    assert_eq!(reply.try_take(), Some(Ok(5)));
}

#[test]
fn fire_and_forget_requests_have_no_reply() {
    let (mut client, _link) = channel(8, 8);
    let err = client.request(Request::Play, |_| Ok(())).err();
    assert_eq!(err, Some(ProtocolError::NoResponseExpected("Play")));
}

#[test]
fn send_fails_once_render_side_is_gone() {
    let (mut client, link) = channel(8, 8);
    drop(link);
    assert_eq!(client.send(Request::Panic), Err(ProtocolError::Disconnected));
}

#[test]
fn init_resolves_on_ready() {
    let (mut client, mut link) = channel(8, 8);
    let reply = client.begin_init(Duration::from_secs(10)).expect("armed");
    assert!(client.init_pending());

    let info = ReadyInfo {
        sample_rate_hz: 44_100,
        engine_version: "mock-1.0".to_string(),
    };
    link.push_response(Response::Ready(info.clone())).expect("room");
    client.poll();

    assert_eq!(reply.try_take(), Some(Ok(info)));
    assert!(!client.init_pending());
}

#[test]
fn init_error_rejects_handshake() {
    let (mut client, mut link) = channel(8, 8);
    let reply = client.begin_init(Duration::from_secs(10)).expect("armed");

    link.push_response(Response::Error {
        message: "engine returned no handle for 44100 Hz".to_string(),
    })
    .expect("room");
    client.poll();

    assert_eq!(
        reply.try_take(),
        Some(Err(ProtocolError::InitFailed(
            "engine returned no handle for 44100 Hz".to_string()
        )))
    );
    assert!(!client.init_pending());
}

#[test]
fn late_ready_after_timeout_has_no_effect() {
    let (mut client, mut link) = channel(8, 8);
    let reply = client.begin_init(Duration::ZERO).expect("armed");

    client.poll();
    assert!(reply.is_settled());
    assert!(!client.init_pending());

    link.push_response(Response::Ready(ReadyInfo {
        sample_rate_hz: 44_100,
        engine_version: "late".to_string(),
    }))
    .expect("room");
    client.poll();

    assert_eq!(
        reply.try_take(),
        Some(Err(ProtocolError::InitTimeout(Duration::ZERO)))
    );
}

#[test]
fn ready_queued_after_deadline_without_polling_still_times_out() {
    let (mut client, mut link) = channel(8, 8);
    let reply = client.begin_init(Duration::from_millis(20)).expect("armed");

    std::thread::sleep(Duration::from_millis(60));
    link.push_response(Response::Ready(ReadyInfo {
        sample_rate_hz: 44_100,
        engine_version: "late".to_string(),
    }))
    .expect("room");
    client.poll();

    assert_eq!(
        reply.try_take(),
        Some(Err(ProtocolError::InitTimeout(Duration::from_millis(20))))
    );
    assert!(!client.init_pending());
}

#[test]
fn error_queued_after_deadline_without_polling_still_times_out() {
    let (mut client, mut link) = channel(8, 8);
    let reply = client.begin_init(Duration::from_millis(20)).expect("armed");

    std::thread::sleep(Duration::from_millis(60));
    link.push_response(Response::Error {
        message: "engine returned no handle for 44100 Hz".to_string(),
    })
    .expect("room");
    client.poll();

    assert_eq!(
        reply.try_take(),
        Some(Err(ProtocolError::InitTimeout(Duration::from_millis(20))))
    );
}

#[test]
fn ready_before_deadline_is_not_timed_out() {
    let (mut client, mut link) = channel(8, 8);
    let reply = client.begin_init(Duration::from_millis(50)).expect("armed");
    link.push_response(Response::Ready(ReadyInfo {
        sample_rate_hz: 48_000,
        engine_version: "mock-1.0".to_string(),
    }))
    .expect("room");
    client.poll();

    std::thread::sleep(Duration::from_millis(60));
    client.poll();
    assert!(matches!(reply.try_take(), Some(Ok(_))));
}

#[test]
fn second_handshake_while_pending_is_refused() {
    let (mut client, _link) = channel(8, 8);
    let _reply = client.begin_init(Duration::from_secs(10)).expect("armed");
    assert_eq!(
        client.begin_init(Duration::from_secs(10)).err(),
        Some(ProtocolError::InitInProgress)
    );
}

#[test]
fn notifications_become_events() {
    let (mut client, mut link) = channel(8, 8);
    link.push_response(Response::PlaybackEnded).expect("room");
    link.push_response(Response::Diagnostic {
        message: "render failed".to_string(),
    })
    .expect("room");
    client.poll();

    assert_eq!(
        client.drain_events(),
        vec![
            Event::PlaybackEnded,
            Event::Diagnostic {
                message: "render failed".to_string()
            },
        ]
    );
    assert!(client.drain_events().is_empty());
    assert_eq!(client.recent_diagnostics(), vec!["render failed"]);
}

#[test]
fn recent_diagnostics_keep_the_last_twenty() {
    let (mut client, mut link) = channel(8, 32);
    for i in 0..25 {
        link.push_response(Response::Diagnostic {
            message: format!("diag {i}"),
        })
        .expect("room");
    }
    client.poll();

    let recent = client.recent_diagnostics();
    assert_eq!(recent.len(), 20);
    assert_eq!(recent[0], "diag 5");
    assert_eq!(recent[19], "diag 24");
}

#[test]
fn wire_format_is_tagged() {
    let json = serde_json::to_value(Request::SetBank { bank: 72 }).expect("serialize");
    assert_eq!(
        json,
        serde_json::json!({ "type": "SetBank", "payload": { "bank": 72 } })
    );

    let json = serde_json::to_value(Request::Panic).expect("serialize");
    assert_eq!(json, serde_json::json!({ "type": "Panic" }));

    let json = serde_json::to_value(Response::LoadBank {
        success: false,
        error: Some("bad bank data".to_string()),
    })
    .expect("serialize");
    assert_eq!(
        json,
        serde_json::json!({
            "type": "LoadBank",
            "payload": { "success": false, "error": "bad bank data" }
        })
    );

    let parsed: Request =
        serde_json::from_str(r#"{"type":"Seek","payload":{"seconds":1.5}}"#).expect("parse");
    assert_eq!(parsed, Request::Seek { seconds: 1.5 });
}

#[test]
fn fire_and_forget_requests_expect_no_response() {
    assert_eq!(Request::Play.response_kind(), None);
    assert_eq!(
        Request::SetBank { bank: 1 }.response_kind(),
        Some(ResponseKind::SetBank)
    );
    assert!(ResponseKind::PlaybackEnded.is_notification());
    assert!(!ResponseKind::GetState.is_notification());
}
