//! Whole-session scenarios over the in-memory transport.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use nova_realtime::transport::memory::{self, RemoteEnd};
use nova_realtime::{
    ItemPayload, LpcmPassthrough, Session, SessionConfig, SessionError, SessionItem, SessionState,
    TextDelivery, ToolRegistry, TransportError,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;

type Items = mpsc::Receiver<Result<SessionItem, SessionError>>;

async fn start_session(config: SessionConfig) -> (Session, Items, RemoteEnd) {
    let (connector, remote) = memory::pair(256);
    let (session, items) = Session::start(
        &connector,
        config,
        ToolRegistry::new(),
        Arc::new(LpcmPassthrough::default()),
    )
    .await
    .expect("session start");
    (session, items, remote)
}

async fn next_frame(remote: &mut RemoteEnd) -> Value {
    let frame = timeout(Duration::from_secs(5), remote.recv_frame())
        .await
        .expect("timed out waiting for an outbound frame")
        .expect("outbound stream closed early");
    serde_json::from_slice(&frame).expect("outbound frame is not JSON")
}

async fn next_item(items: &mut Items) -> Result<SessionItem, SessionError> {
    timeout(Duration::from_secs(5), items.recv())
        .await
        .expect("timed out waiting for an item")
        .expect("item channel closed early")
}

fn event_kind(frame: &Value) -> String {
    frame["event"]
        .as_object()
        .expect("frame has no event object")
        .keys()
        .next()
        .expect("event object is empty")
        .clone()
}

/// Reads outbound frames until the session closes its sink.
async fn drain_frames(mut remote: RemoteEnd) -> Vec<Value> {
    let mut frames = Vec::new();
    loop {
        match timeout(Duration::from_secs(5), remote.recv_frame()).await {
            Ok(Some(frame)) => frames.push(serde_json::from_slice(&frame).unwrap()),
            Ok(None) => return frames,
            Err(_) => panic!("outbound sink never closed"),
        }
    }
}

#[tokio::test]
async fn start_then_end_produces_exactly_seven_envelopes() {
    let (session, _items, remote) = start_session(SessionConfig::default()).await;
    session.end_session().await.unwrap();

    let kinds: Vec<String> = drain_frames(remote).await.iter().map(event_kind).collect();
    assert_eq!(
        kinds,
        [
            "sessionStart",
            "promptStart",
            "contentStart",
            "textInput",
            "contentEnd",
            "promptEnd",
            "sessionEnd"
        ]
    );
}

#[tokio::test]
async fn init_sequence_frames_the_system_prompt() {
    let (session, _items, remote) = start_session(SessionConfig::default()).await;
    session.end_session().await.unwrap();

    let frames = drain_frames(remote).await;
    let content_start = &frames[2]["event"]["contentStart"];
    assert_eq!(content_start["type"], "TEXT");
    assert_eq!(content_start["interactive"], true);
    let text_input = &frames[3]["event"]["textInput"];
    assert_eq!(text_input["role"], "SYSTEM");
    assert_eq!(
        text_input["content"].as_str().unwrap(),
        nova_realtime::DEFAULT_SYSTEM_PROMPT
    );
    assert_eq!(
        text_input["contentName"],
        content_start["contentName"],
        "system prompt must flow inside its own content framing"
    );
    let prompt_name = frames[1]["event"]["promptStart"]["promptName"]
        .as_str()
        .unwrap();
    assert_eq!(frames[5]["event"]["promptEnd"]["promptName"], prompt_name);
}

#[tokio::test]
async fn audio_buffer_is_chunked_in_order_before_content_end() {
    let (session, _items, remote) = start_session(SessionConfig::default()).await;
    session.start_audio_content().await.unwrap();
    session.feed_audio(&[7u8; 3200]).await.unwrap();
    session.end_audio_content().await.unwrap();
    session.end_session().await.unwrap();

    let frames = drain_frames(remote).await;
    let kinds: Vec<String> = frames.iter().map(event_kind).collect();
    assert_eq!(
        kinds[5..],
        [
            "contentStart",
            "audioInput",
            "audioInput",
            "audioInput",
            "audioInput",
            "contentEnd",
            "promptEnd",
            "sessionEnd"
        ]
    );

    let audio_content = &frames[5]["event"]["contentStart"];
    assert_eq!(audio_content["type"], "AUDIO");
    assert_eq!(
        audio_content["audioInputConfiguration"]["sampleRateHertz"],
        16000
    );
    let sizes: Vec<usize> = frames[6..10]
        .iter()
        .map(|frame| {
            base64::engine::general_purpose::STANDARD
                .decode(frame["event"]["audioInput"]["content"].as_str().unwrap())
                .unwrap()
                .len()
        })
        .collect();
    assert_eq!(sizes, [1024, 1024, 1024, 128]);
    assert_eq!(
        frames[10]["event"]["contentEnd"]["contentName"],
        audio_content["contentName"]
    );
}

#[tokio::test]
async fn end_session_is_idempotent() {
    let (session, _items, remote) = start_session(SessionConfig::default()).await;
    session.end_session().await.unwrap();
    session.end_session().await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);

    let kinds: Vec<String> = drain_frames(remote).await.iter().map(event_kind).collect();
    assert_eq!(kinds.iter().filter(|k| *k == "sessionEnd").count(), 1);
    assert_eq!(kinds.len(), 7);
}

#[tokio::test]
async fn illegal_calls_fail_fast_and_transmit_nothing() {
    let (session, _items, remote) = start_session(SessionConfig::default()).await;

    assert!(matches!(
        session.feed_audio(&[0u8; 16]).await,
        Err(SessionError::InvalidState { .. })
    ));
    assert!(matches!(
        session.end_audio_content().await,
        Err(SessionError::InvalidState { .. })
    ));

    session.start_audio_content().await.unwrap();
    assert!(matches!(
        session.start_audio_content().await,
        Err(SessionError::InvalidState { .. })
    ));

    session.end_session().await.unwrap();
    assert!(matches!(
        session.feed_audio(&[0u8; 16]).await,
        Err(SessionError::InvalidState { .. })
    ));

    let frames = drain_frames(remote).await;
    let kinds: Vec<String> = frames.iter().map(event_kind).collect();
    // Init, one audio contentStart, its close forced by session end, then
    // the end sequence. The rejected calls added nothing.
    assert_eq!(
        kinds[5..],
        ["contentStart", "contentEnd", "promptEnd", "sessionEnd"]
    );
}

#[tokio::test]
async fn interleaved_content_streams_assemble_independently() {
    let (session, mut items, remote) = start_session(SessionConfig::default()).await;

    remote
        .send_frame(&br#"{"event":{"contentStart":{"contentId":"c-1","type":"TEXT","role":"USER"}}}"#[..])
        .await;
    remote
        .send_frame(&br#"{"event":{"contentStart":{"contentId":"c-2","type":"TEXT","role":"ASSISTANT"}}}"#[..])
        .await;
    remote
        .send_frame(&br#"{"event":{"textOutput":{"contentId":"c-1","content":"knock ","role":"USER"}}}"#[..])
        .await;
    remote
        .send_frame(&br#"{"event":{"textOutput":{"contentId":"c-2","content":"who is ","role":"ASSISTANT"}}}"#[..])
        .await;
    remote
        .send_frame(&br#"{"event":{"textOutput":{"contentId":"c-1","content":"knock","role":"USER"}}}"#[..])
        .await;
    remote
        .send_frame(&br#"{"event":{"textOutput":{"contentId":"c-2","content":"there","role":"ASSISTANT"}}}"#[..])
        .await;
    remote
        .send_frame(&br#"{"event":{"contentEnd":{"contentId":"c-2"}}}"#[..])
        .await;
    remote
        .send_frame(&br#"{"event":{"contentEnd":{"contentId":"c-1"}}}"#[..])
        .await;

    let first = next_item(&mut items).await.unwrap();
    assert_eq!(first.content_id, "c-2");
    assert_eq!(first.payload, ItemPayload::Text("who is there".into()));
    let second = next_item(&mut items).await.unwrap();
    assert_eq!(second.content_id, "c-1");
    assert_eq!(second.payload, ItemPayload::Text("knock knock".into()));

    session.end_session().await.unwrap();
}

#[tokio::test]
async fn audio_output_accumulates_into_one_clip_with_duration() {
    let (session, mut items, remote) = start_session(SessionConfig::default()).await;

    // "AQIDBAUG" is [1,2,3,4,5,6]; the split boundary falls inside a
    // base64 group, so per-fragment decoding would fail.
    remote
        .send_frame(&br#"{"event":{"contentStart":{"contentId":"a-1","type":"AUDIO","role":"ASSISTANT"}}}"#[..])
        .await;
    remote
        .send_frame(&br#"{"event":{"audioOutput":{"contentId":"a-1","content":"AQID","role":"ASSISTANT"}}}"#[..])
        .await;
    remote
        .send_frame(&br#"{"event":{"audioOutput":{"contentId":"a-1","content":"BAUG","role":"ASSISTANT"}}}"#[..])
        .await;
    remote
        .send_frame(&br#"{"event":{"contentEnd":{"contentId":"a-1"}}}"#[..])
        .await;

    let item = next_item(&mut items).await.unwrap();
    assert_eq!(item.content_id, "a-1");
    match item.payload {
        ItemPayload::Audio {
            data,
            duration_secs,
        } => {
            assert_eq!(data, vec![1, 2, 3, 4, 5, 6]);
            assert!((duration_secs - 6.0 / 48_000.0).abs() < 1e-12);
        }
        other => panic!("expected audio payload, got {other:?}"),
    }

    session.end_session().await.unwrap();
}

#[tokio::test]
async fn incremental_text_delivery_forwards_each_delta() {
    let config = SessionConfig {
        text_delivery: TextDelivery::Incremental,
        ..SessionConfig::default()
    };
    let (session, mut items, remote) = start_session(config).await;

    remote
        .send_frame(&br#"{"event":{"contentStart":{"contentId":"c-1","type":"TEXT","role":"ASSISTANT"}}}"#[..])
        .await;
    remote
        .send_frame(&br#"{"event":{"textOutput":{"contentId":"c-1","content":"first","role":"ASSISTANT"}}}"#[..])
        .await;
    remote
        .send_frame(&br#"{"event":{"textOutput":{"contentId":"c-1","content":"second","role":"ASSISTANT"}}}"#[..])
        .await;
    remote
        .send_frame(&br#"{"event":{"contentEnd":{"contentId":"c-1"}}}"#[..])
        .await;

    let first = next_item(&mut items).await.unwrap();
    assert_eq!(first.payload, ItemPayload::Text("first".into()));
    let second = next_item(&mut items).await.unwrap();
    assert_eq!(second.payload, ItemPayload::Text("second".into()));

    // The terminal event must not synthesize a third item.
    remote
        .send_frame(&br#"{"event":{"contentStart":{"contentId":"c-2","type":"TEXT","role":"USER"}}}"#[..])
        .await;
    remote
        .send_frame(&br#"{"event":{"textOutput":{"contentId":"c-2","content":"next","role":"USER"}}}"#[..])
        .await;
    let third = next_item(&mut items).await.unwrap();
    assert_eq!(third.content_id, "c-2");

    session.end_session().await.unwrap();
}

#[tokio::test]
async fn undecodable_frames_are_dropped_without_killing_the_session() {
    let (session, mut items, remote) = start_session(SessionConfig::default()).await;

    remote.send_frame(&b"not json at all"[..]).await;
    remote.send_frame(&br#"{"event":{}}"#[..]).await;
    remote
        .send_frame(&br#"{"event":{"contentStart":{"contentId":"c-1","type":"TEXT","role":"USER"}}}"#[..])
        .await;
    remote
        .send_frame(&br#"{"event":{"textOutput":{"contentId":"c-1","content":"still here","role":"USER"}}}"#[..])
        .await;
    remote
        .send_frame(&br#"{"event":{"contentEnd":{"contentId":"c-1"}}}"#[..])
        .await;

    let item = next_item(&mut items).await.unwrap();
    assert_eq!(item.payload, ItemPayload::Text("still here".into()));
    assert_eq!(session.state(), SessionState::Active);

    session.end_session().await.unwrap();
}

#[tokio::test]
async fn unregistered_tool_yields_error_result_and_session_survives() {
    let (session, _items, mut remote) = start_session(SessionConfig::default()).await;

    // Skip the init sequence.
    for _ in 0..5 {
        next_frame(&mut remote).await;
    }

    remote
        .send_frame(&br#"{"event":{"toolUse":{"contentId":"t-1","toolName":"bookFlightTool","toolUseId":"tu-42","content":"{\"destination\":\"SEA\"}"}}}"#[..])
        .await;

    let start = next_frame(&mut remote).await;
    assert_eq!(event_kind(&start), "contentStart");
    let content_start = &start["event"]["contentStart"];
    assert_eq!(content_start["type"], "TOOL");
    assert_eq!(content_start["interactive"], false);
    assert_eq!(
        content_start["toolResultInputConfiguration"]["toolUseId"],
        "tu-42"
    );

    let result = next_frame(&mut remote).await;
    assert_eq!(event_kind(&result), "toolResult");
    let payload: Value =
        serde_json::from_str(result["event"]["toolResult"]["content"].as_str().unwrap()).unwrap();
    assert!(payload["error"].as_str().unwrap().contains("bookFlightTool"));
    assert_eq!(
        result["event"]["toolResult"]["contentName"],
        content_start["contentName"]
    );

    let end = next_frame(&mut remote).await;
    assert_eq!(event_kind(&end), "contentEnd");
    assert_eq!(
        end["event"]["contentEnd"]["contentName"],
        content_start["contentName"]
    );

    assert_eq!(session.state(), SessionState::Active);
    session.end_session().await.unwrap();
}

#[tokio::test]
async fn validation_error_is_terminal_and_surfaced_once() {
    let (session, mut items, remote) = start_session(SessionConfig::default()).await;

    remote
        .send_error(TransportError::Validation(
            "ValidationException: unknown field".into(),
        ))
        .await;

    match next_item(&mut items).await {
        Err(SessionError::ProtocolValidationFailed(message)) => {
            assert!(message.contains("ValidationException"));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
    assert!(items.recv().await.is_none());
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn unexpected_end_of_stream_reads_as_connection_lost() {
    let (session, mut items, remote) = start_session(SessionConfig::default()).await;

    drop(remote);
    assert!(matches!(
        next_item(&mut items).await,
        Err(SessionError::ConnectionLost(_))
    ));
    assert!(items.recv().await.is_none());
    assert_eq!(session.state(), SessionState::Closed);

    // A session that died under us still closes idempotently.
    session.end_session().await.unwrap();
}

#[tokio::test]
async fn caller_initiated_close_ends_items_cleanly() {
    let (session, mut items, remote) = start_session(SessionConfig::default()).await;
    session.end_session().await.unwrap();

    // The remote answers the close by ending its stream.
    let _outbound = remote.finish();
    match timeout(Duration::from_secs(5), items.recv()).await {
        Ok(None) => {}
        other => panic!("expected clean channel close, got {other:?}"),
    }
}
