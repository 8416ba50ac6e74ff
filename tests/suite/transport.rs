//! Session and transport behavior against a scripted peer

use std::time::Duration;

use lsp_conform_harness::{Session, Transport, TransportError};
use lsp_conform_protocol::{FrameReader, Incoming, Notification, Response, encode};
use serde_json::json;
use tokio::io::{AsyncWriteExt, DuplexStream, duplex};

struct Peer {
    input: FrameReader<DuplexStream>,
    output: DuplexStream,
}

impl Peer {
    async fn reply(&mut self, id: u64, result: serde_json::Value) {
        let frame = encode(&Response::success(json!(id), result).into()).unwrap();
        self.output.write_all(&frame).await.unwrap();
    }

    async fn notify(&mut self, method: &str) {
        let notification = Notification::new(method, Some(json!({}))).unwrap();
        let frame = encode(&notification.into()).unwrap();
        self.output.write_all(&frame).await.unwrap();
    }
}

fn connect(timeout: Duration) -> (Session, Peer) {
    let (client_out, server_in) = duplex(64 * 1024);
    let (server_out, client_in) = duplex(64 * 1024);
    let session = Session::new(Transport::spawn(client_in, client_out), Some(timeout));
    let peer = Peer {
        input: FrameReader::new(server_in),
        output: server_out,
    };
    (session, peer)
}

#[tokio::test]
async fn requests_get_sequential_ids() {
    let (mut session, mut peer) = connect(Duration::from_secs(5));
    for _ in 0..4 {
        session
            .issue_request("workspace/symbol", Some(json!({"query": ""})))
            .await
            .unwrap();
    }
    for expected in 1..=4u64 {
        let raw = peer.input.read_message().await.unwrap().unwrap();
        assert_eq!(raw.id, Some(json!(expected)));
        assert_eq!(raw.method.as_deref(), Some("workspace/symbol"));
    }
}

#[tokio::test]
async fn reversed_responses_reach_their_requests() {
    let (mut session, mut peer) = connect(Duration::from_secs(5));
    let a = session.issue_request("a", None).await.unwrap();
    let b = session.issue_request("b", None).await.unwrap();
    let c = session.issue_request("c", None).await.unwrap();

    peer.reply(c.get(), json!("c")).await;
    peer.notify("window/logMessage").await;
    peer.reply(b.get(), json!("b")).await;
    peer.reply(a.get(), json!("a")).await;

    for (id, expected) in [(b, "b"), (a, "a"), (c, "c")] {
        let response = session.await_response(id).await.unwrap();
        assert_eq!(response.result(), Some(&json!(expected)));
    }

    // The notification stays queued for the inbound reader.
    match session.next_inbound().await.unwrap() {
        Incoming::Notification { method, .. } => assert_eq!(method, "window/logMessage"),
        other => panic!("expected notification, got {other:?}"),
    }
}

#[tokio::test]
async fn late_reply_after_timeout_is_unsolicited() {
    let (mut session, mut peer) = connect(Duration::from_millis(50));
    let id = session.issue_request("slow", None).await.unwrap();
    assert!(session.await_response(id).await.unwrap_err().is_timeout());

    peer.reply(id.get(), json!("late")).await;
    match session.next_inbound().await.unwrap() {
        Incoming::Response(response) => assert_eq!(response.result(), Some(&json!("late"))),
        other => panic!("expected unsolicited response, got {other:?}"),
    }
}

#[tokio::test]
async fn garbage_from_server_is_fatal() {
    let (mut session, mut peer) = connect(Duration::from_secs(5));
    let id = session.issue_request("initialize", None).await.unwrap();

    peer.output
        .write_all(b"Content-Length: 5\r\n\r\nnope!")
        .await
        .unwrap();

    let err = session.await_response(id).await.unwrap_err();
    assert!(matches!(err, TransportError::Parse(_)));

    let again = session.issue_notification("exit", None).await.unwrap_err();
    assert!(matches!(again, TransportError::Parse(_)));
}

#[tokio::test]
async fn closed_server_never_hangs() {
    let (mut session, peer) = connect(Duration::from_secs(30));
    drop(peer);

    let started = std::time::Instant::now();
    assert!(session.next_inbound().await.is_err());
    assert!(session.request("shutdown", None).await.is_err());
    assert!(started.elapsed() < Duration::from_secs(5));
}
