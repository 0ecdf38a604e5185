//! Tests for the one-shot messaging layer.

use super::*;
use std::net::TcpListener;
use std::sync::Arc;

fn start_server(
    id: &str,
    handler: impl Fn(&str) -> String + Send + Sync + 'static,
) -> (u16, ServerHandle) {
    let server = MessageServer::bind(Arc::new(handler)).unwrap();
    let port = server.port();
    let handle = server.start(id).unwrap();
    (port, handle)
}

#[test]
fn round_trip_applies_the_handler() {
    let (port, handle) = start_server("echo", |m| format!("{m} + extra"));
    let client = MessageClient::new("echo");

    let outcome = client.send("message", port);
    assert_eq!(outcome, MessageOutcome::Answer("message + extra".to_string()));

    handle.stop();
}

#[test]
fn server_answers_sequential_one_shot_connections() {
    let (port, handle) = start_server("seq", |m| m.to_uppercase());
    let client = MessageClient::new("seq");

    for msg in ["one", "two", "three"] {
        let outcome = client.send(msg, port);
        assert_eq!(outcome, MessageOutcome::Answer(msg.to_uppercase()));
    }

    handle.stop();
}

#[test]
fn non_ascii_payloads_survive_the_round_trip() {
    let (port, handle) = start_server("utf8", |m| m.to_string());
    let client = MessageClient::new("utf8");

    let outcome = client.send("héllo wörld", port);
    assert_eq!(outcome, MessageOutcome::Answer("héllo wörld".to_string()));

    handle.stop();
}

#[test]
fn send_to_a_dead_port_reports_failure() {
    // Bind and immediately drop to get a port nothing listens on.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let client = MessageClient::new("dead");
    match client.send("message", port) {
        MessageOutcome::Failure(desc) => assert!(desc.contains(&port.to_string())),
        other => panic!("expected Failure, got {other:?}"),
    }
}

#[test]
fn handler_panic_does_not_kill_the_listener() {
    let (port, handle) = start_server("panicky", |m| {
        if m == "boom" {
            panic!("handler exploded");
        }
        m.to_string()
    });
    let client = MessageClient::new("panicky");

    // The panicking exchange must complete (no reply, not a hang)...
    let _ = client.send("boom", port);

    // ...and the loop must still serve the next peer.
    let outcome = client.send("hello", port);
    assert_eq!(outcome, MessageOutcome::Answer("hello".to_string()));

    handle.stop();
}

#[test]
fn stopped_server_refuses_new_exchanges() {
    let (port, handle) = start_server("stopped", |m| m.to_string());
    handle.stop();

    let client = MessageClient::new("stopped");
    match client.send("message", port) {
        MessageOutcome::Failure(_) => {}
        other => panic!("expected Failure after stop, got {other:?}"),
    }
}

#[test]
fn empty_message_is_rejected_before_the_wire() {
    let (port, handle) = start_server("empty", |m| m.to_string());
    let client = MessageClient::new("empty");

    // An empty request would look like a silent connection to the server
    // and never be answered, so the client must fail it immediately.
    match client.send("", port) {
        MessageOutcome::Failure(desc) => assert!(desc.contains("empty message")),
        other => panic!("expected Failure, got {other:?}"),
    }

    // The server never saw a connection and keeps serving.
    let outcome = client.send("still alive", port);
    assert_eq!(outcome, MessageOutcome::Answer("still alive".to_string()));

    handle.stop();
}

#[test]
fn empty_reply_is_a_valid_answer() {
    let (port, handle) = start_server("quiet", |_| String::new());
    let client = MessageClient::new("quiet");

    let outcome = client.send("anything", port);
    assert_eq!(outcome, MessageOutcome::Answer(String::new()));

    handle.stop();
}
