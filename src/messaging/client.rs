//! The message client: outbound one-shot exchanges.

use super::types::MessageOutcome;
use log::warn;
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, TcpStream};
use std::sync::mpsc::{self, Sender};
use std::thread;

struct Job {
    message: String,
    port: u16,
    reply: Sender<MessageOutcome>,
}

/// Sends messages to a running instance's server.
///
/// Socket work runs on one dedicated worker thread; `send` queues a job and
/// blocks the caller until the worker reports back. Each send opens a fresh
/// connection — sockets are never pooled or reused. The worker exits when
/// the client is dropped.
pub(crate) struct MessageClient {
    jobs: Sender<Job>,
}

impl MessageClient {
    /// Spawn the worker thread servicing all sends for this client.
    pub(crate) fn new(id: &str) -> Self {
        let (jobs, queue) = mpsc::channel::<Job>();
        let spawned = thread::Builder::new()
            .name(format!("applock `{id}` client"))
            .spawn(move || {
                while let Ok(job) = queue.recv() {
                    let outcome = round_trip(&job.message, job.port);
                    // a closed reply channel means the caller gave up
                    let _ = job.reply.send(outcome);
                }
            });
        if let Err(e) = spawned {
            // jobs sent to a worker that never started fail over in send()
            warn!("failed to spawn message client thread: {e}");
        }
        Self { jobs }
    }

    /// Round-trip `message` to the server on `port`.
    ///
    /// Blocks until the exchange completes or fails; every transport problem
    /// (refused connection, reset mid-flight) comes back as
    /// [`MessageOutcome::Failure`], never a panic or a hang. Empty messages
    /// are rejected without opening a connection: a zero-byte request is
    /// indistinguishable on the wire from a connection that has not sent
    /// yet, so the server would hold it open and no reply would ever come.
    pub(crate) fn send(&self, message: &str, port: u16) -> MessageOutcome {
        if message.is_empty() {
            return MessageOutcome::Failure(
                "cannot send an empty message: the protocol carries no reply for it".to_string(),
            );
        }
        let (reply, result) = mpsc::channel();
        let job = Job {
            message: message.to_string(),
            port,
            reply,
        };
        if self.jobs.send(job).is_err() {
            return MessageOutcome::Failure("message worker is not running".to_string());
        }
        result.recv().unwrap_or_else(|_| {
            MessageOutcome::Failure("message worker terminated mid-exchange".to_string())
        })
    }
}

fn round_trip(message: &str, port: u16) -> MessageOutcome {
    match exchange(message, port) {
        Ok(answer) => MessageOutcome::Answer(answer),
        Err(e) => {
            MessageOutcome::Failure(format!("message exchange with port {port} failed: {e}"))
        }
    }
}

/// One connection, one request; the reply is everything the server sends
/// before closing.
fn exchange(message: &str, port: u16) -> io::Result<String> {
    let mut conn = TcpStream::connect((Ipv4Addr::LOCALHOST, port))?;
    conn.write_all(message.as_bytes())?;
    let mut reply = Vec::new();
    conn.read_to_end(&mut reply)?;
    Ok(String::from_utf8_lossy(&reply).into_owned())
}
