//! Request engine.
//!
//! Two background tasks own the transport halves. The read task feeds
//! decoded objects to the [`Waitress`] and to event subscribers. The
//! executor task owns the write half and drains a submission queue one
//! request at a time, so a synchronous exchange is always complete before
//! the next request touches the wire.
//!
//! ```ignore
//! let driver = Driver::new(reader, writer, CodecKind::LengthPrefixed);
//! let reply = driver
//!     .request_expect_reply(Subsystem::Sys, "ping", Payload::new())
//!     .await?;
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{Result, ZnpError};
use crate::framing::{CodecKind, DecodeEvent, Direction, Frame, FrameCodec};
use crate::object::ZnpObject;
use crate::payload::{Payload, Value};
use crate::schema::{CommandKind, Subsystem};
use crate::waitress::{Matcher, Waiter, Waitress};

/// Default deadline for a synchronous reply.
const SREQ_TIMEOUT: Duration = Duration::from_secs(6);

/// Deadline for the reset indication after a soft reset.
const RESET_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the indication broadcast channel.
const EVENT_CAPACITY: usize = 64;

/// Per-request knobs.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Reply deadline; falls back to the catalog override, then the
    /// engine default.
    pub timeout: Option<Duration>,
    /// Reply status codes treated as success.
    pub accepted_statuses: Vec<u8>,
    /// Waiter to unregister when the reply status is rejected, so a
    /// caller's follow-up waiter does not linger after a failed send.
    pub cleanup_waiter: Option<u64>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            accepted_statuses: vec![0],
            cleanup_waiter: None,
        }
    }
}

enum Submission {
    Request(QueueEntry),
    Close,
}

struct QueueEntry {
    object: ZnpObject,
    options: RequestOptions,
    reply: oneshot::Sender<Result<Option<ZnpObject>>>,
}

/// Handle to the running engine. Cheap to clone.
#[derive(Clone)]
pub struct Driver {
    tx: mpsc::UnboundedSender<Submission>,
    waitress: Arc<Waitress>,
    events: broadcast::Sender<ZnpObject>,
    queue_depth: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl Driver {
    /// Spawn the read and executor tasks over a split transport.
    pub fn new<R, W>(reader: R, writer: W, kind: CodecKind) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let waitress = Arc::new(Waitress::new());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (tx, rx) = mpsc::unbounded_channel();
        let queue_depth = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(read_loop(
            reader,
            kind.codec(),
            Arc::clone(&waitress),
            events.clone(),
        ));

        let executor = Executor {
            writer,
            codec: kind.codec(),
            waitress: Arc::clone(&waitress),
            rx,
            queue_depth: Arc::clone(&queue_depth),
            closed: Arc::clone(&closed),
        };
        tokio::spawn(executor.run());

        Self {
            tx,
            waitress,
            events,
            queue_depth,
            closed,
        }
    }

    /// Send a named command with default options.
    pub async fn request(
        &self,
        subsystem: Subsystem,
        name: &str,
        payload: Payload,
    ) -> Result<Option<ZnpObject>> {
        self.request_with(subsystem, name, payload, RequestOptions::default())
            .await
    }

    /// Send a named command with explicit options.
    pub async fn request_with(
        &self,
        subsystem: Subsystem,
        name: &str,
        payload: Payload,
        options: RequestOptions,
    ) -> Result<Option<ZnpObject>> {
        let object = ZnpObject::request(subsystem, name, payload)?;
        self.submit(object, options).await
    }

    /// Send a synchronous command and return its reply.
    pub async fn request_expect_reply(
        &self,
        subsystem: Subsystem,
        name: &str,
        payload: Payload,
    ) -> Result<ZnpObject> {
        let reply = self.request(subsystem, name, payload).await?;
        reply.ok_or_else(|| ZnpError::NoReply {
            command: name.to_owned(),
        })
    }

    /// Send an asynchronous command, rejecting synchronous ones up front.
    pub async fn request_fire_and_forget(
        &self,
        subsystem: Subsystem,
        name: &str,
        payload: Payload,
    ) -> Result<()> {
        let object = ZnpObject::request(subsystem, name, payload)?;
        if object.command.kind == CommandKind::Sreq {
            return Err(ZnpError::ExpectsReply {
                command: object.command.name.to_owned(),
            });
        }
        self.submit(object, RequestOptions::default()).await?;
        Ok(())
    }

    async fn submit(&self, object: ZnpObject, options: RequestOptions) -> Result<Option<ZnpObject>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let entry = QueueEntry {
            object,
            options,
            reply: reply_tx,
        };
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(Submission::Request(entry)).is_err() {
            self.queue_depth.fetch_sub(1, Ordering::Relaxed);
            return Err(ZnpError::LinkClosed);
        }
        reply_rx.await.map_err(|_| ZnpError::Cancelled)?
    }

    /// Register a waiter for an inbound object outside the request path.
    pub fn wait_for(&self, matcher: Matcher, timeout: Duration) -> Waiter {
        self.waitress.wait_for(matcher, timeout)
    }

    /// Subscribe to every decoded inbound object.
    pub fn subscribe(&self) -> broadcast::Receiver<ZnpObject> {
        self.events.subscribe()
    }

    /// Requests submitted but not yet executed.
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    /// Stop the executor. Every queued request fails with cancellation,
    /// including entries submitted ahead of the close; an exchange already
    /// on the wire still runs to completion.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        let _ = self.tx.send(Submission::Close);
    }
}

async fn read_loop<R>(
    mut reader: R,
    mut codec: Box<dyn FrameCodec>,
    waitress: Arc<Waitress>,
    events: broadcast::Sender<ZnpObject>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 1024];
    let mut decoded = Vec::new();
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                warn!(error = %err, "transport read failed");
                break;
            }
        };

        codec.push(&buf[..n], &mut decoded);
        for event in decoded.drain(..) {
            match event {
                DecodeEvent::Frame(frame) => match ZnpObject::from_frame(&frame) {
                    Ok(object) => {
                        debug!("<-- {object}");
                        waitress.resolve(&object);
                        let _ = events.send(object);
                    }
                    Err(err) => warn!(error = %err, "undecodable frame"),
                },
                DecodeEvent::Error(err) => warn!(error = %err, "frame discarded"),
            }
        }
    }
    // Pending waiters observe the loss of the link as cancellation.
    waitress.cancel_all();
}

struct Executor<W> {
    writer: W,
    codec: Box<dyn FrameCodec>,
    waitress: Arc<Waitress>,
    rx: mpsc::UnboundedReceiver<Submission>,
    queue_depth: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl<W: AsyncWrite + Unpin> Executor<W> {
    async fn run(mut self) {
        while let Some(submission) = self.rx.recv().await {
            match submission {
                Submission::Request(entry) => {
                    self.queue_depth.fetch_sub(1, Ordering::Relaxed);
                    // The close flag covers entries that were queued ahead
                    // of the close submission.
                    if self.closed.load(Ordering::Relaxed) {
                        let _ = entry.reply.send(Err(ZnpError::Cancelled));
                        continue;
                    }
                    let result = self.execute(entry.object, entry.options).await;
                    let _ = entry.reply.send(result);
                }
                Submission::Close => {
                    self.reject_queued();
                    self.waitress.cancel_all();
                    break;
                }
            }
        }
    }

    /// Fail everything currently queued without executing it.
    fn reject_queued(&mut self) {
        while let Ok(submission) = self.rx.try_recv() {
            if let Submission::Request(entry) = submission {
                self.queue_depth.fetch_sub(1, Ordering::Relaxed);
                let _ = entry.reply.send(Err(ZnpError::Cancelled));
            }
        }
    }

    async fn execute(
        &mut self,
        object: ZnpObject,
        options: RequestOptions,
    ) -> Result<Option<ZnpObject>> {
        let frame = object.to_frame()?;
        debug!("--> {object}");

        if object.command.kind == CommandKind::Sreq {
            let timeout = options
                .timeout
                .or(object.command.timeout_ms.map(Duration::from_millis))
                .unwrap_or(SREQ_TIMEOUT);
            let matcher = Matcher::new(Direction::Srsp, object.subsystem, object.command.name);
            // Register before writing so a fast reply cannot be missed.
            let waiter = self.waitress.wait_for(matcher, timeout);

            if let Err(err) = self.write_frame(&frame).await {
                waiter.cancel();
                return Err(err);
            }

            let reply = waiter.receive().await?;
            if let Some(Value::U8(code)) = reply.payload.get("status") {
                if !options.accepted_statuses.contains(code) {
                    if let Some(id) = options.cleanup_waiter {
                        self.waitress.remove(id);
                    }
                    return Err(ZnpError::StatusRejected { code: *code });
                }
            }
            Ok(Some(reply))
        } else if object.is_reset_command() {
            // A reset invalidates everything in flight: queued requests
            // and registered waiters alike.
            self.reject_queued();
            self.waitress.cancel_all();

            let matcher = Matcher::new(Direction::Areq, Subsystem::Sys, "resetInd");
            let waiter = self.waitress.wait_for(matcher, RESET_TIMEOUT);

            if let Err(err) = self.write_frame(&frame).await {
                waiter.cancel();
                return Err(err);
            }

            let indication = waiter.receive().await?;
            Ok(Some(indication))
        } else {
            self.write_frame(&frame).await?;
            Ok(None)
        }
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mut dst = BytesMut::new();
        self.codec.encode(frame, &mut dst)?;
        self.writer.write_all(&dst).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_accept_success_only() {
        let options = RequestOptions::default();
        assert_eq!(options.accepted_statuses, vec![0]);
        assert!(options.timeout.is_none());
        assert!(options.cleanup_waiter.is_none());
    }
}
