//! Request correlation.
//!
//! Every request that expects a reply gets a fresh UUID tag, registered in
//! the pending table before the frame leaves. The dispatcher resolves or
//! rejects entries as tagged replies arrive; the waiter sits on a one-shot
//! receiver bounded by a timeout. Each tag has exactly one outcome.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use super::SharedBook;
use crate::types::{EngineError, RequestKind};
use crate::venue::{OutboundRequest, Reply, VenueTransport};

pub type ReplyResult = Result<Reply, EngineError>;

// ---------------------------------------------------------------------------
// Pending table
// ---------------------------------------------------------------------------

/// A request awaiting its correlated reply.
pub struct PendingRequest {
    pub tag: String,
    pub kind: RequestKind,
    pub created_at: Instant,
    responder: oneshot::Sender<ReplyResult>,
}

#[derive(Default)]
pub struct PendingTable {
    entries: HashMap<String, PendingRequest>,
}

impl PendingTable {
    /// Register `tag` and return the receiver its outcome will arrive on.
    pub fn register(
        &mut self,
        tag: &str,
        kind: RequestKind,
    ) -> Result<oneshot::Receiver<ReplyResult>, EngineError> {
        if self.entries.contains_key(tag) {
            return Err(EngineError::protocol(
                "duplicate_tag",
                format!("tag {tag} is already pending"),
            ));
        }
        let (responder, rx) = oneshot::channel();
        self.entries.insert(
            tag.to_string(),
            PendingRequest {
                tag: tag.to_string(),
                kind,
                created_at: Instant::now(),
                responder,
            },
        );
        Ok(rx)
    }

    /// Complete `tag` with `reply`. Returns false for unknown or already
    /// completed tags, which are logged and otherwise ignored.
    pub fn resolve(&mut self, tag: &str, reply: Reply) -> bool {
        let Some(pending) = self.entries.remove(tag) else {
            warn!(tag, kind = %reply.kind(), "Reply for unknown or expired tag");
            return false;
        };

        let outcome = if pending.kind == reply.kind() {
            Ok(reply)
        } else {
            warn!(
                tag,
                expected = %pending.kind,
                got = %reply.kind(),
                "Reply kind does not match request"
            );
            Err(EngineError::protocol(
                "unexpected_reply",
                format!("expected {} reply, got {}", pending.kind, reply.kind()),
            ))
        };

        debug!(
            tag,
            kind = %pending.kind,
            elapsed_ms = pending.created_at.elapsed().as_millis() as u64,
            "Request resolved"
        );
        // A waiter that already gave up is not an error.
        let _ = pending.responder.send(outcome);
        true
    }

    /// Complete `tag` with an error.
    pub fn reject(&mut self, tag: &str, error: EngineError) -> bool {
        let Some(pending) = self.entries.remove(tag) else {
            warn!(tag, error = %error, "Error for unknown or expired tag");
            return false;
        };
        debug!(tag, kind = %pending.kind, error = %error, "Request rejected");
        let _ = pending.responder.send(Err(error));
        true
    }

    /// Drop `tag` without completing it.
    pub fn remove(&mut self, tag: &str) -> Option<PendingRequest> {
        self.entries.remove(tag)
    }

    /// Fail every waiter with `Cancelled`. Returns how many were pending.
    pub fn drain(&mut self) -> usize {
        let count = self.entries.len();
        for (tag, pending) in self.entries.drain() {
            let _ = pending.responder.send(Err(EngineError::Cancelled { tag }));
        }
        count
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Correlator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct RequestCorrelator {
    book: SharedBook,
    transport: Arc<dyn VenueTransport>,
}

impl RequestCorrelator {
    pub fn new(book: SharedBook, transport: Arc<dyn VenueTransport>) -> Self {
        Self { book, transport }
    }

    pub fn book(&self) -> &SharedBook {
        &self.book
    }

    /// Send a tagged request and wait up to `wait` for its reply.
    pub async fn send_and_wait(
        &self,
        kind: RequestKind,
        request: &OutboundRequest,
        wait: Duration,
    ) -> ReplyResult {
        let tag = Uuid::new_v4().simple().to_string();
        let mut rx = self.book.lock().await.pending.register(&tag, kind)?;

        debug!(tag = %tag, kind = %kind, request = request.name(), "Sending request");

        if let Err(e) = self.transport.send(request.to_payload(Some(&tag))).await {
            self.book.lock().await.pending.remove(&tag);
            warn!(tag = %tag, kind = %kind, error = %e, "Send failed");
            return Err(match e {
                EngineError::Transport(_) => e,
                other => EngineError::Transport(other.to_string()),
            });
        }

        match timeout(wait, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(EngineError::Cancelled { tag }),
            Err(_) => {
                let removed = self.book.lock().await.pending.remove(&tag).is_some();
                // Resolved between the deadline and the lock.
                if !removed {
                    if let Ok(outcome) = rx.try_recv() {
                        return outcome;
                    }
                }
                warn!(tag = %tag, kind = %kind, after = ?wait, "Request timed out");
                Err(EngineError::RequestTimeout {
                    tag,
                    kind,
                    after: wait,
                })
            }
        }
    }

    /// Send an untagged request that expects no correlated reply.
    pub async fn notify(&self, request: &OutboundRequest) -> Result<(), EngineError> {
        debug!(request = request.name(), "Sending notification");
        self.transport.send(request.to_payload(None)).await
    }

    pub async fn resolve(&self, tag: &str, reply: Reply) -> bool {
        self.book.lock().await.pending.resolve(tag, reply)
    }

    pub async fn reject(&self, tag: &str, error: EngineError) -> bool {
        self.book.lock().await.pending.reject(tag, error)
    }

    /// Release every waiter with `Cancelled`.
    pub async fn cancel_all(&self) -> usize {
        self.book.lock().await.pending.drain()
    }

    pub async fn pending_count(&self) -> usize {
        self.book.lock().await.pending.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
