//! Inbound dispatcher.
//!
//! Classifies every text frame from the venue and routes it: ticks feed
//! the digit window and wake the decision loop, tagged replies and errors
//! complete pending requests, contract updates drive settlement. The only
//! await on this path is the book lock.

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, trace, warn};

use super::SharedBook;
use crate::types::{EngineError, Tick};
use crate::venue::{parse_inbound, Envelope, InboundMessage, Reply};

/// What the dispatcher did with a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    Tick(u8),
    /// Untagged authorization: balance initialized, nothing to resolve.
    Authorized,
    Resolved { tag: String },
    Rejected { tag: String },
    /// A reply or error whose tag is unknown, expired or missing.
    Orphan { tag: Option<String> },
    ContractUpdated { settled: bool },
    Ignored,
    Malformed,
}

#[derive(Clone)]
pub struct Dispatcher {
    book: SharedBook,
    ticks: mpsc::Sender<Tick>,
    quote_decimals: u32,
}

impl Dispatcher {
    pub fn new(book: SharedBook, ticks: mpsc::Sender<Tick>, quote_decimals: u32) -> Self {
        Self {
            book,
            ticks,
            quote_decimals,
        }
    }

    pub async fn handle_text(&self, raw: &str) -> Dispatched {
        let Envelope {
            msg_type,
            tag,
            message,
        } = match parse_inbound(raw, self.quote_decimals) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, frame = %preview(raw), "Dropping malformed message");
                return Dispatched::Malformed;
            }
        };

        let mut book = self.book.lock().await;

        match message {
            InboundMessage::Tick(tick) => {
                book.window.add(tick.digit);
                book.state.ticks_seen += 1;
                drop(book);

                match self.ticks.try_send(tick) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => trace!("Tick channel full, notification dropped"),
                    Err(TrySendError::Closed(_)) => trace!("Tick channel closed"),
                }
                Dispatched::Tick(tick.digit)
            }

            InboundMessage::Reply(reply) => {
                if let Reply::Authorized(account) = &reply {
                    book.state.initialize_balance(account.balance, &account.currency);
                    info!(
                        balance = %account.balance,
                        currency = %account.currency,
                        login_id = account.login_id.as_deref().unwrap_or("-"),
                        "Authorized"
                    );
                }

                match tag {
                    Some(tag) => {
                        if book.pending.resolve(&tag, reply) {
                            Dispatched::Resolved { tag }
                        } else {
                            Dispatched::Orphan { tag: Some(tag) }
                        }
                    }
                    None if matches!(reply, Reply::Authorized(_)) => Dispatched::Authorized,
                    None => {
                        warn!(msg_type = %msg_type, "Untagged reply dropped");
                        Dispatched::Orphan { tag: None }
                    }
                }
            }

            InboundMessage::ContractUpdate(update) => {
                let settled = book.contracts.apply_update(&update);
                Dispatched::ContractUpdated { settled }
            }

            InboundMessage::Error { code, message } => match tag {
                Some(tag) => {
                    let error = EngineError::Protocol { code, message };
                    if book.pending.reject(&tag, error) {
                        Dispatched::Rejected { tag }
                    } else {
                        Dispatched::Orphan { tag: Some(tag) }
                    }
                }
                None => {
                    warn!(msg_type = %msg_type, code = %code, message = %message, "Venue error");
                    Dispatched::Ignored
                }
            },

            InboundMessage::Ack => {
                trace!(msg_type = %msg_type, "Ignored");
                Dispatched::Ignored
            }
        }
    }

    /// Pump inbound frames until the connection closes, then release any
    /// request still waiting for a reply.
    pub async fn run(self, mut inbound: mpsc::Receiver<String>) {
        while let Some(text) = inbound.recv().await {
            self.handle_text(&text).await;
        }
        let cancelled = self.book.lock().await.pending.drain();
        warn!(cancelled, "Inbound stream closed");
    }
}

fn preview(raw: &str) -> &str {
    match raw.char_indices().nth(120) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
