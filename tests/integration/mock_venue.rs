//! Scripted venue for integration testing.
//!
//! Implements `VenueTransport` entirely in memory. Every outbound payload
//! is recorded, and replies are fed straight back through the session's
//! own `Dispatcher`, echoing the request's passthrough tag the way the
//! real venue does.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use digitedge::engine::dispatcher::{Dispatched, Dispatcher};
use digitedge::types::EngineError;
use digitedge::venue::VenueTransport;

/// How the venue answers each request kind.
#[derive(Debug, Clone)]
pub struct Script {
    pub balance: f64,
    pub currency: String,
    /// Quotes returned for `ticks_history`.
    pub history: Vec<String>,
    pub reject_authorize: bool,
    /// Payout quoted as a multiple of the requested stake.
    pub payout_multiple: f64,
    pub quote_silent: bool,
    pub buy_silent: bool,
    /// Profit reported once a contract subscription arrives; `None` never
    /// settles.
    pub settle_profit: Option<f64>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            balance: 1000.0,
            currency: "USD".to_string(),
            history: skewed_history(),
            reject_authorize: false,
            payout_multiple: 5.0,
            quote_silent: false,
            buy_silent: false,
            settle_profit: Some(4.0),
        }
    }
}

/// 200 quotes at three decimals: ten of each digit plus 100 extra nines.
/// Strongly favours OVER 8.
pub fn skewed_history() -> Vec<String> {
    let mut quotes: Vec<String> = (0..100).map(|i| format!("1000.00{}", i % 10)).collect();
    quotes.extend((0..100).map(|_| "1000.009".to_string()));
    quotes
}

pub struct ScriptedVenue {
    dispatcher: Mutex<Option<Dispatcher>>,
    script: Mutex<Script>,
    sent: Mutex<Vec<Value>>,
    next_contract: AtomicU64,
}

impl ScriptedVenue {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            dispatcher: Mutex::new(None),
            script: Mutex::new(script),
            sent: Mutex::new(Vec::new()),
            next_contract: AtomicU64::new(9001),
        })
    }

    /// Route replies through `dispatcher` from now on.
    pub fn attach(&self, dispatcher: Dispatcher) {
        *self.dispatcher.lock().unwrap() = Some(dispatcher);
    }

    /// Change the script mid-test.
    pub fn update(&self, f: impl FnOnce(&mut Script)) {
        let mut script = self.script.lock().unwrap();
        f(&mut *script);
    }

    /// Every payload sent so far, in order.
    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().unwrap().clone()
    }

    /// Payloads carrying `key` at the top level.
    pub fn sent_with(&self, key: &str) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|p| p.get(key).is_some())
            .collect()
    }

    /// Deliver a raw inbound frame as if it came off the socket.
    pub async fn deliver(&self, raw: &str) -> Dispatched {
        let dispatcher = self.dispatcher.lock().unwrap().clone();
        match dispatcher {
            Some(d) => d.handle_text(raw).await,
            None => panic!("venue has no dispatcher attached"),
        }
    }

    pub async fn push_tick(&self, quote: &str) -> Dispatched {
        let raw = format!(
            r#"{{"msg_type":"tick","tick":{{"quote":"{quote}","epoch":1700000000,"symbol":"R_10"}}}}"#
        );
        self.deliver(&raw).await
    }

    fn reply_to(&self, payload: &Value) -> Option<Value> {
        let script = self.script.lock().unwrap().clone();
        let echo = json!({
            "passthrough": payload.get("passthrough").cloned().unwrap_or(Value::Null)
        });

        if payload.get("authorize").is_some() {
            if script.reject_authorize {
                return Some(json!({
                    "msg_type": "authorize",
                    "echo_req": echo,
                    "error": { "code": "InvalidToken", "message": "The token is invalid." },
                }));
            }
            return Some(json!({
                "msg_type": "authorize",
                "echo_req": echo,
                "authorize": {
                    "balance": script.balance,
                    "currency": script.currency,
                    "loginid": "VRTC1000",
                },
            }));
        }

        if payload.get("ticks_history").is_some() {
            return Some(json!({
                "msg_type": "history",
                "echo_req": echo,
                "history": { "prices": script.history },
            }));
        }

        if payload.get("proposal").is_some() {
            if script.quote_silent {
                return None;
            }
            let stake = payload["amount"].as_f64().unwrap_or(0.0);
            return Some(json!({
                "msg_type": "proposal",
                "echo_req": echo,
                "proposal": {
                    "id": format!("prop-{}", self.sent.lock().unwrap().len()),
                    "payout": stake * script.payout_multiple,
                    "ask_price": stake,
                },
            }));
        }

        if payload.get("buy").is_some() {
            if script.buy_silent {
                return None;
            }
            let contract_id = self.next_contract.fetch_add(1, Ordering::SeqCst);
            return Some(json!({
                "msg_type": "buy",
                "echo_req": echo,
                "buy": { "contract_id": contract_id, "buy_price": payload["price"] },
            }));
        }

        if payload.get("proposal_open_contract").is_some() {
            let contract_id = payload["contract_id"].clone();
            return script.settle_profit.map(|profit| {
                let status = if profit > 0.0 { "won" } else { "lost" };
                json!({
                    "msg_type": "proposal_open_contract",
                    "proposal_open_contract": {
                        "contract_id": contract_id,
                        "is_sold": 1,
                        "status": status,
                        "profit": profit,
                    },
                    "subscription": { "id": format!("sub-{contract_id}") },
                })
            });
        }

        None
    }
}

#[async_trait]
impl VenueTransport for ScriptedVenue {
    async fn send(&self, payload: Value) -> Result<(), EngineError> {
        self.sent.lock().unwrap().push(payload.clone());
        if let Some(reply) = self.reply_to(&payload) {
            self.deliver(&reply.to_string()).await;
        }
        Ok(())
    }
}
