//! Deriv WebSocket API v3 message codec.
//!
//! Outbound requests are built as `serde_json::Value` so a correlation tag
//! can be attached as `passthrough.tag`; the venue echoes it back under
//! `echo_req.passthrough.tag` on the matching reply. Inbound frames are
//! classified by `msg_type` into `InboundMessage`.

use chrono::Utc;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use crate::data::{last_digit, parse_quote};
use crate::types::{
    Account, ContractUpdate, EngineError, Purchase, Quote, RequestKind, Side, Tick,
};

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum OutboundRequest {
    Authorize {
        token: SecretString,
    },
    SubscribeTicks {
        symbol: String,
    },
    TicksHistory {
        symbol: String,
        count: usize,
    },
    Proposal {
        symbol: String,
        side: Side,
        threshold: u8,
        stake: f64,
        duration_ticks: u32,
        currency: String,
    },
    Buy {
        proposal_id: String,
        price: f64,
    },
    SubscribeContract {
        contract_id: String,
    },
    Forget {
        subscription_id: String,
    },
    ForgetAll {
        stream: String,
    },
    Ping,
}

impl OutboundRequest {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundRequest::Authorize { .. } => "authorize",
            OutboundRequest::SubscribeTicks { .. } => "ticks",
            OutboundRequest::TicksHistory { .. } => "ticks_history",
            OutboundRequest::Proposal { .. } => "proposal",
            OutboundRequest::Buy { .. } => "buy",
            OutboundRequest::SubscribeContract { .. } => "proposal_open_contract",
            OutboundRequest::Forget { .. } => "forget",
            OutboundRequest::ForgetAll { .. } => "forget_all",
            OutboundRequest::Ping => "ping",
        }
    }

    /// JSON frame for this request, tagged when `tag` is given.
    pub fn to_payload(&self, tag: Option<&str>) -> Value {
        let mut payload = match self {
            OutboundRequest::Authorize { token } => json!({ "authorize": token.expose_secret() }),
            OutboundRequest::SubscribeTicks { symbol } => json!({ "ticks": symbol, "subscribe": 1 }),
            OutboundRequest::TicksHistory { symbol, count } => json!({
                "ticks_history": symbol,
                "count": count,
                "end": "latest",
                "style": "ticks",
            }),
            OutboundRequest::Proposal {
                symbol,
                side,
                threshold,
                stake,
                duration_ticks,
                currency,
            } => json!({
                "proposal": 1,
                "amount": stake,
                "basis": "stake",
                "contract_type": side.contract_type(),
                "currency": currency,
                "duration": duration_ticks,
                "duration_unit": "t",
                "symbol": symbol,
                "barrier": threshold.to_string(),
            }),
            OutboundRequest::Buy { proposal_id, price } => json!({ "buy": proposal_id, "price": price }),
            OutboundRequest::SubscribeContract { contract_id } => json!({
                "proposal_open_contract": 1,
                "contract_id": contract_id_value(contract_id),
                "subscribe": 1,
            }),
            OutboundRequest::Forget { subscription_id } => json!({ "forget": subscription_id }),
            OutboundRequest::ForgetAll { stream } => json!({ "forget_all": stream }),
            OutboundRequest::Ping => json!({ "ping": 1 }),
        };

        if let (Some(tag), Some(obj)) = (tag, payload.as_object_mut()) {
            obj.insert("passthrough".into(), json!({ "tag": tag }));
        }
        payload
    }
}

/// Contract ids are integers on the wire; keep anything else as text.
fn contract_id_value(id: &str) -> Value {
    match id.parse::<u64>() {
        Ok(n) => json!(n),
        Err(_) => json!(id),
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Payload delivered to a correlated waiter.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Authorized(Account),
    History(Vec<Decimal>),
    Proposal(Quote),
    Purchase(Purchase),
}

impl Reply {
    pub fn kind(&self) -> RequestKind {
        match self {
            Reply::Authorized(_) => RequestKind::Authorize,
            Reply::History(_) => RequestKind::History,
            Reply::Proposal(_) => RequestKind::Proposal,
            Reply::Purchase(_) => RequestKind::Purchase,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Reply(Reply),
    Tick(Tick),
    ContractUpdate(ContractUpdate),
    Error { code: String, message: String },
    /// Subscription acks, pings, forget confirmations and unknown types.
    Ack,
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub msg_type: String,
    /// Correlation tag echoed from `echo_req.passthrough.tag`.
    pub tag: Option<String>,
    pub message: InboundMessage,
}

/// Parse one inbound text frame. Malformed JSON or a frame missing the
/// fields its `msg_type` requires yields `EngineError::Protocol`.
pub fn parse_inbound(raw: &str, quote_decimals: u32) -> Result<Envelope, EngineError> {
    let data: Value = serde_json::from_str(raw)
        .map_err(|e| EngineError::protocol("malformed", format!("invalid JSON: {e}")))?;

    let msg_type = data
        .get("msg_type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let tag = data
        .pointer("/echo_req/passthrough/tag")
        .and_then(Value::as_str)
        .map(str::to_string);

    if let Some(err) = data.get("error").filter(|e| !e.is_null()) {
        let code = err
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("UnknownError")
            .to_string();
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Ok(Envelope {
            msg_type,
            tag,
            message: InboundMessage::Error { code, message },
        });
    }

    let message = match msg_type.as_str() {
        "authorize" => InboundMessage::Reply(Reply::Authorized(parse_account(&data)?)),
        "history" => InboundMessage::Reply(Reply::History(parse_history(&data)?)),
        "tick" => InboundMessage::Tick(parse_tick(&data, quote_decimals)?),
        "proposal" => InboundMessage::Reply(Reply::Proposal(parse_proposal(&data)?)),
        "buy" => InboundMessage::Reply(Reply::Purchase(parse_purchase(&data)?)),
        "proposal_open_contract" => InboundMessage::ContractUpdate(parse_contract_update(&data)?),
        "" => return Err(missing("msg_type")),
        _ => InboundMessage::Ack,
    };

    Ok(Envelope {
        msg_type,
        tag,
        message,
    })
}

fn missing(field: &str) -> EngineError {
    EngineError::protocol("malformed", format!("missing or invalid field `{field}`"))
}

/// Numbers arrive as JSON numbers or numeric strings depending on the call.
fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn decimal(v: &Value) -> Option<Decimal> {
    match v {
        Value::Number(n) => parse_quote(&n.to_string()),
        Value::String(s) => parse_quote(s),
        _ => None,
    }
}

fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn flag(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().is_some_and(|i| i != 0),
        _ => false,
    }
}

fn parse_account(data: &Value) -> Result<Account, EngineError> {
    let auth = data.get("authorize").ok_or_else(|| missing("authorize"))?;
    let balance = auth
        .get("balance")
        .and_then(decimal)
        .ok_or_else(|| missing("authorize.balance"))?;
    let currency = auth
        .get("currency")
        .and_then(Value::as_str)
        .ok_or_else(|| missing("authorize.currency"))?
        .to_string();
    let login_id = auth
        .get("loginid")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(Account {
        balance,
        currency,
        login_id,
    })
}

fn parse_history(data: &Value) -> Result<Vec<Decimal>, EngineError> {
    let prices = data
        .pointer("/history/prices")
        .and_then(Value::as_array)
        .ok_or_else(|| missing("history.prices"))?;
    Ok(prices.iter().filter_map(decimal).collect())
}

fn parse_tick(data: &Value, quote_decimals: u32) -> Result<Tick, EngineError> {
    let tick = data.get("tick").ok_or_else(|| missing("tick"))?;
    let quote = tick
        .get("quote")
        .and_then(decimal)
        .ok_or_else(|| missing("tick.quote"))?;
    let epoch = tick
        .get("epoch")
        .and_then(Value::as_i64)
        .ok_or_else(|| missing("tick.epoch"))?;
    let digit = last_digit(quote, quote_decimals).ok_or_else(|| missing("tick.quote"))?;
    Ok(Tick {
        quote,
        digit,
        epoch,
        received_at: Utc::now(),
    })
}

fn parse_proposal(data: &Value) -> Result<Quote, EngineError> {
    let p = data.get("proposal").ok_or_else(|| missing("proposal"))?;
    let proposal_id = p
        .get("id")
        .and_then(id_string)
        .ok_or_else(|| missing("proposal.id"))?;
    let payout = p
        .get("payout")
        .and_then(number)
        .ok_or_else(|| missing("proposal.payout"))?;
    let ask_price = p
        .get("ask_price")
        .and_then(number)
        .ok_or_else(|| missing("proposal.ask_price"))?;
    Ok(Quote {
        proposal_id,
        payout,
        ask_price,
    })
}

fn parse_purchase(data: &Value) -> Result<Purchase, EngineError> {
    let buy = data.get("buy").ok_or_else(|| missing("buy"))?;
    Ok(Purchase {
        contract_id: buy.get("contract_id").and_then(id_string),
        buy_price: buy.get("buy_price").and_then(number),
        payout: buy.get("payout").and_then(number),
    })
}

fn parse_contract_update(data: &Value) -> Result<ContractUpdate, EngineError> {
    let poc = data
        .get("proposal_open_contract")
        .ok_or_else(|| missing("proposal_open_contract"))?;
    let contract_id = poc
        .get("contract_id")
        .and_then(id_string)
        .ok_or_else(|| missing("proposal_open_contract.contract_id"))?;

    let sold = poc.get("is_sold").is_some_and(flag);
    let closed = poc
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|s| s != "open");

    Ok(ContractUpdate {
        contract_id,
        is_final: sold || closed,
        profit: poc.get("profit").and_then(decimal),
        subscription_id: data.pointer("/subscription/id").and_then(id_string),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
