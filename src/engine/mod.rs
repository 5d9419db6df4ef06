//! Core engine: request correlation, inbound dispatch, trade execution and
//! the session loop.
//!
//! Everything the inbound path and the decision loop both touch lives in a
//! single `SessionBook` behind one `tokio::sync::Mutex`. The lock is never
//! held across a network await.

pub mod accountant;
pub mod correlator;
pub mod dispatcher;
pub mod executor;
pub mod session;

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::data::DigitWindow;
use crate::types::{SessionState, TradeRecord};
use correlator::PendingTable;
use executor::ContractBook;

/// Trade outcomes kept in memory for the status API.
pub const RECENT_TRADES: usize = 50;

pub type SharedBook = Arc<Mutex<SessionBook>>;

/// Shared session state: window, counters, pending requests, open contracts.
pub struct SessionBook {
    pub window: DigitWindow,
    pub state: SessionState,
    pub pending: PendingTable,
    pub contracts: ContractBook,
    pub recent: VecDeque<TradeRecord>,
}

impl SessionBook {
    pub fn new(window_capacity: usize, base_stake: f64) -> Self {
        Self {
            window: DigitWindow::new(window_capacity),
            state: SessionState::new(base_stake),
            pending: PendingTable::default(),
            contracts: ContractBook::default(),
            recent: VecDeque::with_capacity(RECENT_TRADES),
        }
    }

    pub fn shared(self) -> SharedBook {
        Arc::new(Mutex::new(self))
    }

    /// Remember a journal row, dropping the oldest past `RECENT_TRADES`.
    pub fn push_recent(&mut self, record: TradeRecord) {
        if self.recent.len() == RECENT_TRADES {
            self.recent.pop_front();
        }
        self.recent.push_back(record);
    }
}
