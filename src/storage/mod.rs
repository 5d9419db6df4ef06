//! Trade journal.
//!
//! Every bought contract ends up as one CSV row, settled or not. The file
//! is append-only; the header is written once, when the file is empty.

use anyhow::{anyhow, Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::types::TradeRecord;

pub const CSV_HEADER: &str = "ts,trade_no,side,threshold,stake,payout,profit,p_win,net_b,ev,balance";

/// Sink for trade outcomes.
#[cfg_attr(test, mockall::automock)]
pub trait TradeJournal: Send + Sync {
    fn append(&self, record: &TradeRecord) -> Result<()>;
}

// ---------------------------------------------------------------------------
// CSV file
// ---------------------------------------------------------------------------

pub struct CsvJournal {
    path: PathBuf,
    file: Mutex<File>,
}

impl CsvJournal {
    /// Open `path` for appending, creating it (and the header) if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create journal directory {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context(format!("Failed to open journal {}", path.display()))?;

        let empty = file
            .metadata()
            .context(format!("Failed to stat journal {}", path.display()))?
            .len()
            == 0;
        if empty {
            writeln!(file, "{CSV_HEADER}")
                .context(format!("Failed to write journal header to {}", path.display()))?;
        }

        info!(path = %path.display(), new_file = empty, "Trade journal open");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TradeJournal for CsvJournal {
    fn append(&self, record: &TradeRecord) -> Result<()> {
        let line = csv_row(record);
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow!("journal lock poisoned"))?;
        writeln!(file, "{line}")
            .and_then(|_| file.flush())
            .context(format!("Failed to append to journal {}", self.path.display()))?;
        debug!(trade_no = record.trade_no, "Journal row written");
        Ok(())
    }
}

/// One CSV line for `record`. Profit reads `pending` while unresolved.
pub fn csv_row(record: &TradeRecord) -> String {
    let profit = match record.profit {
        Some(p) => format!("{p:.2}"),
        None => "pending".to_string(),
    };
    format!(
        "{},{},{},{},{:.2},{:.2},{},{:.4},{:.4},{:.4},{:.2}",
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        record.trade_no,
        record.side,
        record.threshold,
        record.stake,
        record.payout,
        profit,
        record.p_win,
        record.net_b,
        record.ev,
        record.balance,
    )
}

/// Journal that discards everything.
pub struct NullJournal;

impl TradeJournal for NullJournal {
    fn append(&self, _record: &TradeRecord) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
