//! Session guard: entry cutoff and end-of-day square-off.
//!
//! The phase is a pure function of the exchange-local wall clock, so the
//! guard keeps no state between evaluations and can be re-run freely.

use crate::dispatcher::DispatchLock;
use crate::error::Result;
use chrono::NaiveTime;
use log::{info, warn};
use std::fmt;
use trading::{CloseOutAck, SharedBrokerage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    OpenForEntry,
    NoNewEntries,
    SquaredOff,
}

impl SessionPhase {
    pub fn accepts_entries(self) -> bool {
        self == SessionPhase::OpenForEntry
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::OpenForEntry => write!(f, "OPEN_FOR_ENTRY"),
            SessionPhase::NoNewEntries => write!(f, "NO_NEW_ENTRIES"),
            SessionPhase::SquaredOff => write!(f, "SQUARED_OFF"),
        }
    }
}

pub fn session_phase(now: NaiveTime, entry_cutoff: NaiveTime, squareoff: NaiveTime) -> SessionPhase {
    if now < entry_cutoff {
        SessionPhase::OpenForEntry
    } else if now < squareoff {
        SessionPhase::NoNewEntries
    } else {
        SessionPhase::SquaredOff
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardDecision {
    pub phase: SessionPhase,
    /// Set only when the guard squared the book off.
    pub close_out: Option<CloseOutAck>,
}

pub struct SessionGuard {
    broker: SharedBrokerage,
    lock: DispatchLock,
    entry_cutoff: NaiveTime,
    squareoff: NaiveTime,
}

impl SessionGuard {
    pub fn new(broker: SharedBrokerage, lock: DispatchLock, entry_cutoff: NaiveTime, squareoff: NaiveTime) -> Self {
        Self {
            broker,
            lock,
            entry_cutoff,
            squareoff,
        }
    }

    pub fn phase_at(&self, now: NaiveTime) -> SessionPhase {
        session_phase(now, self.entry_cutoff, self.squareoff)
    }

    /// Evaluates the phase at `now` and, past square-off, flattens every
    /// intraday position. Waits for any bracket in flight first.
    pub async fn enforce(&self, now: NaiveTime) -> Result<GuardDecision> {
        let phase = self.phase_at(now);
        if phase != SessionPhase::SquaredOff {
            return Ok(GuardDecision {
                phase,
                close_out: None,
            });
        }

        let _guard = self.lock.lock().await;
        let ack = self.broker.close_all_positions().await?;
        if ack.is_empty() {
            info!("Square-off at {}: nothing left open", now.format("%H:%M:%S"));
        } else {
            warn!(
                "Square-off at {}: cancelled {} orders, closed {} positions",
                now.format("%H:%M:%S"),
                ack.cancelled_orders,
                ack.closed_positions
            );
        }
        Ok(GuardDecision {
            phase,
            close_out: Some(ack),
        })
    }
}
