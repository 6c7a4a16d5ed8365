//! One pass of the intraday pipeline.
//!
//! screen universe -> allocate capital -> per stock: signal, levels, size,
//! bracket -> session guard. Stocks are handled one after another and a
//! failure on one stock never stops the others. Only a missing universe or
//! an unallocatable basket ends the run early.

use crate::allocator::{allocate, quantity_for};
use crate::config::Settings;
use crate::dispatcher::{dispatch_lock, BracketReceipt, DispatchOutcome, OrderDispatcher};
use crate::error::{EngineError, Result};
use crate::risk::{RiskCalculator, RiskPolicy};
use crate::screener::{ScreenCriteria, ScreenReport, Screener};
use crate::session::{GuardDecision, SessionGuard, SessionPhase};
use crate::signal::generate_signal;
use chrono::{DateTime, FixedOffset};
use log::{error, info, warn};
use std::time::Duration;
use trading::{Allocation, Candidate, CloseOutAck, HistoryWindow, SharedBrokerage, TradeOrder};

#[derive(Debug)]
pub enum StockOutcome {
    /// Close equal to its moving average.
    NoSignal,
    /// Allocation too small for a single share.
    NoOp(TradeOrder),
    Placed(TradeOrder, BracketReceipt),
    Failed(EngineError),
}

#[derive(Debug)]
pub struct StockReport {
    pub symbol: String,
    pub capital: f64,
    pub outcome: StockOutcome,
}

#[derive(Debug)]
pub struct RunReport {
    pub phase: SessionPhase,
    /// Absent when the run started after the entry cutoff.
    pub screened: Option<ScreenReport>,
    pub allocations: Vec<Allocation>,
    pub stocks: Vec<StockReport>,
    pub close_out: Option<CloseOutAck>,
}

impl RunReport {
    fn new(phase: SessionPhase) -> Self {
        Self {
            phase,
            screened: None,
            allocations: Vec::new(),
            stocks: Vec::new(),
            close_out: None,
        }
    }

    pub fn placed(&self) -> impl Iterator<Item = &StockReport> {
        self.stocks
            .iter()
            .filter(|s| matches!(s.outcome, StockOutcome::Placed(..)))
    }

    /// Stocks left with a live entry and incomplete protection.
    pub fn unprotected(&self) -> impl Iterator<Item = &StockReport> {
        self.stocks
            .iter()
            .filter(|s| matches!(&s.outcome, StockOutcome::Failed(e) if e.is_unprotected_position()))
    }

    pub fn failures(&self) -> impl Iterator<Item = &StockReport> {
        self.stocks
            .iter()
            .filter(|s| matches!(s.outcome, StockOutcome::Failed(_)))
    }
}

pub struct Engine {
    broker: SharedBrokerage,
    settings: Settings,
    policy: RiskPolicy,
    offset: FixedOffset,
    risk: RiskCalculator,
    dispatcher: OrderDispatcher,
    guard: SessionGuard,
}

impl Engine {
    pub fn new(broker: SharedBrokerage, settings: Settings, policy: RiskPolicy) -> Result<Self> {
        let offset = settings.utc_offset()?;
        let risk = RiskCalculator::new(settings.risk_fraction)?;
        let lock = dispatch_lock();
        let dispatcher = OrderDispatcher::new(broker.clone(), lock.clone(), settings.exchange.clone());
        let guard = SessionGuard::new(
            broker.clone(),
            lock,
            settings.entry_cutoff_time,
            settings.squareoff_time,
        );

        Ok(Self {
            broker,
            settings,
            policy,
            offset,
            risk,
            dispatcher,
            guard,
        })
    }

    /// Session phase at `now`, read on the exchange clock.
    pub fn phase_at(&self, now: DateTime<FixedOffset>) -> SessionPhase {
        self.guard.phase_at(now.with_timezone(&self.offset).time())
    }

    /// Runs the full pipeline as of `now`. New entries are only taken while
    /// the session is open for entry; the session guard always runs last.
    pub async fn run(&self, now: DateTime<FixedOffset>) -> Result<RunReport> {
        let local = now.with_timezone(&self.offset);
        let phase = self.guard.phase_at(local.time());
        let mut report = RunReport::new(phase);

        if phase.accepts_entries() {
            self.enter_positions(local, &mut report).await?;
        } else {
            info!("Session is {} at {}; no new entries", phase, local.format("%H:%M:%S"));
        }

        report.close_out = self.enforce_session(now).await?.close_out;
        Ok(report)
    }

    pub async fn enforce_session(&self, now: DateTime<FixedOffset>) -> Result<GuardDecision> {
        self.guard.enforce(now.with_timezone(&self.offset).time()).await
    }

    /// Re-runs the session guard every `poll` until the book is squared off.
    /// A failed check or close-out is logged and tried again on the next
    /// tick, so one broker error never leaves positions open overnight.
    pub async fn watch<C>(&self, clock: C, poll: Duration) -> GuardDecision
    where
        C: Fn() -> DateTime<FixedOffset>,
    {
        loop {
            match self.enforce_session(clock()).await {
                Ok(decision) if decision.phase == SessionPhase::SquaredOff => return decision,
                Ok(_) => {}
                Err(e) => error!("Session guard failed, retrying in {:?}: {}", poll, e),
            }
            tokio::time::sleep(poll).await;
        }
    }

    async fn enter_positions(&self, local: DateTime<FixedOffset>, report: &mut RunReport) -> Result<()> {
        let Some(window) = self.history_window(local) else {
            info!(
                "Market opens at {}; nothing to screen at {}",
                self.settings.session_open,
                local.format("%H:%M:%S")
            );
            return Ok(());
        };
        let universe = self.broker.list_instruments(&self.settings.exchange).await?;
        let screener = Screener::new(self.broker.clone(), window, self.settings.bar_interval);
        let criteria = ScreenCriteria {
            max_results: self.settings.basket_size,
            min_price: self.settings.min_price,
            min_volatility: self.settings.min_volatility,
        };

        let screened = screener.screen_universe(&universe, criteria).await;
        info!(
            "Screened {} instruments: {} selected, {} skipped",
            universe.len(),
            screened.candidates.len(),
            screened.skipped.len()
        );

        let allocations = allocate(&screened.candidates, self.settings.total_capital());
        let candidates = screened.candidates.clone();
        report.screened = Some(screened);
        report.allocations = allocations?;

        for (candidate, allocation) in candidates.iter().zip(&report.allocations) {
            info!("Allocated {:.2} to {}", allocation.capital, allocation.symbol);
            let outcome = match self.trade(candidate, allocation, window).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_unprotected_position() => {
                    error!("{} is live without full protection: {}", candidate.symbol, e);
                    StockOutcome::Failed(e)
                }
                Err(e) => {
                    warn!("Skipping {}: {}", candidate.symbol, e);
                    StockOutcome::Failed(e)
                }
            };
            report.stocks.push(StockReport {
                symbol: candidate.symbol.clone(),
                capital: allocation.capital,
                outcome,
            });
        }

        Ok(())
    }

    async fn trade(
        &self,
        candidate: &Candidate,
        allocation: &Allocation,
        window: HistoryWindow,
    ) -> Result<StockOutcome> {
        let quote = self.broker.get_quote(&candidate.symbol).await?;
        let bars = self
            .broker
            .get_history(candidate.instrument_token, window, self.settings.bar_interval)
            .await?;

        let signal = generate_signal(&bars, self.settings.ma_window)?;
        let direction = match signal.direction() {
            Some(direction) => direction,
            None => {
                info!("{}: close on its moving average, no trade", candidate.symbol);
                return Ok(StockOutcome::NoSignal);
            }
        };
        let entry_price = match bars.last() {
            Some(bar) => bar.close,
            None => {
                return Err(EngineError::InsufficientData {
                    required: self.settings.ma_window,
                    available: 0,
                })
            }
        };

        let rrr = self.settings.reward_risk_ratio(self.policy);
        let levels = self.risk.levels_for(direction, entry_price, rrr)?;
        let quantity = quantity_for(allocation.capital, quote.last_price)?;
        let order = TradeOrder::new(
            candidate.symbol.clone(),
            direction,
            entry_price,
            levels.stop_loss,
            levels.target_price,
            quantity,
        );
        info!(
            "{} signal on {}: entry {:.2}, stop {:.2}, target {:.2}, qty {}",
            signal, order.symbol, order.entry_price, order.stop_loss, order.target_price, order.quantity
        );

        Ok(match self.dispatcher.place_bracket(&order).await? {
            DispatchOutcome::NoOp => {
                info!("{}: allocation below one share, nothing sent", order.symbol);
                StockOutcome::NoOp(order)
            }
            DispatchOutcome::Placed(receipt) => StockOutcome::Placed(order, receipt),
        })
    }

    /// Today's session from the open up to `local`, capped at the close.
    /// `None` before the open.
    fn history_window(&self, local: DateTime<FixedOffset>) -> Option<HistoryWindow> {
        let session = HistoryWindow::session(
            local.date_naive(),
            self.settings.session_open,
            self.settings.session_close,
        );
        let now = local.naive_local();
        (now >= session.from).then(|| HistoryWindow::new(session.from, session.to.min(now)))
    }
}

#[cfg(test)]
mod tests;
