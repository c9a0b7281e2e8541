use super::digit_buffer::{derive_digit, DEFAULT_DECIMALS};
use super::lifecycle::{ContractLifecycle, LifecycleEvent, LifecycleSettings, SessionState, Step};
use super::DigitStore;
use crate::api::{InboundMessage, OutboundRequest};
use crate::connection::{ConnectionManager, Listener};
use crate::error::LifecycleError;
use crate::risk::ProfitLimits;
use crate::strategy::{Context, Decision, Strategy};
use chrono::Utc;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::VecDeque;
use std::num::NonZeroU32;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use uuid::Uuid;

/// Delay between attempts to flush requests held back while disconnected
pub const RETRY_INTERVAL: Duration = Duration::from_millis(300);

/// Where a runner sends its requests
pub trait Transport: Send + Sync {
    /// Queue one request; false when it could not be sent
    fn send(&self, request: &OutboundRequest) -> bool;

    fn is_open(&self) -> bool;
}

impl Transport for ConnectionManager {
    fn send(&self, request: &OutboundRequest) -> bool {
        ConnectionManager::send(self, request)
    }

    fn is_open(&self) -> bool {
        ConnectionManager::is_open(self)
    }
}

/// Summary returned when a runner exits
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub strategy: String,
    pub state: SessionState,
    pub pnl: Decimal,
    pub batches: usize,
    pub winning_batches: usize,
    pub losing_batches: usize,
}

/// Drives one strategy instance to completion
///
/// Ticks go to the strategy, protocol messages to the lifecycle, and every
/// request either step emits is sent through the rate limiter. Requests that
/// cannot be sent yet wait in an outbox. The runner keeps its listener until
/// the lifecycle stops, or until a halted lifecycle has no open contracts.
pub struct StrategyRunner<T: Transport> {
    strategy: Box<dyn Strategy>,
    lifecycle: ContractLifecycle,
    transport: T,
    listener: Listener,
    store: DigitStore,
    limiter: DefaultDirectRateLimiter,
    outbox: VecDeque<OutboundRequest>,
}

impl<T: Transport> StrategyRunner<T> {
    pub fn new(
        strategy: Box<dyn Strategy>,
        settings: LifecycleSettings,
        limits: ProfitLimits,
        transport: T,
        listener: Listener,
        store: DigitStore,
        requests_per_second: u32,
    ) -> Self {
        let owner = format!("{}-{}", strategy.name(), &Uuid::new_v4().simple().to_string()[..8]);
        let policy = strategy.risk_policy(limits);
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);

        Self {
            lifecycle: ContractLifecycle::new(owner, settings, policy),
            strategy,
            transport,
            listener,
            store,
            limiter: RateLimiter::direct(Quota::per_second(rate)),
            outbox: VecDeque::new(),
        }
    }

    pub fn lifecycle(&self) -> &ContractLifecycle {
        &self.lifecycle
    }

    pub fn pending_requests(&self) -> usize {
        self.outbox.len()
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> RunReport {
        tracing::info!(
            strategy = self.strategy.name(),
            owner = self.lifecycle.owner(),
            symbols = ?self.strategy.symbols(),
            "🤖 Runner starting"
        );

        match self.lifecycle.start() {
            Ok(step) => {
                self.apply(step);
                let decision = {
                    let locked = self.lifecycle.locked_markets();
                    let ctx = Context {
                        store: &self.store,
                        busy: self.lifecycle.is_busy(),
                        locked: &locked,
                        now: Utc::now(),
                    };
                    self.strategy.on_start(&ctx)
                };
                self.decide(decision);
            }
            Err(e) => {
                let step = self.lifecycle.halt(e.to_string());
                self.apply(step);
            }
        }

        let mut retry = interval(RETRY_INTERVAL);
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut watching_shutdown = true;

        self.flush().await;
        while !self.finished() {
            tokio::select! {
                message = self.listener.recv() => match message {
                    Some(message) => {
                        self.on_message(&message);
                        self.flush().await;
                    }
                    None => {
                        tracing::warn!(owner = self.lifecycle.owner(), "Listener closed, runner exiting");
                        break;
                    }
                },
                _ = retry.tick(), if !self.outbox.is_empty() => {
                    self.flush().await;
                }
                changed = shutdown.changed(), if watching_shutdown => {
                    watching_shutdown = false;
                    if changed.is_ok() && *shutdown.borrow() {
                        tracing::info!(owner = self.lifecycle.owner(), "Shutdown requested, draining");
                        let step = self.lifecycle.stop();
                        self.apply(step);
                        self.flush().await;
                    }
                }
            }
        }

        self.listener.unregister();
        let report = self.report();
        tracing::info!(
            strategy = %report.strategy,
            state = ?report.state,
            pnl = %report.pnl,
            batches = report.batches,
            wins = report.winning_batches,
            losses = report.losing_batches,
            "🏁 Runner finished"
        );
        report
    }

    fn finished(&self) -> bool {
        match self.lifecycle.state() {
            SessionState::Stopped => true,
            SessionState::Halted => self.lifecycle.open_contracts() == 0,
            _ => false,
        }
    }

    pub fn report(&self) -> RunReport {
        let history: Vec<_> = self.lifecycle.history().collect();
        RunReport {
            strategy: self.strategy.name().to_string(),
            state: self.lifecycle.state(),
            pnl: self.lifecycle.cumulative_pnl(),
            batches: history.len(),
            winning_batches: history.iter().filter(|o| o.net > Decimal::ZERO).count(),
            losing_batches: history.iter().filter(|o| o.net < Decimal::ZERO).count(),
        }
    }

    /// Route one venue message
    pub fn on_message(&mut self, message: &InboundMessage) {
        match message {
            InboundMessage::Tick(update) => {
                if self.lifecycle.state() != SessionState::Running {
                    return;
                }
                let symbol = update.tick.symbol.as_str();
                // the store may already hold later ticks than this one
                let digit = update.digit.unwrap_or_else(|| {
                    derive_digit(update.tick.quote, update.pip_size.unwrap_or(DEFAULT_DECIMALS))
                });
                let decision = {
                    let locked = self.lifecycle.locked_markets();
                    let ctx = Context {
                        store: &self.store,
                        busy: self.lifecycle.is_busy(),
                        locked: &locked,
                        now: Utc::now(),
                    };
                    self.strategy.on_tick(symbol, digit, &ctx)
                };
                self.decide(decision);
            }
            InboundMessage::Authorized(account) => {
                if let Some(currency) = &account.currency {
                    self.lifecycle.set_currency(currency);
                }
            }
            InboundMessage::Balance(update) => {
                if let Some(currency) = &update.currency {
                    self.lifecycle.set_currency(currency);
                }
            }
            InboundMessage::Disconnected => {
                tracing::warn!(
                    owner = self.lifecycle.owner(),
                    open_contracts = self.lifecycle.open_contracts(),
                    "Transport lost, waiting for reconnect"
                );
            }
            _ => match self.lifecycle.handle(message) {
                Ok(step) => self.apply(step),
                Err(e) => self.on_error(e),
            },
        }
    }

    fn on_error(&mut self, error: LifecycleError) {
        if error.is_fatal() {
            let step = self.lifecycle.halt(error.to_string());
            self.apply(step);
        } else {
            tracing::warn!(owner = self.lifecycle.owner(), kind = error_kind(&error), "{}", error);
        }
    }

    fn decide(&mut self, decision: Decision) {
        if let Some(step) = self.resolve(decision) {
            self.apply(step);
        }
    }

    fn resolve(&mut self, decision: Decision) -> Option<Step> {
        match decision {
            Decision::Hold => None,
            Decision::Enter(entry) => {
                if self.lifecycle.state() != SessionState::Running {
                    return None;
                }
                match self.lifecycle.submit(entry) {
                    Ok(step) => Some(step),
                    Err(e) => {
                        self.on_error(e);
                        None
                    }
                }
            }
            Decision::Stop(reason) => {
                tracing::info!(owner = self.lifecycle.owner(), "Strategy asked to stop: {}", reason);
                Some(self.lifecycle.stop())
            }
        }
    }

    /// Queue a step's requests and feed its events back to the strategy
    fn apply(&mut self, step: Step) {
        let mut pending = VecDeque::from([step]);

        while let Some(step) = pending.pop_front() {
            for request in step.requests {
                self.enqueue(request);
            }

            for event in step.events {
                match event {
                    LifecycleEvent::LegSettled(settlement) => {
                        self.strategy.on_leg_settled(&settlement);
                    }
                    LifecycleEvent::BatchSettled(outcome) => {
                        let decision = {
                            let locked = self.lifecycle.locked_markets();
                            let ctx = Context {
                                store: &self.store,
                                busy: self.lifecycle.is_busy(),
                                locked: &locked,
                                now: Utc::now(),
                            };
                            self.strategy.on_batch_settled(&outcome, &ctx)
                        };
                        if let Some(next) = self.resolve(decision) {
                            pending.push_back(next);
                        }
                    }
                    LifecycleEvent::LimitReached(breach) => {
                        tracing::info!(owner = self.lifecycle.owner(), "Limit reached: {}", breach);
                    }
                    LifecycleEvent::MarketLocked { symbol, pnl } => {
                        tracing::info!(symbol = %symbol, pnl = %pnl, "🔒 Market locked in profit");
                    }
                    LifecycleEvent::MarketUnlocked { symbol, pnl } => {
                        tracing::info!(symbol = %symbol, pnl = %pnl, "🔓 Market unlocked");
                    }
                    LifecycleEvent::BatchSubmitted { .. }
                    | LifecycleEvent::BatchQueued { .. }
                    | LifecycleEvent::Stopped
                    | LifecycleEvent::Halted(_) => {}
                }
            }
        }
    }

    /// Queue a request unless the same leg already has one of its kind waiting
    fn enqueue(&mut self, request: OutboundRequest) {
        if let Some(token) = request.token() {
            let queued = self
                .outbox
                .iter()
                .any(|q| q.kind() == request.kind() && q.token() == Some(token));
            if queued {
                tracing::debug!(kind = request.kind(), leg = token.leg, "Request already queued");
                return;
            }
        }
        self.outbox.push_back(request);
    }

    /// Send queued requests in order while the transport accepts them
    ///
    /// Requests for legs that closed while they waited are dropped unsent.
    async fn flush(&mut self) {
        while let Some(request) = self.outbox.front() {
            if self.lifecycle.is_stale(request) {
                tracing::debug!(kind = request.kind(), "Dropping request for a closed leg");
                self.outbox.pop_front();
                continue;
            }
            if !self.transport.is_open() {
                break;
            }
            self.limiter.until_ready().await;
            if !self.transport.send(request) {
                break;
            }
            tracing::trace!(kind = request.kind(), "Request sent");
            self.outbox.pop_front();
        }
    }
}

fn error_kind(error: &LifecycleError) -> &'static str {
    match error {
        LifecycleError::UnknownCorrelation(_) => "correlation",
        LifecycleError::NotRunning(_) => "state",
        LifecycleError::MissingLeg { .. } => "tracking",
        _ => "lifecycle",
    }
}
