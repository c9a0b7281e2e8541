use super::correlation::CorrelationMap;
use crate::api::{
    BuyReceipt, ContractTerms, ContractUpdate, InboundMessage, OutboundRequest, ProposalReply,
    VenueError,
};
use crate::error::LifecycleError;
use crate::models::{Batch, BatchOutcome, ContractType, Digit, Entry, Leg, LegStatus, LegToken};
use crate::risk::{LimitBreach, LockChange, RiskPolicy};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

pub const DEFAULT_CORRELATION_CAPACITY: usize = 256;
pub const DEFAULT_HISTORY_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Running,
    /// No new batches; waiting for in-flight legs to settle
    Draining,
    Stopped,
    /// Invariant violation; no new batches, settlements still booked
    Halted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleSettings {
    pub terms: ContractTerms,
    pub correlation_capacity: usize,
    pub history_capacity: usize,
}

impl LifecycleSettings {
    pub fn new(terms: ContractTerms) -> Self {
        Self {
            terms,
            correlation_capacity: DEFAULT_CORRELATION_CAPACITY,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LegRef {
    batch: Uuid,
    leg: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegSettlement {
    pub batch: Uuid,
    pub leg: usize,
    pub symbol: String,
    pub contract_type: ContractType,
    pub barrier: Digit,
    pub rank: Option<usize>,
    pub contract_id: Option<u64>,
    pub profit: Decimal,
    pub rejected: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    BatchSubmitted { batch: Uuid, symbol: String, legs: usize },
    BatchQueued { batch: Uuid, depth: usize },
    LegSettled(LegSettlement),
    BatchSettled(BatchOutcome),
    LimitReached(LimitBreach),
    MarketLocked { symbol: String, pnl: Decimal },
    MarketUnlocked { symbol: String, pnl: Decimal },
    Stopped,
    Halted(String),
}

/// Requests to send and events to report after one lifecycle operation
#[derive(Debug, Default)]
pub struct Step {
    pub requests: Vec<OutboundRequest>,
    pub events: Vec<LifecycleEvent>,
}

impl Step {
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.events.is_empty()
    }

    pub fn merge(&mut self, other: Step) {
        self.requests.extend(other.requests);
        self.events.extend(other.events);
    }
}

enum Completion {
    Settled(Decimal),
    Rejected(String),
}

/// Drives legs from proposal to settlement for one strategy instance
///
/// At most one batch is current; later entries wait in FIFO order and are
/// not sent until promoted. Responses are matched by the pass-through token
/// first and by proposal id second, so legs may complete in any order.
pub struct ContractLifecycle {
    owner: String,
    settings: LifecycleSettings,
    policy: RiskPolicy,
    state: SessionState,
    cumulative_pnl: Decimal,
    current: Option<Uuid>,
    queued: VecDeque<Batch>,
    active_by_batch: HashMap<Uuid, Batch>,
    contracts: HashMap<u64, LegRef>,
    proposals: CorrelationMap<String, LegRef>,
    settled_contracts: CorrelationMap<u64, Uuid>,
    history: VecDeque<BatchOutcome>,
}

impl ContractLifecycle {
    pub fn new(owner: impl Into<String>, settings: LifecycleSettings, policy: RiskPolicy) -> Self {
        let capacity = settings.correlation_capacity;
        Self {
            owner: owner.into(),
            settings,
            policy,
            state: SessionState::Idle,
            cumulative_pnl: Decimal::ZERO,
            current: None,
            queued: VecDeque::new(),
            active_by_batch: HashMap::new(),
            contracts: HashMap::new(),
            proposals: CorrelationMap::new(capacity),
            settled_contracts: CorrelationMap::new(capacity),
            history: VecDeque::new(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Running or draining towards a stop
    pub fn is_running(&self) -> bool {
        matches!(self.state, SessionState::Running | SessionState::Draining)
    }

    pub fn cumulative_pnl(&self) -> Decimal {
        self.cumulative_pnl
    }

    pub fn terms(&self) -> &ContractTerms {
        &self.settings.terms
    }

    pub fn set_currency(&mut self, currency: &str) {
        self.settings.terms.currency = currency.to_string();
    }

    pub fn policy(&self) -> &RiskPolicy {
        &self.policy
    }

    pub fn current_batch(&self) -> Option<&Batch> {
        self.current.and_then(|id| self.active_by_batch.get(&id))
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// A batch is current or waiting
    pub fn is_busy(&self) -> bool {
        self.current.is_some() || !self.queued.is_empty()
    }

    /// Contracts bought and not yet settled
    pub fn open_contracts(&self) -> usize {
        self.contracts.len()
    }

    pub fn pending_proposals(&self) -> usize {
        self.proposals.len()
    }

    pub fn locked_markets(&self) -> Vec<String> {
        match &self.policy {
            RiskPolicy::PerMarket(locks) => locks.locked(),
            RiskPolicy::Global(_) => Vec::new(),
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &BatchOutcome> {
        self.history.iter()
    }

    /// A queued request of ours whose leg has moved past it
    ///
    /// Proposals and buys only make sense for a pending leg still waiting on
    /// that exact step; subscriptions only for a contract still open.
    /// Requests without our token are never stale.
    pub fn is_stale(&self, request: &OutboundRequest) -> bool {
        match request {
            OutboundRequest::Proposal(p) => match self.owned_ref(p.passthrough.as_ref()) {
                Some(leg_ref) => !self
                    .leg(leg_ref)
                    .is_some_and(|leg| leg.status == LegStatus::Pending && leg.proposal_id.is_none()),
                None => false,
            },
            OutboundRequest::Buy(b) => match self.owned_ref(b.passthrough.as_ref()) {
                Some(leg_ref) => !self.leg(leg_ref).is_some_and(|leg| {
                    leg.status == LegStatus::Pending && leg.proposal_id.as_deref() == Some(b.buy.as_str())
                }),
                None => false,
            },
            OutboundRequest::SubscribeContract(s) => {
                self.owned_ref(s.passthrough.as_ref()).is_some()
                    && !self.contracts.contains_key(&s.contract_id)
            }
            _ => false,
        }
    }

    pub fn start(&mut self) -> Result<Step, LifecycleError> {
        let stake = self.settings.terms.stake;
        if stake <= Decimal::ZERO {
            return Err(LifecycleError::InvalidStake(stake));
        }

        match self.state {
            SessionState::Halted => Err(LifecycleError::NotRunning(self.state)),
            SessionState::Running => Ok(Step::default()),
            _ => {
                self.state = SessionState::Running;
                tracing::info!(
                    owner = %self.owner,
                    stake = %stake,
                    policy = self.policy.name(),
                    "▶️  Strategy running"
                );
                Ok(Step::default())
            }
        }
    }

    /// Stop taking entries; in-flight legs still settle
    pub fn stop(&mut self) -> Step {
        let mut step = Step::default();
        if matches!(self.state, SessionState::Idle | SessionState::Running) {
            tracing::info!(owner = %self.owner, "Stop requested, draining");
            self.begin_drain(None, &mut step);
        }
        step
    }

    pub fn halt(&mut self, reason: impl Into<String>) -> Step {
        let reason = reason.into();
        tracing::error!(
            owner = %self.owner,
            pnl = %self.cumulative_pnl,
            open_contracts = self.contracts.len(),
            "⛔ Strategy halted: {}",
            reason
        );
        self.state = SessionState::Halted;
        self.queued.clear();
        Step {
            requests: Vec::new(),
            events: vec![LifecycleEvent::Halted(reason)],
        }
    }

    /// Turn a strategy signal into a batch, sending it now or queueing it
    pub fn submit(&mut self, entry: Entry) -> Result<Step, LifecycleError> {
        if self.state != SessionState::Running {
            return Err(LifecycleError::NotRunning(self.state));
        }
        if entry.symbol.trim().is_empty() {
            return Err(LifecycleError::MissingSymbol);
        }
        if entry.legs.is_empty() {
            return Err(LifecycleError::EmptyEntry);
        }
        if let RiskPolicy::PerMarket(locks) = &self.policy {
            if locks.is_locked(&entry.symbol) {
                tracing::debug!(owner = %self.owner, symbol = %entry.symbol, "Market locked, entry skipped");
                return Ok(Step::default());
            }
        }

        let batch = entry.into_batch();
        let mut step = Step::default();

        if self.current.is_some() {
            let id = batch.id;
            self.queued.push_back(batch);
            tracing::debug!(owner = %self.owner, batch = %id, depth = self.queued.len(), "Batch queued");
            step.events.push(LifecycleEvent::BatchQueued {
                batch: id,
                depth: self.queued.len(),
            });
            return Ok(step);
        }

        self.launch(batch, &mut step);
        Ok(step)
    }

    /// Feed one venue message through the state machine
    pub fn handle(&mut self, message: &InboundMessage) -> Result<Step, LifecycleError> {
        match message {
            InboundMessage::Proposal(reply) => self.on_proposal(reply),
            InboundMessage::Buy(receipt) => self.on_buy(receipt),
            InboundMessage::ContractUpdate(update) => self.on_contract_update(update),
            InboundMessage::Error(error) => self.on_error(error),
            InboundMessage::Connected => Ok(self.on_reconnect()),
            _ => Ok(Step::default()),
        }
    }

    fn token(&self, leg_ref: LegRef) -> LegToken {
        LegToken {
            owner: self.owner.clone(),
            batch: leg_ref.batch,
            leg: leg_ref.leg,
        }
    }

    fn leg(&self, leg_ref: LegRef) -> Option<&Leg> {
        self.active_by_batch
            .get(&leg_ref.batch)
            .and_then(|batch| batch.legs.get(leg_ref.leg))
    }

    fn owned_ref(&self, token: Option<&LegToken>) -> Option<LegRef> {
        token.filter(|t| t.owner == self.owner).map(|t| LegRef {
            batch: t.batch,
            leg: t.leg,
        })
    }

    fn check_limits(&self) -> Result<(), LimitBreach> {
        match &self.policy {
            RiskPolicy::Global(limits) => limits.check(self.cumulative_pnl),
            RiskPolicy::PerMarket(_) => Ok(()),
        }
    }

    fn launch(&mut self, batch: Batch, step: &mut Step) {
        if let Err(breach) = self.check_limits() {
            self.begin_drain(Some(breach), step);
            return;
        }

        for (i, leg) in batch.legs.iter().enumerate() {
            let token = self.token(LegRef {
                batch: batch.id,
                leg: i,
            });
            step.requests.push(OutboundRequest::proposal(
                &self.settings.terms,
                &leg.symbol,
                leg.contract_type,
                leg.barrier,
                Some(token),
            ));
        }

        tracing::info!(
            owner = %self.owner,
            batch = %batch.id,
            symbol = %batch.symbol,
            legs = batch.legs.len(),
            "📤 Batch submitted"
        );
        step.events.push(LifecycleEvent::BatchSubmitted {
            batch: batch.id,
            symbol: batch.symbol.clone(),
            legs: batch.legs.len(),
        });

        self.current = Some(batch.id);
        self.active_by_batch.insert(batch.id, batch);
    }

    fn begin_drain(&mut self, breach: Option<LimitBreach>, step: &mut Step) {
        if let Some(breach) = breach {
            tracing::warn!(owner = %self.owner, pnl = %self.cumulative_pnl, "🛑 {}", breach);
            step.events.push(LifecycleEvent::LimitReached(breach));
        }
        if !self.queued.is_empty() {
            tracing::info!(owner = %self.owner, dropped = self.queued.len(), "Discarding queued batches");
            self.queued.clear();
        }
        self.state = SessionState::Draining;
        self.finish_if_drained(step);
    }

    fn finish_if_drained(&mut self, step: &mut Step) {
        if self.state == SessionState::Draining
            && self.active_by_batch.is_empty()
            && self.contracts.is_empty()
        {
            self.state = SessionState::Stopped;
            tracing::info!(owner = %self.owner, pnl = %self.cumulative_pnl, "⏹️  Strategy stopped");
            step.events.push(LifecycleEvent::Stopped);
        }
    }

    fn on_proposal(&mut self, reply: &ProposalReply) -> Result<Step, LifecycleError> {
        let Some(leg_ref) = self.owned_ref(reply.token.as_ref()) else {
            return Ok(Step::default());
        };

        {
            let leg = leg_mut(&mut self.active_by_batch, leg_ref)?;
            if leg.status != LegStatus::Pending || leg.proposal_id.is_some() {
                tracing::debug!(proposal = %reply.id, "Duplicate proposal ignored");
                return Ok(Step::default());
            }
            leg.proposal_id = Some(reply.id.clone());
        }

        if let Some((evicted, _)) = self.proposals.insert(reply.id.clone(), leg_ref) {
            tracing::warn!(proposal = %evicted, "Correlation map full, evicted oldest proposal");
        }

        tracing::debug!(
            owner = %self.owner,
            proposal = %reply.id,
            price = %reply.ask_price,
            "Buying proposal"
        );

        Ok(Step {
            requests: vec![OutboundRequest::buy(
                &reply.id,
                reply.ask_price,
                Some(self.token(leg_ref)),
            )],
            events: Vec::new(),
        })
    }

    fn on_buy(&mut self, receipt: &BuyReceipt) -> Result<Step, LifecycleError> {
        let leg_ref = match self.owned_ref(receipt.token.as_ref()) {
            Some(leg_ref) => {
                if let Some(proposal_id) = &receipt.proposal_id {
                    self.proposals.take(proposal_id);
                }
                leg_ref
            }
            None if receipt.token.is_some() => return Ok(Step::default()),
            None => {
                let Some(proposal_id) = &receipt.proposal_id else {
                    return Ok(Step::default());
                };
                self.proposals
                    .take(proposal_id)
                    .ok_or_else(|| LifecycleError::UnknownCorrelation(proposal_id.clone()))?
            }
        };

        let contract_id = receipt.contract_id;
        match self.leg(leg_ref).map(|leg| (leg.status, leg.contract_id)) {
            Some((LegStatus::Pending, _)) => {}
            Some((LegStatus::Open, Some(id))) if id == contract_id => return Ok(Step::default()),
            // a real contract exists that no leg can account for
            _ => return Err(LifecycleError::UnmatchedPurchase(contract_id)),
        }

        let rekeyed = {
            let leg = leg_mut(&mut self.active_by_batch, leg_ref)?;
            leg.open(contract_id, receipt.buy_price)?;
            rekey_leg(leg, receipt.underlying.as_deref())
        };
        if rekeyed {
            self.align_batch_symbol(leg_ref.batch);
        }

        self.contracts.insert(contract_id, leg_ref);
        tracing::info!(
            owner = %self.owner,
            batch = %leg_ref.batch,
            leg = leg_ref.leg,
            contract_id,
            "Contract purchased"
        );

        Ok(Step {
            requests: vec![OutboundRequest::subscribe_contract(
                contract_id,
                Some(self.token(leg_ref)),
            )],
            events: Vec::new(),
        })
    }

    fn on_contract_update(&mut self, update: &ContractUpdate) -> Result<Step, LifecycleError> {
        let contract_id = update.contract_id;
        let Some(leg_ref) = self.contracts.get(&contract_id).copied() else {
            if self.settled_contracts.contains(&contract_id) {
                return Ok(Step::default());
            }
            if update.is_terminal() && self.owned_ref(update.token.as_ref()).is_some() {
                return Err(LifecycleError::UnmatchedSettlement(contract_id));
            }
            return Ok(Step::default());
        };

        let rekeyed = {
            let leg = leg_mut(&mut self.active_by_batch, leg_ref)?;
            rekey_leg(leg, update.underlying.as_deref())
        };
        if rekeyed {
            self.align_batch_symbol(leg_ref.batch);
        }

        if !update.is_terminal() {
            return Ok(Step::default());
        }

        let profit = update.profit.unwrap_or_else(|| {
            tracing::warn!(contract_id, "Settlement without profit, booking zero");
            Decimal::ZERO
        });
        if let (Some(exit_digit), Some(leg)) = (update.exit_digit, self.leg(leg_ref)) {
            if leg.contract_type.wins(leg.barrier, exit_digit) != (profit > Decimal::ZERO) {
                tracing::warn!(
                    contract_id,
                    exit_digit,
                    profit = %profit,
                    "{} {} settlement disagrees with exit digit",
                    leg.contract_type,
                    leg.barrier
                );
            }
        }

        self.contracts.remove(&contract_id);
        self.settled_contracts.insert(contract_id, leg_ref.batch);

        let mut step = Step::default();
        self.complete_leg(leg_ref, Completion::Settled(profit), &mut step)?;
        Ok(step)
    }

    fn on_error(&mut self, error: &VenueError) -> Result<Step, LifecycleError> {
        let leg_ref = match self.owned_ref(error.token.as_ref()) {
            Some(leg_ref) => Some(leg_ref),
            None if error.token.is_some() => return Ok(Step::default()),
            None => error
                .echo
                .buy
                .as_ref()
                .and_then(|proposal_id| self.proposals.take(proposal_id)),
        };

        let Some(leg_ref) = leg_ref else {
            tracing::debug!(code = %error.code, msg_type = %error.msg_type, "Venue error not tied to a tracked leg");
            return Ok(Step::default());
        };

        let (status, proposal_id) = {
            let leg = leg_mut(&mut self.active_by_batch, leg_ref)?;
            (leg.status, leg.proposal_id.clone())
        };
        if let Some(proposal_id) = proposal_id {
            self.proposals.take(&proposal_id);
        }

        match status {
            LegStatus::Pending => {
                tracing::warn!(
                    owner = %self.owner,
                    batch = %leg_ref.batch,
                    leg = leg_ref.leg,
                    code = %error.code,
                    "Leg rejected: {}",
                    error.message
                );
                let mut step = Step::default();
                let reason = format!("{}: {}", error.code, error.message);
                self.complete_leg(leg_ref, Completion::Rejected(reason), &mut step)?;
                Ok(step)
            }
            LegStatus::Open => {
                tracing::warn!(
                    batch = %leg_ref.batch,
                    leg = leg_ref.leg,
                    code = %error.code,
                    "Contract update error, waiting for resubscription: {}",
                    error.message
                );
                Ok(Step::default())
            }
            LegStatus::Done => Ok(Step::default()),
        }
    }

    /// Re-arm tracking after the transport comes back
    ///
    /// Open contracts are subscribed again and legs that never got a
    /// proposal are re-proposed. A leg whose buy was sent but never
    /// acknowledged cannot be recovered and is closed as rejected.
    fn on_reconnect(&mut self) -> Step {
        let mut step = Step::default();

        let mut open: Vec<(u64, LegRef)> = self.contracts.iter().map(|(&id, &r)| (id, r)).collect();
        open.sort_by_key(|(id, _)| *id);
        for (contract_id, leg_ref) in open {
            step.requests.push(OutboundRequest::subscribe_contract(
                contract_id,
                Some(self.token(leg_ref)),
            ));
        }

        let mut stranded = Vec::new();
        if let Some(batch) = self.current.and_then(|id| self.active_by_batch.get(&id)) {
            for (i, leg) in batch.legs.iter().enumerate() {
                if leg.status != LegStatus::Pending {
                    continue;
                }
                let leg_ref = LegRef {
                    batch: batch.id,
                    leg: i,
                };
                match &leg.proposal_id {
                    None => step.requests.push(OutboundRequest::proposal(
                        &self.settings.terms,
                        &leg.symbol,
                        leg.contract_type,
                        leg.barrier,
                        Some(self.token(leg_ref)),
                    )),
                    Some(proposal_id) => stranded.push((leg_ref, proposal_id.clone())),
                }
            }
        }

        for (leg_ref, proposal_id) in stranded {
            self.proposals.take(&proposal_id);
            tracing::warn!(batch = %leg_ref.batch, leg = leg_ref.leg, "Buy unacknowledged across reconnect");
            if let Err(e) = self.complete_leg(
                leg_ref,
                Completion::Rejected("buy unacknowledged across reconnect".to_string()),
                &mut step,
            ) {
                tracing::error!("Failed to close stranded leg: {}", e);
            }
        }

        if !step.requests.is_empty() {
            tracing::info!(owner = %self.owner, requests = step.requests.len(), "Resubscribed after reconnect");
        }
        step
    }

    fn complete_leg(
        &mut self,
        leg_ref: LegRef,
        completion: Completion,
        step: &mut Step,
    ) -> Result<(), LifecycleError> {
        let settlement = {
            let leg = leg_mut(&mut self.active_by_batch, leg_ref)?;
            match completion {
                Completion::Settled(profit) => leg.settle(profit)?,
                Completion::Rejected(reason) => leg.reject(reason)?,
            }
            LegSettlement {
                batch: leg_ref.batch,
                leg: leg_ref.leg,
                symbol: leg.symbol.clone(),
                contract_type: leg.contract_type,
                barrier: leg.barrier,
                rank: leg.rank,
                contract_id: leg.contract_id,
                profit: leg.profit.unwrap_or_default(),
                rejected: leg.rejection.is_some(),
            }
        };

        tracing::info!(
            owner = %self.owner,
            symbol = %settlement.symbol,
            leg = settlement.leg,
            profit = %settlement.profit,
            "{} {} settled",
            settlement.contract_type,
            settlement.barrier
        );

        if let RiskPolicy::PerMarket(locks) = &mut self.policy {
            if !settlement.rejected {
                let symbol = settlement.symbol.clone();
                match locks.record(&symbol, settlement.profit) {
                    LockChange::Locked => step.events.push(LifecycleEvent::MarketLocked {
                        pnl: locks.pnl(&symbol),
                        symbol,
                    }),
                    LockChange::Unlocked => step.events.push(LifecycleEvent::MarketUnlocked {
                        pnl: locks.pnl(&symbol),
                        symbol,
                    }),
                    LockChange::Unchanged => {}
                }
            }
        }

        step.events.push(LifecycleEvent::LegSettled(settlement));
        self.settle_batch(leg_ref.batch, step);
        Ok(())
    }

    fn settle_batch(&mut self, batch_id: Uuid, step: &mut Step) {
        let Some(net) = self
            .active_by_batch
            .get_mut(&batch_id)
            .and_then(Batch::try_settle)
        else {
            return;
        };
        let Some(batch) = self.active_by_batch.remove(&batch_id) else {
            return;
        };

        self.cumulative_pnl += net;
        let outcome = BatchOutcome::from_batch(&batch, net, self.cumulative_pnl);

        tracing::info!(
            owner = %self.owner,
            batch = %batch_id,
            symbol = %batch.symbol,
            net = %net,
            cumulative = %self.cumulative_pnl,
            "✅ Batch settled"
        );

        self.history.push_back(outcome.clone());
        while self.history.len() > self.settings.history_capacity {
            self.history.pop_front();
        }
        step.events.push(LifecycleEvent::BatchSettled(outcome));

        if self.current == Some(batch_id) {
            self.current = None;
        }
        self.advance(step);
    }

    fn advance(&mut self, step: &mut Step) {
        match self.state {
            SessionState::Running => {
                if let Err(breach) = self.check_limits() {
                    self.begin_drain(Some(breach), step);
                    return;
                }
                if self.current.is_none() {
                    if let Some(next) = self.queued.pop_front() {
                        tracing::debug!(batch = %next.id, remaining = self.queued.len(), "Promoting queued batch");
                        self.launch(next, step);
                    }
                }
            }
            SessionState::Draining => self.finish_if_drained(step),
            _ => {}
        }
    }

    fn align_batch_symbol(&mut self, batch_id: Uuid) {
        if let Some(batch) = self.active_by_batch.get_mut(&batch_id) {
            if let Some(first) = batch.legs.first().map(|leg| leg.symbol.clone()) {
                if batch.legs.iter().all(|leg| leg.symbol == first) {
                    batch.symbol = first;
                }
            }
        }
    }
}

fn leg_mut(active: &mut HashMap<Uuid, Batch>, leg_ref: LegRef) -> Result<&mut Leg, LifecycleError> {
    active
        .get_mut(&leg_ref.batch)
        .and_then(|batch| batch.legs.get_mut(leg_ref.leg))
        .ok_or(LifecycleError::MissingLeg {
            batch: leg_ref.batch,
            leg: leg_ref.leg,
        })
}

/// Adopt the venue-reported symbol; returns whether it changed
fn rekey_leg(leg: &mut Leg, reported: Option<&str>) -> bool {
    match reported {
        Some(symbol) if !symbol.is_empty() && symbol != leg.symbol => {
            tracing::warn!(
                requested = %leg.symbol,
                reported = symbol,
                "Symbol mismatch, re-keying to venue value"
            );
            leg.symbol = symbol.to_string();
            true
        }
        _ => false,
    }
}
