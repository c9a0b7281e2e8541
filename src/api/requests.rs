use crate::models::{ContractType, Digit, LegToken};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Every request the bot sends to the venue
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundRequest {
    Proposal(ProposalRequest),
    Buy(BuyRequest),
    SubscribeContract(ContractSubscription),
    Ping(Ping),
    Authorize(Authorize),
    Balance(BalanceRequest),
    ActiveSymbols(ActiveSymbolsRequest),
    TicksHistory(TicksHistoryRequest),
    ForgetAll(ForgetAll),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProposalRequest {
    pub proposal: u8,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub basis: &'static str,
    pub contract_type: ContractType,
    pub barrier: Digit,
    pub currency: String,
    pub duration: u32,
    pub duration_unit: String,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passthrough: Option<LegToken>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuyRequest {
    pub buy: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passthrough: Option<LegToken>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractSubscription {
    pub proposal_open_contract: u8,
    pub contract_id: u64,
    pub subscribe: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passthrough: Option<LegToken>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ping {
    pub ping: u8,
}

#[derive(Clone, PartialEq, Serialize)]
pub struct Authorize {
    pub authorize: String,
}

// keep the token out of logs
impl fmt::Debug for Authorize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorize").field("authorize", &"***").finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceRequest {
    pub balance: u8,
    pub subscribe: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveSymbolsRequest {
    pub active_symbols: &'static str,
    pub product_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicksHistoryRequest {
    pub ticks_history: String,
    pub count: usize,
    pub end: &'static str,
    pub style: &'static str,
    pub adjust_start_time: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForgetAll {
    pub forget_all: &'static str,
}

/// Contract terms shared by every proposal of one strategy
#[derive(Debug, Clone, PartialEq)]
pub struct ContractTerms {
    pub stake: Decimal,
    pub currency: String,
    pub duration: u32,
    pub duration_unit: String,
}

impl OutboundRequest {
    pub fn proposal(
        terms: &ContractTerms,
        symbol: &str,
        contract_type: ContractType,
        barrier: Digit,
        token: Option<LegToken>,
    ) -> Self {
        OutboundRequest::Proposal(ProposalRequest {
            proposal: 1,
            amount: terms.stake,
            basis: "stake",
            contract_type,
            barrier,
            currency: terms.currency.clone(),
            duration: terms.duration,
            duration_unit: terms.duration_unit.clone(),
            symbol: symbol.to_string(),
            passthrough: token,
        })
    }

    pub fn buy(proposal_id: &str, price: Decimal, token: Option<LegToken>) -> Self {
        OutboundRequest::Buy(BuyRequest {
            buy: proposal_id.to_string(),
            price,
            passthrough: token,
        })
    }

    pub fn subscribe_contract(contract_id: u64, token: Option<LegToken>) -> Self {
        OutboundRequest::SubscribeContract(ContractSubscription {
            proposal_open_contract: 1,
            contract_id,
            subscribe: 1,
            passthrough: token,
        })
    }

    pub fn ping() -> Self {
        OutboundRequest::Ping(Ping { ping: 1 })
    }

    pub fn authorize(token: &str) -> Self {
        OutboundRequest::Authorize(Authorize {
            authorize: token.to_string(),
        })
    }

    pub fn balance() -> Self {
        OutboundRequest::Balance(BalanceRequest {
            balance: 1,
            subscribe: 1,
        })
    }

    pub fn active_symbols() -> Self {
        OutboundRequest::ActiveSymbols(ActiveSymbolsRequest {
            active_symbols: "full",
            product_type: "basic",
        })
    }

    /// Backfill `count` ticks and keep the stream subscribed
    pub fn ticks_history(symbol: &str, count: usize, subscribe: bool) -> Self {
        OutboundRequest::TicksHistory(TicksHistoryRequest {
            ticks_history: symbol.to_string(),
            count,
            end: "latest",
            style: "ticks",
            adjust_start_time: 1,
            subscribe: subscribe.then_some(1),
        })
    }

    pub fn forget_all_ticks() -> Self {
        OutboundRequest::ForgetAll(ForgetAll { forget_all: "ticks" })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutboundRequest::Proposal(_) => "proposal",
            OutboundRequest::Buy(_) => "buy",
            OutboundRequest::SubscribeContract(_) => "proposal_open_contract",
            OutboundRequest::Ping(_) => "ping",
            OutboundRequest::Authorize(_) => "authorize",
            OutboundRequest::Balance(_) => "balance",
            OutboundRequest::ActiveSymbols(_) => "active_symbols",
            OutboundRequest::TicksHistory(_) => "ticks_history",
            OutboundRequest::ForgetAll(_) => "forget_all",
        }
    }

    /// Passthrough token of a leg-scoped request
    pub fn token(&self) -> Option<&LegToken> {
        match self {
            OutboundRequest::Proposal(p) => p.passthrough.as_ref(),
            OutboundRequest::Buy(b) => b.passthrough.as_ref(),
            OutboundRequest::SubscribeContract(s) => s.passthrough.as_ref(),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
