use crate::models::{Digit, LegToken, Tick};
use rust_decimal::Decimal;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::str::FromStr;

/// Decoded venue frame, one variant per message kind the bot consumes
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Tick(TickUpdate),
    History(HistoryBatch),
    Proposal(ProposalReply),
    Buy(BuyReceipt),
    ContractUpdate(ContractUpdate),
    Authorized(Account),
    Balance(BalanceUpdate),
    ActiveSymbols(Vec<SymbolInfo>),
    Error(VenueError),
    Pong,
    /// Transport (re)opened; emitted by the connection manager itself
    Connected,
    /// Transport lost; emitted by the connection manager itself
    Disconnected,
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickUpdate {
    pub tick: Tick,
    pub pip_size: Option<u32>,
    /// Stamped by the market feed before fan-out
    pub digit: Option<Digit>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryBatch {
    pub symbol: String,
    pub prices: Vec<Decimal>,
    pub pip_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProposalReply {
    pub id: String,
    pub ask_price: Decimal,
    pub display_value: Option<String>,
    pub symbol: Option<String>,
    pub token: Option<LegToken>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuyReceipt {
    pub contract_id: u64,
    pub proposal_id: Option<String>,
    pub buy_price: Option<Decimal>,
    pub underlying: Option<String>,
    pub token: Option<LegToken>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContractUpdate {
    pub contract_id: u64,
    pub status: Option<String>,
    pub is_sold: bool,
    pub is_expired: bool,
    pub profit: Option<Decimal>,
    pub underlying: Option<String>,
    pub exit_tick: Option<Decimal>,
    /// Stamped by the market feed from `exit_tick`
    pub exit_digit: Option<Digit>,
    pub token: Option<LegToken>,
}

impl ContractUpdate {
    pub fn is_terminal(&self) -> bool {
        self.is_sold
            || self.is_expired
            || matches!(self.status.as_deref(), Some("sold" | "expired" | "won" | "lost"))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub loginid: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BalanceUpdate {
    #[serde(deserialize_with = "de_decimal")]
    pub balance: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub pip: Option<Decimal>,
    #[serde(default)]
    pub display_decimals: Option<u32>,
    #[serde(default)]
    pub spot_decimals: Option<u32>,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub submarket: Option<String>,
    #[serde(default)]
    pub market_display_name: Option<String>,
    #[serde(default)]
    pub submarket_display_name: Option<String>,
}

impl SymbolInfo {
    /// Continuous synthetic indices, the markets digit contracts trade on
    pub fn is_continuous_synthetic(&self) -> bool {
        let synthetic = self.market_display_name.as_deref() == Some("Synthetic Indices")
            || self.market.as_deref() == Some("synthetic_index");
        let continuous = self.submarket_display_name.as_deref() == Some("Continuous Indices")
            || self
                .submarket
                .as_deref()
                .is_some_and(|s| s.contains("continuous"));
        synthetic && continuous
    }

    /// Pip size, falling back to `10^-decimals` and then to 0.01
    pub fn pip_size(&self) -> Decimal {
        match self.pip {
            Some(pip) if pip > Decimal::ZERO => pip,
            _ => {
                let decimals = self
                    .display_decimals
                    .or(self.spot_decimals)
                    .filter(|&d| d > 0)
                    .unwrap_or(2);
                Decimal::new(1, decimals)
            }
        }
    }
}

/// A rejection tied to the request echoed in `echo_req`
#[derive(Debug, Clone, PartialEq)]
pub struct VenueError {
    pub code: String,
    pub message: String,
    pub msg_type: String,
    pub echo: EchoRequest,
    pub token: Option<LegToken>,
}

/// The subset of `echo_req` used to route errors
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EchoRequest {
    pub symbol: Option<String>,
    pub proposal: bool,
    pub buy: Option<String>,
    pub contract_id: Option<u64>,
    pub ticks_history: Option<String>,
}

impl EchoRequest {
    fn from_value(value: Option<&Value>) -> Self {
        let Some(Value::Object(map)) = value else {
            return Self::default();
        };
        Self {
            symbol: str_field(map, "symbol"),
            proposal: map.get("proposal").is_some_and(truthy),
            buy: str_field(map, "buy"),
            contract_id: map.get("contract_id").and_then(Value::as_u64),
            ticks_history: str_field(map, "ticks_history"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    msg_type: String,
    #[serde(default)]
    error: Option<ErrorBody>,
    #[serde(default)]
    echo_req: Option<Value>,
    #[serde(default)]
    passthrough: Option<Value>,
    #[serde(flatten)]
    body: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct RawTick {
    symbol: String,
    #[serde(deserialize_with = "de_decimal")]
    quote: Decimal,
    #[serde(default)]
    epoch: i64,
    #[serde(default)]
    pip_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawHistory {
    #[serde(default)]
    prices: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawProposal {
    id: String,
    #[serde(deserialize_with = "de_decimal")]
    ask_price: Decimal,
    #[serde(default)]
    display_value: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawBuy {
    contract_id: u64,
    #[serde(default, deserialize_with = "de_opt_decimal")]
    buy_price: Option<Decimal>,
    #[serde(default)]
    underlying: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawContract {
    contract_id: u64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, deserialize_with = "de_flag")]
    is_sold: bool,
    #[serde(default, deserialize_with = "de_flag")]
    is_expired: bool,
    #[serde(default, deserialize_with = "de_opt_decimal")]
    profit: Option<Decimal>,
    #[serde(default)]
    underlying: Option<String>,
    #[serde(default, deserialize_with = "de_opt_decimal")]
    exit_tick: Option<Decimal>,
}

impl InboundMessage {
    /// Decode one text frame
    pub fn decode(text: &str) -> serde_json::Result<Self> {
        let envelope: Envelope = serde_json::from_str(text)?;
        Self::from_envelope(envelope)
    }

    fn from_envelope(mut env: Envelope) -> serde_json::Result<Self> {
        let echo = env.echo_req.as_ref();
        let token = extract_token(env.passthrough.as_ref(), echo);

        if let Some(error) = env.error.take() {
            return Ok(InboundMessage::Error(VenueError {
                code: error.code,
                message: error.message,
                msg_type: env.msg_type,
                echo: EchoRequest::from_value(echo),
                token,
            }));
        }

        let echo_symbol = echo
            .and_then(Value::as_object)
            .and_then(|map| str_field(map, "symbol"));
        let pip_size = env.body.get("pip_size").and_then(Value::as_u64).map(|p| p as u32);

        let message = match env.msg_type.as_str() {
            "tick" => {
                let raw: RawTick = take_body(&mut env.body, "tick")?;
                InboundMessage::Tick(TickUpdate {
                    pip_size: raw.pip_size.or(pip_size),
                    digit: None,
                    tick: Tick {
                        symbol: raw.symbol,
                        quote: raw.quote,
                        epoch: raw.epoch,
                    },
                })
            }
            "history" => {
                let raw: RawHistory = take_body(&mut env.body, "history")?;
                let symbol = echo
                    .and_then(Value::as_object)
                    .and_then(|map| str_field(map, "ticks_history"))
                    .ok_or_else(|| <serde_json::Error as de::Error>::custom("history without ticks_history echo"))?;
                InboundMessage::History(HistoryBatch {
                    symbol,
                    prices: raw.prices.iter().filter_map(decimal_from_value).collect(),
                    pip_size,
                })
            }
            "proposal" => {
                let raw: RawProposal = take_body(&mut env.body, "proposal")?;
                InboundMessage::Proposal(ProposalReply {
                    id: raw.id,
                    ask_price: raw.ask_price,
                    display_value: raw.display_value.map(|v| match v {
                        Value::String(s) => s,
                        other => other.to_string(),
                    }),
                    symbol: echo_symbol,
                    token,
                })
            }
            "buy" => {
                let raw: RawBuy = take_body(&mut env.body, "buy")?;
                let proposal_id = EchoRequest::from_value(echo).buy;
                InboundMessage::Buy(BuyReceipt {
                    contract_id: raw.contract_id,
                    proposal_id,
                    buy_price: raw.buy_price,
                    underlying: raw.underlying,
                    token,
                })
            }
            "proposal_open_contract" => {
                let raw: RawContract = take_body(&mut env.body, "proposal_open_contract")?;
                InboundMessage::ContractUpdate(ContractUpdate {
                    contract_id: raw.contract_id,
                    status: raw.status,
                    is_sold: raw.is_sold,
                    is_expired: raw.is_expired,
                    profit: raw.profit,
                    underlying: raw.underlying,
                    exit_tick: raw.exit_tick,
                    exit_digit: None,
                    token,
                })
            }
            "authorize" => InboundMessage::Authorized(take_body(&mut env.body, "authorize")?),
            "balance" => InboundMessage::Balance(take_body(&mut env.body, "balance")?),
            "active_symbols" => {
                InboundMessage::ActiveSymbols(take_body(&mut env.body, "active_symbols")?)
            }
            "ping" => InboundMessage::Pong,
            other => InboundMessage::Other(other.to_string()),
        };

        Ok(message)
    }

    pub fn kind(&self) -> &str {
        match self {
            InboundMessage::Tick(_) => "tick",
            InboundMessage::History(_) => "history",
            InboundMessage::Proposal(_) => "proposal",
            InboundMessage::Buy(_) => "buy",
            InboundMessage::ContractUpdate(_) => "proposal_open_contract",
            InboundMessage::Authorized(_) => "authorize",
            InboundMessage::Balance(_) => "balance",
            InboundMessage::ActiveSymbols(_) => "active_symbols",
            InboundMessage::Error(_) => "error",
            InboundMessage::Pong => "ping",
            InboundMessage::Connected => "connected",
            InboundMessage::Disconnected => "disconnected",
            InboundMessage::Other(kind) => kind,
        }
    }
}

fn take_body<T: serde::de::DeserializeOwned>(
    body: &mut Map<String, Value>,
    key: &str,
) -> serde_json::Result<T> {
    let value = body
        .remove(key)
        .ok_or_else(|| <serde_json::Error as de::Error>::custom(format!("missing `{}` body", key)))?;
    serde_json::from_value(value)
}

fn extract_token(passthrough: Option<&Value>, echo: Option<&Value>) -> Option<LegToken> {
    passthrough
        .or_else(|| echo.and_then(|e| e.get("passthrough")))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

fn str_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        _ => false,
    }
}

/// Exact decimal from a JSON number or numeric string
///
/// Numbers go through their shortest textual form, so `1234.56` stays
/// `1234.56` instead of picking up binary float noise.
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn de_decimal<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
    let value = Value::deserialize(deserializer)?;
    decimal_from_value(&value).ok_or_else(|| de::Error::custom(format!("not a decimal: {}", value)))
}

fn de_opt_decimal<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Decimal>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(decimal_from_value(&value))
}

fn de_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(truthy(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_decode_tick() {
        let frame = r#"{"msg_type":"tick","tick":{"symbol":"R_100","quote":1234.56,"epoch":1700000000,"pip_size":2},"echo_req":{"ticks":"R_100"}}"#;
        match InboundMessage::decode(frame).unwrap() {
            InboundMessage::Tick(update) => {
                assert_eq!(update.tick.symbol, "R_100");
                assert_eq!(update.tick.quote, dec!(1234.56));
                assert_eq!(update.pip_size, Some(2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_history_takes_symbol_from_echo() {
        let frame = r#"{"msg_type":"history","history":{"prices":[10.1,"10.25",10.3],"times":[1,2,3]},"echo_req":{"ticks_history":"R_50","count":1000},"pip_size":2}"#;
        match InboundMessage::decode(frame).unwrap() {
            InboundMessage::History(batch) => {
                assert_eq!(batch.symbol, "R_50");
                assert_eq!(batch.prices, vec![dec!(10.1), dec!(10.25), dec!(10.3)]);
                assert_eq!(batch.pip_size, Some(2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_proposal_with_passthrough() {
        let batch = Uuid::new_v4();
        let frame = format!(
            r#"{{"msg_type":"proposal","proposal":{{"id":"p-1","ask_price":10,"display_value":"10.00"}},"echo_req":{{"proposal":1,"symbol":"R_10"}},"passthrough":{{"owner":"rank-match","batch":"{}","leg":3}}}}"#,
            batch
        );
        match InboundMessage::decode(&frame).unwrap() {
            InboundMessage::Proposal(reply) => {
                assert_eq!(reply.id, "p-1");
                assert_eq!(reply.ask_price, dec!(10));
                assert_eq!(reply.symbol.as_deref(), Some("R_10"));
                let token = reply.token.unwrap();
                assert_eq!(token.batch, batch);
                assert_eq!(token.leg, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_buy_reads_proposal_from_echo() {
        let frame = r#"{"msg_type":"buy","buy":{"contract_id":555,"buy_price":10},"echo_req":{"buy":"p-1","price":10}}"#;
        match InboundMessage::decode(frame).unwrap() {
            InboundMessage::Buy(receipt) => {
                assert_eq!(receipt.contract_id, 555);
                assert_eq!(receipt.proposal_id.as_deref(), Some("p-1"));
                assert!(receipt.token.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_contract_terminal_flags() {
        let frame = r#"{"msg_type":"proposal_open_contract","proposal_open_contract":{"contract_id":555,"status":"open","is_sold":1,"profit":-3.2,"underlying":"R_100"}}"#;
        match InboundMessage::decode(frame).unwrap() {
            InboundMessage::ContractUpdate(update) => {
                assert!(update.is_terminal());
                assert_eq!(update.profit, Some(dec!(-3.2)));
            }
            other => panic!("unexpected {:?}", other),
        }

        let open = r#"{"msg_type":"proposal_open_contract","proposal_open_contract":{"contract_id":1,"status":"open","is_sold":0,"profit":0.4}}"#;
        match InboundMessage::decode(open).unwrap() {
            InboundMessage::ContractUpdate(update) => assert!(!update.is_terminal()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_error_keeps_echo() {
        let frame = r#"{"msg_type":"proposal","error":{"code":"InvalidSymbol","message":"Symbol R_0 invalid"},"echo_req":{"proposal":1,"symbol":"R_0"}}"#;
        match InboundMessage::decode(frame).unwrap() {
            InboundMessage::Error(err) => {
                assert_eq!(err.code, "InvalidSymbol");
                assert_eq!(err.msg_type, "proposal");
                assert!(err.echo.proposal);
                assert_eq!(err.echo.symbol.as_deref(), Some("R_0"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_active_symbols_pip() {
        let frame = r#"{"msg_type":"active_symbols","active_symbols":[
            {"symbol":"R_100","display_name":"Volatility 100 Index","pip":0.01,"market":"synthetic_index","submarket":"random_index","market_display_name":"Synthetic Indices","submarket_display_name":"Continuous Indices"},
            {"symbol":"1HZ10V","display_name":"Volatility 10 (1s) Index","display_decimals":3,"market":"synthetic_index","submarket":"continuous_indices"},
            {"symbol":"frxEURUSD","display_name":"EUR/USD","pip":0.00001,"market":"forex","submarket":"major_pairs"}
        ]}"#;
        match InboundMessage::decode(frame).unwrap() {
            InboundMessage::ActiveSymbols(symbols) => {
                assert_eq!(symbols.len(), 3);
                assert_eq!(symbols[0].pip_size(), dec!(0.01));
                assert_eq!(symbols[1].pip_size(), dec!(0.001));
                assert!(symbols[0].is_continuous_synthetic());
                assert!(symbols[1].is_continuous_synthetic());
                assert!(!symbols[2].is_continuous_synthetic());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_unknown_and_malformed() {
        let other = InboundMessage::decode(r#"{"msg_type":"forget_all","forget_all":[]}"#).unwrap();
        assert_eq!(other, InboundMessage::Other("forget_all".to_string()));
        assert_eq!(
            InboundMessage::decode(r#"{"msg_type":"ping","ping":"pong"}"#).unwrap(),
            InboundMessage::Pong
        );
        assert!(InboundMessage::decode("not json").is_err());
        assert!(InboundMessage::decode(r#"{"msg_type":"tick"}"#).is_err());
    }
}
