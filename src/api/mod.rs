// Venue wire protocol: typed inbound frames and outbound requests
pub mod messages;
pub mod requests;

pub use messages::{
    Account, BalanceUpdate, BuyReceipt, ContractUpdate, EchoRequest, HistoryBatch,
    InboundMessage, ProposalReply, SymbolInfo, TickUpdate, VenueError,
};
pub use requests::{
    BuyRequest, ContractSubscription, ContractTerms, OutboundRequest, ProposalRequest,
};
