//! BoothPay wallet service
//!
//! Wires a durable ledger engine to the marketplace money flows built on it:
//! event escrow (hold, then capture or release) and table sales with a
//! platform fee.

pub mod config;
pub mod wallet;
pub mod workflows;

pub use config::WalletConfig;
pub use wallet::Wallet;
pub use workflows::{
    EscrowSettlement, EscrowWorkflow, FeeSplit, SaleSettlement, SaleSplit, WorkflowError,
    WorkflowResult,
};
