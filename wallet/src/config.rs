//! Wallet service configuration.

use std::path::PathBuf;

use boothpay_common::{AccountId, Currency, LedgerError, Result};
use boothpay_ledger::LedgerConfig;

/// Largest platform fee: the whole sale.
pub const MAX_FEE_BPS: u32 = 10_000;

/// Main wallet configuration.
#[derive(Debug, Clone)]
pub struct WalletConfig {
    /// Journal file backing the ledger.
    pub journal_path: PathBuf,
    /// Currency all amounts are denominated in.
    pub currency: Currency,
    /// Account credited with platform fees.
    pub platform_account: AccountId,
    /// Platform fee on table sales, in basis points.
    pub platform_fee_bps: u32,
    /// Log level.
    pub log_level: String,
    /// Ledger engine configuration.
    pub ledger: LedgerConfig,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            journal_path: PathBuf::from("data/wallet.jsonl"),
            currency: Currency::usd(),
            platform_account: AccountId::new("platform"),
            platform_fee_bps: 1_000,
            log_level: "info".to_string(),
            ledger: LedgerConfig::default(),
        }
    }
}

impl WalletConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("WALLET_JOURNAL_PATH") {
            config.journal_path = PathBuf::from(path);
        }

        if let Ok(code) = std::env::var("WALLET_CURRENCY") {
            config.currency = Currency::new(code.to_uppercase());
        }

        if let Ok(account) = std::env::var("WALLET_PLATFORM_ACCOUNT") {
            config.platform_account = AccountId::new(account);
        }

        if let Ok(bps) = std::env::var("WALLET_PLATFORM_FEE_BPS") {
            if let Ok(bps) = bps.parse() {
                config.platform_fee_bps = bps;
            }
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config.ledger = LedgerConfig::from_env();
        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.journal_path.as_os_str().is_empty() {
            return Err(LedgerError::ConfigurationError(
                "Journal path cannot be empty".to_string(),
            ));
        }

        if self.currency.code().len() != 3 {
            return Err(LedgerError::ConfigurationError(format!(
                "Currency must be a 3-letter code, got {:?}",
                self.currency.code()
            )));
        }

        if !self.platform_account.is_valid() {
            return Err(LedgerError::ConfigurationError(format!(
                "Invalid platform account {:?}",
                self.platform_account.as_str()
            )));
        }

        if self.platform_fee_bps > MAX_FEE_BPS {
            return Err(LedgerError::ConfigurationError(format!(
                "Platform fee {} bps exceeds {}",
                self.platform_fee_bps, MAX_FEE_BPS
            )));
        }

        self.ledger.validate()
    }
}
