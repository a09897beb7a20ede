//! Wallet service handle wiring the store, the engine and the workflows.

use std::sync::Arc;

use boothpay_common::{Amount, Money, Result};
use boothpay_ledger::{FileStore, LedgerEngine, LedgerStore};
use rust_decimal::Decimal;
use tracing::info;

use crate::config::WalletConfig;
use crate::workflows::{EscrowWorkflow, FeeSplit};

/// The wallet service.
pub struct Wallet {
    /// Configuration.
    config: WalletConfig,
    /// Shared ledger engine.
    engine: Arc<LedgerEngine>,
}

impl Wallet {
    /// Open the journal named in the configuration and build the engine over it.
    pub fn open(config: WalletConfig) -> Result<Self> {
        config.validate()?;
        let store = FileStore::open(&config.journal_path)?;
        info!(
            currency = %config.currency,
            platform_account = %config.platform_account,
            fee_bps = config.platform_fee_bps,
            strict_accounts = config.ledger.strict_accounts,
            "Wallet ready"
        );
        Ok(Self::with_store(config, Arc::new(store)))
    }

    /// Build a wallet over an existing store.
    pub fn with_store(config: WalletConfig, store: Arc<dyn LedgerStore>) -> Self {
        let engine = Arc::new(LedgerEngine::new(store, config.ledger.clone()));
        Self { config, engine }
    }

    /// Configuration.
    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    /// The ledger engine.
    pub fn engine(&self) -> &Arc<LedgerEngine> {
        &self.engine
    }

    pub fn escrow(&self) -> EscrowWorkflow {
        EscrowWorkflow::new(self.engine.clone())
    }

    pub fn fee_split(&self) -> Result<FeeSplit> {
        FeeSplit::new(
            self.engine.clone(),
            self.config.platform_account.clone(),
            self.config.platform_fee_bps,
        )
    }

    /// Convert a major-unit decimal into minor units of the wallet currency.
    pub fn amount(&self, major: Decimal) -> Result<Amount> {
        Amount::from_major(major, &self.config.currency)
    }

    /// Present minor units in the wallet currency.
    pub fn money(&self, amount: Amount) -> Money {
        Money::new(amount, self.config.currency.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boothpay_common::{AccountId, LedgerError, RelatedId};
    use std::str::FromStr;

    fn config_in(dir: &tempfile::TempDir) -> WalletConfig {
        WalletConfig {
            journal_path: dir.path().join("wallet.jsonl"),
            ..WalletConfig::default()
        }
    }

    #[test]
    fn test_amount_uses_wallet_currency() {
        let dir = tempfile::tempdir().unwrap();
        let wallet = Wallet::open(config_in(&dir)).unwrap();

        let amount = wallet.amount(Decimal::from_str("12.50").unwrap()).unwrap();
        assert_eq!(amount.minor(), 1_250);
        assert_eq!(wallet.money(amount).to_string(), "12.50 USD");
        assert!(matches!(
            wallet.amount(Decimal::from_str("0.001").unwrap()),
            Err(LedgerError::InvalidPrecision { .. })
        ));
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = WalletConfig {
            platform_fee_bps: 20_000,
            ..config_in(&dir)
        };
        assert!(Wallet::open(config).is_err());
    }

    #[tokio::test]
    async fn test_sale_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let buyer = AccountId::new("owner_1");
        let seller = AccountId::new("host_1");

        {
            let wallet = Wallet::open(config_in(&dir)).unwrap();
            wallet
                .engine()
                .deposit(&buyer, Amount::from_minor(5_000), None)
                .await
                .unwrap();
            wallet
                .fee_split()
                .unwrap()
                .settle_sale(&buyer, &seller, Amount::from_minor(2_000), &RelatedId::new("table-1"))
                .await
                .unwrap();
        }

        let wallet = Wallet::open(config_in(&dir)).unwrap();
        let engine = wallet.engine();
        assert_eq!(engine.get_balance(&buyer).await.unwrap().balance.minor(), 3_000);
        assert_eq!(engine.get_balance(&seller).await.unwrap().balance.minor(), 1_800);
        assert_eq!(
            engine
                .get_balance(&wallet.config().platform_account)
                .await
                .unwrap()
                .balance
                .minor(),
            200
        );
    }
}
