use crate::{
    config::StoreConfig,
    errors::ServiceError,
    models::{BankInstructions, CheckoutData, Order},
};
use async_trait::async_trait;
use std::sync::Arc;

use super::{ManualAction, PaymentGateway, PaymentOutcome};

/// Manual bank-transfer adapter. No network call: the order is placed as
/// pending and the store's bank details are surfaced immediately.
pub struct TransferGateway {
    store: Arc<StoreConfig>,
}

impl TransferGateway {
    pub fn new(store: Arc<StoreConfig>) -> Self {
        Self { store }
    }

    pub fn instructions(&self) -> Result<BankInstructions, ServiceError> {
        match &self.store.payments.transfer {
            Some(cfg) if cfg.enabled => Ok(BankInstructions {
                bank_name: cfg.bank_name.clone(),
                account_holder: cfg.account_holder.clone(),
                account_number: cfg.account_number.clone(),
            }),
            _ => Err(ServiceError::GatewayNotConfigured(
                "bank transfer is not enabled for this store".to_string(),
            )),
        }
    }
}

#[async_trait]
impl PaymentGateway for TransferGateway {
    async fn attempt(
        &self,
        _order: &Order,
        _checkout: &CheckoutData,
    ) -> Result<PaymentOutcome, ServiceError> {
        let instructions = self.instructions()?;
        Ok(PaymentOutcome::PendingManualAction(
            ManualAction::BankInstructions(instructions),
        ))
    }
}
