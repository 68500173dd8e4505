//! Transaction recovery: batched bulk resend and the legacy single-message
//! protocol.

pub mod batch_resend;
pub mod batch_workflow;
pub mod legacy_resend;

use crate::error::ResendError;
use batch_resend::BatchResendManager;
use legacy_resend::LegacyResendManager;
use std::sync::Arc;

/// The request-serving half of the resend protocol, bundled so a transport
/// layer can take ownership of it and dispatch inbound peer requests.
pub struct ResendServices {
    pub batch: Arc<BatchResendManager>,
    pub legacy: Arc<LegacyResendManager>,
}

impl ResendServices {
    pub fn new(batch: Arc<BatchResendManager>, legacy: Arc<LegacyResendManager>) -> Self {
        Self { batch, legacy }
    }

    /// Recover anything a previous run staged but never committed.
    pub async fn promote_staged(&self) -> Result<u64, ResendError> {
        self.batch.promote_staged().await
    }
}
