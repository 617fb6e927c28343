//! Dependencies injected into every ledger reducer.

use crate::config::MarketplaceConfig;
use crate::ledger::Ledger;
use marketplace_core::order::PickupCode;
use marketplace_core::{Clock, CodeGenerator, MarketResult, MarketplaceError, RandomCodes, SystemClock};
use std::sync::Arc;

/// Clock, code source and policy shared by the reducers
#[derive(Clone)]
pub struct LedgerEnvironment {
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Code candidate source
    pub codes: Arc<dyn CodeGenerator>,
    /// Policy values
    pub config: MarketplaceConfig,
}

impl LedgerEnvironment {
    /// Creates an environment
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        codes: Arc<dyn CodeGenerator>,
        config: MarketplaceConfig,
    ) -> Self {
        Self {
            clock,
            codes,
            config,
        }
    }

    /// Wall clock, random codes, given policy
    #[must_use]
    pub fn production(config: MarketplaceConfig) -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(RandomCodes), config)
    }

    /// Draws a code that is neither active in the ledger nor already
    /// `reserved` by the command being decided.
    ///
    /// # Errors
    ///
    /// [`MarketplaceError::PickupCodeExhausted`] once the configured number
    /// of candidates all collided.
    pub fn allocate_code(
        &self,
        ledger: &Ledger,
        reserved: &[PickupCode],
    ) -> MarketResult<PickupCode> {
        let attempts = self.config.pickup_code_attempts;
        for attempt in 1..=attempts {
            let candidate = PickupCode::new(self.codes.generate(self.config.pickup_code_length));
            if ledger.code_holder(&candidate).is_none() && !reserved.contains(&candidate) {
                return Ok(candidate);
            }
            tracing::debug!(attempt, "pickup code collision, regenerating");
        }
        Err(MarketplaceError::PickupCodeExhausted { attempts })
    }
}

impl std::fmt::Debug for LedgerEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerEnvironment")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
