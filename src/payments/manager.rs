//! Payment manager
//!
//! Orchestrates a unified charge/verify surface over the configured
//! providers. A charge walks the provider preference chain (explicit
//! override, else configured default then fallback) and advances to the
//! next candidate only on transient failure kinds; a business rejection
//! surfaces immediately so fallback never masks it. Successful charges
//! leave a short-TTL session entry so later verify calls and webhooks route
//! back to the provider that actually serviced the charge.

use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::cache::Cache;
use crate::cache::keys::{HealthKey, SessionKey};
use crate::config::ProviderConfig;
use crate::database::transaction_store::{
    ApplyOutcome, NewTransaction, StatusTransition, TransactionStore,
};
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::normalize::{ChannelMapper, StatusNormalizer};
use crate::payments::registry::ProviderRegistry;
use crate::payments::traits::Driver;
use crate::payments::types::{
    ChargeRequest, ChargeResult, SessionCacheEntry, VerifiedPayment,
};

pub struct PaymentManager {
    registry: Arc<ProviderRegistry>,
    store: Arc<dyn TransactionStore>,
    sessions: Arc<dyn Cache<SessionCacheEntry>>,
    health: Arc<dyn Cache<bool>>,
    normalizer: Arc<StatusNormalizer>,
    channels: Arc<ChannelMapper>,
    settings: ProviderConfig,
}

impl PaymentManager {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        store: Arc<dyn TransactionStore>,
        sessions: Arc<dyn Cache<SessionCacheEntry>>,
        health: Arc<dyn Cache<bool>>,
        normalizer: Arc<StatusNormalizer>,
        channels: Arc<ChannelMapper>,
        settings: ProviderConfig,
    ) -> Self {
        Self {
            registry,
            store,
            sessions,
            health,
            normalizer,
            channels,
            settings,
        }
    }

    /// The ordered provider chain for one charge: explicit override, else
    /// `[default, fallback]`, else `[default]`.
    fn provider_chain(&self, chain_override: Option<Vec<String>>) -> Vec<String> {
        match chain_override {
            Some(chain) if !chain.is_empty() => chain,
            _ => {
                let mut chain = vec![self.settings.default_provider.clone()];
                if let Some(fallback) = &self.settings.fallback_provider {
                    chain.push(fallback.clone());
                }
                chain
            }
        }
    }

    /// Initiate a charge against the provider chain.
    ///
    /// An unknown provider name in the chain fails immediately with
    /// `DriverNotFound`: that is a configuration error, not a transient
    /// fault. On exhaustion the aggregate error names the last attempted
    /// provider's message only, so internal diagnostics from earlier
    /// attempts never leak into caller-facing text.
    pub async fn charge(
        &self,
        request: ChargeRequest,
        chain_override: Option<Vec<String>>,
    ) -> PaymentResult<ChargeResult> {
        let chain = self.provider_chain(chain_override);
        let mut last_failure: Option<(String, String)> = None;

        for name in &chain {
            let driver = self.registry.resolve(name)?;

            match driver.charge(&request).await {
                Ok(mut result) => {
                    result.provider = driver.name().to_string();
                    result.reference = request.reference.clone();

                    self.store
                        .create(NewTransaction {
                            reference: request.reference.clone(),
                            provider: result.provider.clone(),
                            amount: request.amount,
                            currency: request.currency.clone(),
                            email: request.email.clone(),
                            metadata: request
                                .metadata
                                .clone()
                                .unwrap_or(serde_json::Value::Null),
                            customer: request
                                .customer
                                .clone()
                                .unwrap_or(serde_json::Value::Null),
                        })
                        .await?;

                    self.remember_session(&request.reference, &result).await;

                    info!(
                        provider = result.provider.as_str(),
                        reference = request.reference.as_str(),
                        "charge initiated"
                    );
                    return Ok(result);
                }
                Err(err) if err.is_transient() => {
                    warn!(
                        provider = driver.name(),
                        reference = request.reference.as_str(),
                        error = %err,
                        "transient charge failure, advancing to next provider"
                    );
                    last_failure = Some((driver.name().to_string(), err.to_string()));
                }
                Err(err) => {
                    return Err(PaymentError::Provider {
                        provider: driver.name().to_string(),
                        source: err,
                    });
                }
            }
        }

        match last_failure {
            Some((provider, message)) => Err(PaymentError::AllProvidersFailed { provider, message }),
            // Unreachable with a validated config; kept for an empty chain.
            None => Err(PaymentError::driver_not_found(
                &self.settings.default_provider,
            )),
        }
    }

    /// Verify the provider-side state of a charge and fold the result into
    /// the stored transaction through the same idempotent transition the
    /// webhook path uses.
    ///
    /// Provider routing: explicit hint, else the session cache entry left
    /// by the charge, else the transaction row's persisted provider column.
    pub async fn verify(
        &self,
        reference: &str,
        provider_hint: Option<&str>,
    ) -> PaymentResult<VerifiedPayment> {
        let driver = self.resolve_for_reference(reference, provider_hint).await?;
        let provider = driver.name().to_string();

        let verification =
            driver
                .verify(reference)
                .await
                .map_err(|err| PaymentError::Provider {
                    provider: provider.clone(),
                    source: err,
                })?;

        let status = self.normalizer.normalize(&verification.raw_status, &provider);

        if let Some(state) = self.normalizer.lookup(&verification.raw_status, &provider) {
            let channel = verification.channel.as_deref().map(|token| {
                self.channels
                    .from_provider_token(token, &provider)
                    .unwrap_or_else(|| token.to_string())
            });

            let outcome = self
                .store
                .apply_transition(
                    reference,
                    StatusTransition {
                        status: state,
                        channel,
                        amount: verification.amount,
                    },
                )
                .await?;

            if state.is_terminal() {
                // The reference is settled; drop the routing entry early.
                let key = SessionKey::new(reference).to_string();
                if let Err(e) = self.sessions.delete(&key).await {
                    warn!(reference = reference, error = %e, "failed to evict session entry");
                }
            }

            if let ApplyOutcome::AlreadyTerminal(current) = outcome {
                info!(
                    reference = reference,
                    current = %current,
                    "verification result was a no-op against a terminal transaction"
                );
            }
        }

        Ok(VerifiedPayment {
            provider,
            reference: reference.to_string(),
            status,
            verification,
        })
    }

    /// Read-through cached health probe. Advisory only: results never gate
    /// a charge or verify call.
    pub async fn cached_health_check(&self, provider: &str) -> PaymentResult<bool> {
        let key = HealthKey::new(provider).to_string();

        match self.health.get(&key).await {
            Ok(Some(healthy)) => return Ok(healthy),
            Ok(None) => {}
            Err(e) => warn!(provider = provider, error = %e, "health cache read failed"),
        }

        let driver = self.registry.resolve(provider)?;
        let healthy = driver.health_check().await;

        if let Err(e) = self
            .health
            .set(&key, &healthy, Some(self.settings.health_ttl()))
            .await
        {
            warn!(provider = provider, error = %e, "health cache write failed");
        }

        Ok(healthy)
    }

    async fn remember_session(&self, reference: &str, result: &ChargeResult) {
        let entry = SessionCacheEntry {
            provider: result.provider.clone(),
            provider_transaction_id: result.provider_transaction_id.clone(),
        };
        let key = SessionKey::new(reference).to_string();

        if let Err(e) = self
            .sessions
            .set(&key, &entry, Some(self.settings.session_ttl()))
            .await
        {
            // Routing degrades to the persisted provider column.
            warn!(reference = reference, error = %e, "failed to cache session entry");
        }
    }

    async fn resolve_for_reference(
        &self,
        reference: &str,
        provider_hint: Option<&str>,
    ) -> PaymentResult<Arc<dyn Driver>> {
        if let Some(hint) = provider_hint {
            return self.registry.resolve(hint);
        }

        let key = SessionKey::new(reference).to_string();
        match self.sessions.get(&key).await {
            Ok(Some(entry)) => return self.registry.resolve(&entry.provider),
            Ok(None) => {}
            Err(e) => warn!(reference = reference, error = %e, "session cache read failed"),
        }

        if let Some(transaction) = self.store.find_by_reference(reference).await? {
            return self.registry.resolve(&transaction.provider);
        }

        warn!(
            reference = reference,
            "no provider resolved for reference"
        );
        Err(PaymentError::driver_not_found("unknown"))
    }
}
