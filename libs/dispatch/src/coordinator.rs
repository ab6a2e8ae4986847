use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gsm_core::{
    AttemptOutcome, InboundMessage, Message, MessageStatus, NewOutbound, ProviderError,
    SharedMessageStore, StatusUpdate,
};
use gsm_provider_registry::{DispatchSettings, ProviderRegistry, SharedProvider};
use gsm_telemetry::{
    DISPATCH_CYCLE_MS, MESSAGES_DISPATCH_FAILED, MESSAGES_DISPATCHED, MESSAGES_DUPLICATE,
    MESSAGES_FETCHED, MESSAGES_RECEIVED, TelemetryLabels, record_counter, record_histogram,
};
use tracing::{Instrument, info_span, instrument};

use crate::errors::DispatchError;
use crate::report::{
    CycleReport, DispatchFailure, DispatchReport, FetchReport, ProviderFailure, ReceiveOutcome,
};

/// Runs send cycles, fetch cycles, the inbound receive path and delivery
/// reports against the providers of one registry.
pub struct DispatchCoordinator {
    registry: Arc<ProviderRegistry>,
    settings: DispatchSettings,
}

impl DispatchCoordinator {
    /// Uses the dispatch settings of the registry's config.
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        let settings = registry.config().dispatch.clone();
        Self { registry, settings }
    }

    pub fn with_settings(mut self, settings: DispatchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    fn store(&self) -> &SharedMessageStore {
        self.registry.store()
    }

    /// Claims and sends pending messages. With `provider` set only that
    /// provider is drained and registry errors are returned; otherwise every
    /// available provider is drained and failing ones land in `skipped`.
    #[instrument(name = "dispatch.process_pending", skip(self))]
    pub async fn process_pending_messages(
        &self,
        limit: Option<usize>,
        provider: Option<&str>,
    ) -> Result<DispatchReport, DispatchError> {
        let started = Instant::now();
        let limit = limit.unwrap_or(self.settings.default_limit);
        let mut report = DispatchReport::default();

        match provider {
            Some(name) => {
                let provider = self.registry.resolve(Some(name))?;
                self.drain_provider(&provider, limit, &mut report).await?;
            }
            None => {
                for (name, resolved) in self.registry.resolve_available() {
                    let provider = match resolved {
                        Ok(provider) => provider,
                        Err(err) => {
                            tracing::warn!(
                                provider = %name,
                                code = err.code(),
                                error = %err,
                                "skipping provider"
                            );
                            report.skipped.push(ProviderFailure {
                                provider: name,
                                code: err.code().to_string(),
                                error: err.to_string(),
                            });
                            continue;
                        }
                    };
                    if let Err(err) = self.drain_provider(&provider, limit, &mut report).await {
                        tracing::warn!(
                            provider = %name,
                            code = err.code(),
                            error = %err,
                            "claim failed"
                        );
                        report.skipped.push(ProviderFailure {
                            provider: name,
                            code: err.code().to_string(),
                            error: err.to_string(),
                        });
                    }
                }
            }
        }

        record_histogram(
            DISPATCH_CYCLE_MS,
            started.elapsed().as_secs_f64() * 1000.0,
            &TelemetryLabels::new().with_extra("cycle", "send"),
        );
        tracing::info!(
            claimed = report.claimed,
            sent = report.sent,
            delivered = report.delivered,
            failed = report.failed,
            requeued = report.requeued,
            unrecorded = report.unrecorded,
            skipped = report.skipped.len(),
            "send cycle finished"
        );
        Ok(report)
    }

    async fn drain_provider(
        &self,
        provider: &SharedProvider,
        limit: usize,
        report: &mut DispatchReport,
    ) -> Result<(), DispatchError> {
        // Not bounded by the call timeout: dropping a claim after it commits
        // would leave the claimed messages stuck in `Unknown`.
        let claimed = provider
            .get_pending_messages(
                Some(limit),
                MessageStatus::PendingPoll,
                StatusUpdate::Set(MessageStatus::Unknown),
            )
            .await?;
        report.claimed += claimed.len();

        for message in claimed {
            let span = info_span!(
                "dispatch.send",
                provider = provider.name(),
                message_id = message.id
            );
            self.send_one(provider, message, report).instrument(span).await;
        }
        Ok(())
    }

    async fn send_one(
        &self,
        provider: &SharedProvider,
        message: Message,
        report: &mut DispatchReport,
    ) {
        let labels = TelemetryLabels::provider(provider.name())
            .with_contact_type(message.contact_type.as_str());
        let result = self
            .bounded(
                provider.name(),
                provider.send(&message.to, &message.body, message.title.as_deref()),
            )
            .await;

        match result {
            Ok(receipt) => {
                let outcome = AttemptOutcome::Sent {
                    tracking_id: receipt.tracking_id.clone(),
                };
                let recorded = self
                    .store()
                    .record_attempt(message.id, message.status, outcome)
                    .await;
                if let Err(err) = recorded {
                    // The provider accepted the message; only the bookkeeping failed.
                    tracing::error!(
                        tracking_id = %receipt.tracking_id,
                        error = %err,
                        "failed to record sent message"
                    );
                    report.unrecorded += 1;
                    self.push_failure(report, provider, &message, ProviderError::from(err), false);
                    return;
                }
                report.sent += 1;
                record_counter(MESSAGES_DISPATCHED, 1, &labels);
                tracing::info!(tracking_id = %receipt.tracking_id, "message sent");

                if receipt.delivered {
                    match self
                        .store()
                        .transition(message.id, MessageStatus::Sent, MessageStatus::Delivered)
                        .await
                    {
                        Ok(_) => report.delivered += 1,
                        Err(err) => {
                            tracing::warn!(
                                tracking_id = %receipt.tracking_id,
                                error = %err,
                                "failed to mark message delivered"
                            );
                        }
                    }
                }
            }
            Err(err) => {
                let retry = err.is_retryable()
                    && message.attempts.saturating_add(1) < self.settings.max_attempts;
                let outcome = if retry {
                    AttemptOutcome::Requeue
                } else {
                    AttemptOutcome::Failed
                };
                record_counter(
                    MESSAGES_DISPATCH_FAILED,
                    1,
                    &labels.clone().with_code(err.code()),
                );
                tracing::warn!(code = err.code(), error = %err, requeue = retry, "send failed");
                let recorded = self
                    .store()
                    .record_attempt(message.id, message.status, outcome)
                    .await;
                match recorded {
                    Ok(_) if retry => report.requeued += 1,
                    Ok(_) => report.failed += 1,
                    Err(store_err) => {
                        tracing::error!(error = %store_err, "failed to record send failure");
                        report.failed += 1;
                    }
                }
                self.push_failure(report, provider, &message, err, retry);
            }
        }
    }

    fn push_failure(
        &self,
        report: &mut DispatchReport,
        provider: &SharedProvider,
        message: &Message,
        err: ProviderError,
        requeued: bool,
    ) {
        report.failures.push(DispatchFailure {
            message_id: message.id,
            provider: provider.name().to_string(),
            code: err.code().to_string(),
            error: err.to_string(),
            requeued,
        });
    }

    /// Calls `fetch` on every available provider that supports polling.
    #[instrument(name = "dispatch.fetch_all", skip(self))]
    pub async fn fetch_all(&self, limit: Option<usize>) -> FetchReport {
        let started = Instant::now();
        let mut report = FetchReport::default();
        let polling = self.registry.polling_providers();
        for (name, err) in polling.unresolved {
            tracing::warn!(
                provider = %name,
                code = err.code(),
                error = %err,
                "skipping provider"
            );
            report.errors.push(ProviderFailure {
                provider: name,
                code: err.code().to_string(),
                error: err.to_string(),
            });
        }
        for provider in polling.providers {
            let name = provider.name().to_string();
            match self.bounded(&name, provider.fetch(limit)).await {
                Ok(count) => {
                    report.fetched += count;
                    report.per_provider.insert(name.clone(), count);
                    record_counter(
                        MESSAGES_FETCHED,
                        count as u64,
                        &TelemetryLabels::provider(&name)
                            .with_contact_type(provider.contact_type().as_str()),
                    );
                    tracing::debug!(provider = %name, count, "fetched");
                }
                Err(err) => {
                    tracing::warn!(
                        provider = %name,
                        code = err.code(),
                        error = %err,
                        "fetch failed"
                    );
                    report.errors.push(ProviderFailure {
                        provider: name,
                        code: err.code().to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }
        record_histogram(
            DISPATCH_CYCLE_MS,
            started.elapsed().as_secs_f64() * 1000.0,
            &TelemetryLabels::new().with_extra("cycle", "fetch"),
        );
        report
    }

    /// Fetch then send, the order a scheduled tick runs them in.
    pub async fn run_cycle(&self, limit: Option<usize>) -> Result<CycleReport, DispatchError> {
        let fetch = self.fetch_all(limit).await;
        let dispatch = self.process_pending_messages(limit, None).await?;
        Ok(CycleReport { fetch, dispatch })
    }

    /// Stores an inbound message for `provider`. Repeats of an already stored
    /// provider message id come back as [`ReceiveOutcome::Duplicate`].
    #[instrument(name = "dispatch.receive", skip(self, inbound), fields(from = %inbound.from))]
    pub async fn receive(
        &self,
        provider: &str,
        inbound: InboundMessage,
    ) -> Result<ReceiveOutcome, DispatchError> {
        let provider = self.registry.resolve(Some(provider))?;
        let labels = TelemetryLabels::provider(provider.name())
            .with_contact_type(inbound.contact_type.as_str());
        match provider.receive(inbound).await {
            Ok(message) => {
                record_counter(MESSAGES_RECEIVED, 1, &labels);
                tracing::info!(message_id = message.id, "inbound message stored");
                Ok(ReceiveOutcome::Stored(message))
            }
            Err(err) if err.is_duplicate() => {
                record_counter(MESSAGES_DUPLICATE, 1, &labels);
                tracing::debug!(error = %err, "duplicate inbound message ignored");
                Ok(ReceiveOutcome::Duplicate)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Applies a delivery report to the message sent under `tracking_id`.
    #[instrument(name = "dispatch.delivery_report", skip(self))]
    pub async fn record_delivery_report(
        &self,
        provider: &str,
        tracking_id: &str,
        delivered: bool,
    ) -> Result<Message, DispatchError> {
        let provider = provider.trim().to_lowercase();
        let message = self.store().find_by_tracking_id(&provider, tracking_id).await?;
        let next = if delivered {
            MessageStatus::Delivered
        } else {
            MessageStatus::Failed
        };
        let updated = self
            .store()
            .transition(message.id, MessageStatus::Sent, next)
            .await?;
        tracing::info!(
            message_id = updated.id,
            status = %updated.status,
            "delivery report applied"
        );
        Ok(updated)
    }

    /// Queues an outbound message in `PendingPoll` for the resolved provider.
    pub async fn queue_outbound(
        &self,
        provider: Option<&str>,
        to: &str,
        body: &str,
        title: Option<&str>,
    ) -> Result<Message, DispatchError> {
        let provider = self.registry.resolve(provider)?;
        let mut outbound = NewOutbound::new(provider.name(), provider.contact_type(), to, body)
            .with_from(provider.from());
        if let Some(title) = title {
            outbound = outbound.with_title(title);
        }
        let message = self.store().queue_outbound(outbound).await?;
        tracing::debug!(provider = provider.name(), message_id = message.id, "message queued");
        Ok(message)
    }

    async fn bounded<T, F>(&self, provider: &str, call: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        let limit: Duration = self.settings.call_timeout();
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider: provider.to_string(),
                after_ms: limit.as_millis() as u64,
            }),
        }
    }
}
