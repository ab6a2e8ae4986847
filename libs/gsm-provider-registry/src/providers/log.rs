use std::sync::Arc;

use async_trait::async_trait;
use gsm_core::{ProviderError, SendReceipt};
use serde_json::json;

use crate::provider::{Provider, ProviderContext, SharedProvider};
use crate::registry::ProviderFactory;

/// Development provider that writes every send to the log.
///
/// Options:
/// - `confirm_delivery` (bool): report sends as delivered right away.
#[derive(Debug)]
pub struct LogProvider {
    ctx: ProviderContext,
    confirm_delivery: bool,
}

impl LogProvider {
    pub const NAME: &'static str = "log";

    pub fn new(ctx: ProviderContext) -> Self {
        let confirm_delivery = ctx.option_bool("confirm_delivery").unwrap_or(false);
        Self {
            ctx,
            confirm_delivery,
        }
    }

    pub fn factory() -> ProviderFactory {
        Arc::new(|ctx: ProviderContext| -> anyhow::Result<SharedProvider> {
            Ok(Arc::new(LogProvider::new(ctx)))
        })
    }
}

#[async_trait]
impl Provider for LogProvider {
    fn context(&self) -> &ProviderContext {
        &self.ctx
    }

    async fn send(
        &self,
        to: &str,
        body: &str,
        title: Option<&str>,
    ) -> Result<SendReceipt, ProviderError> {
        if to.trim().is_empty() {
            return Err(ProviderError::invalid_recipient(self.name(), to, "recipient is empty"));
        }
        let tracking_id = self.ctx.next_tracking_id();
        tracing::info!(
            provider = self.name(),
            from = self.from(),
            to,
            title = title.unwrap_or_default(),
            body_len = body.len(),
            tracking_id = %tracking_id,
            "log provider send"
        );
        let receipt = SendReceipt::sent(tracking_id).with_raw(json!({ "logged": true }));
        Ok(if self.confirm_delivery {
            receipt.delivered()
        } else {
            receipt
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use gsm_core::{HostTrackingIds, InMemoryMessageStore};
    use tracing_test::traced_test;

    fn provider(settings: ProviderSettings) -> LogProvider {
        LogProvider::new(ProviderContext::new(
            &settings,
            InMemoryMessageStore::shared(),
            HostTrackingIds::new("node", "p").shared(),
        ))
    }

    #[tokio::test]
    #[traced_test]
    async fn send_logs_and_issues_tracking_id() {
        let log = provider(ProviderSettings::new("log").with_from("gateway"));
        let receipt = log.send("+15550100", "hello", Some("greeting")).await.unwrap();
        assert_eq!(receipt.tracking_id, "sms-node-p-1");
        assert!(!receipt.delivered);
        assert!(logs_contain("log provider send"));
        assert!(logs_contain("tracking_id=sms-node-p-1"));
    }

    #[tokio::test]
    async fn empty_recipient_is_rejected() {
        let log = provider(ProviderSettings::new("log"));
        let err = log.send("  ", "hello", None).await.unwrap_err();
        assert_eq!(err.code(), "invalid_recipient");
    }

    #[tokio::test]
    async fn confirm_delivery_option_marks_receipts_delivered() {
        let log = provider(ProviderSettings::new("log").with_option("confirm_delivery", true));
        let receipt = log.send("a", "b", None).await.unwrap();
        assert!(receipt.delivered);
        assert!(!log.supports_polling());
        assert_eq!(log.fetch(Some(5)).await.unwrap(), 0);
    }
}
