use std::sync::Arc;

use async_trait::async_trait;
use gsm_core::{
    ContactType, InboundMessage, Message, MessageStatus, ProviderError, SendReceipt,
    SharedMessageStore, SharedTrackingIds, StatusUpdate,
};
use serde_json::{Map, Value};

use crate::config::ProviderSettings;

/// State every provider carries: identity, cached options and the shared
/// store/tracking handles. Providers hold one and hand it out via
/// [`Provider::context`].
#[derive(Clone)]
pub struct ProviderContext {
    name: String,
    contact_type: ContactType,
    from: String,
    options: Arc<Map<String, Value>>,
    store: SharedMessageStore,
    tracking: SharedTrackingIds,
}

impl std::fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderContext")
            .field("name", &self.name)
            .field("contact_type", &self.contact_type)
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

impl ProviderContext {
    pub fn new(
        settings: &ProviderSettings,
        store: SharedMessageStore,
        tracking: SharedTrackingIds,
    ) -> Self {
        Self {
            name: settings.name.clone(),
            contact_type: settings.contact_type.unwrap_or_default(),
            from: settings.from.clone(),
            options: Arc::new(settings.options.clone()),
            store,
            tracking,
        }
    }

    /// Channel kind for providers bound to one channel regardless of config.
    pub fn with_contact_type(mut self, contact_type: ContactType) -> Self {
        self.contact_type = contact_type;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact_type(&self) -> ContactType {
        self.contact_type
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    pub fn option_bool(&self, key: &str) -> Option<bool> {
        self.options.get(key).and_then(Value::as_bool)
    }

    pub fn store(&self) -> &SharedMessageStore {
        &self.store
    }

    pub fn next_tracking_id(&self) -> String {
        self.tracking.tracking_id(self.contact_type.as_str())
    }

    /// Stores `inbound` as a `Received` message of this provider.
    pub async fn receive(&self, inbound: InboundMessage) -> Result<Message, ProviderError> {
        Ok(self.store.insert_inbound(&self.name, inbound).await?)
    }

    pub async fn claim_pending(
        &self,
        limit: Option<usize>,
        current: MessageStatus,
        update: StatusUpdate,
    ) -> Result<Vec<Message>, ProviderError> {
        Ok(self.store.claim(&self.name, limit, current, update).await?)
    }
}

/// A pluggable messaging channel.
#[async_trait]
pub trait Provider: Send + Sync {
    fn context(&self) -> &ProviderContext;

    fn name(&self) -> &str {
        self.context().name()
    }

    fn contact_type(&self) -> ContactType {
        self.context().contact_type()
    }

    fn from(&self) -> &str {
        self.context().from()
    }

    fn options(&self) -> &Map<String, Value> {
        self.context().options()
    }

    /// Poll channels return true and implement [`Provider::fetch`].
    fn supports_polling(&self) -> bool {
        false
    }

    /// Sends one message.
    async fn send(
        &self,
        to: &str,
        body: &str,
        title: Option<&str>,
    ) -> Result<SendReceipt, ProviderError>;

    async fn receive(&self, inbound: InboundMessage) -> Result<Message, ProviderError> {
        self.context().receive(inbound).await
    }

    /// Pulls up to `limit` new inbound items and passes each to
    /// [`Provider::receive`]. Returns the number of newly stored messages.
    async fn fetch(&self, _limit: Option<usize>) -> Result<usize, ProviderError> {
        Ok(0)
    }

    /// Claims up to `limit` outbound messages in `current`, applying `update`.
    async fn get_pending_messages(
        &self,
        limit: Option<usize>,
        current: MessageStatus,
        update: StatusUpdate,
    ) -> Result<Vec<Message>, ProviderError> {
        self.context().claim_pending(limit, current, update).await
    }
}

pub type SharedProvider = Arc<dyn Provider>;

/// Feeds fetched items through `provider.receive`, skipping duplicates.
pub async fn receive_batch<P, I>(provider: &P, items: I) -> Result<usize, ProviderError>
where
    P: Provider + ?Sized,
    I: IntoIterator<Item = InboundMessage> + Send,
    I::IntoIter: Send,
{
    let mut stored = 0;
    for item in items {
        match provider.receive(item).await {
            Ok(message) => {
                stored += 1;
                tracing::debug!(
                    provider = provider.name(),
                    message_id = message.id,
                    "stored inbound message"
                );
            }
            Err(err) if err.is_duplicate() => {
                tracing::debug!(
                    provider = provider.name(),
                    error = %err,
                    "skipping duplicate inbound message"
                );
            }
            Err(err) => return Err(err),
        }
    }
    Ok(stored)
}
