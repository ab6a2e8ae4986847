use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::status::MessageStatus;

/// Store-assigned message identifier.
pub type MessageId = u64;

/// Channel kind a provider delivers through.
///
/// ```
/// use gsm_core::ContactType;
///
/// let kind: ContactType = "SMS".parse().unwrap();
/// assert_eq!(kind.as_str(), "sms");
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContactType {
    #[default]
    Sms,
    Email,
    Twitter,
    Phone,
}

impl ContactType {
    /// Lowercase identifier used in config files, tracking ids and stored rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactType::Sms => "sms",
            ContactType::Email => "email",
            ContactType::Twitter => "twitter",
            ContactType::Phone => "phone",
        }
    }
}

impl Display for ContactType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContactType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sms" => Ok(ContactType::Sms),
            "email" => Ok(ContactType::Email),
            "twitter" => Ok(ContactType::Twitter),
            "phone" => Ok(ContactType::Phone),
            other => Err(format!("unknown contact type `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    }
}

/// Stored message record, inbound or outbound.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub provider: String,
    pub direction: Direction,
    pub contact_type: ContactType,
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub body: String,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Outbound message waiting to be stored.
///
/// ```
/// use gsm_core::{ContactType, MessageStatus, NewOutbound};
///
/// let msg = NewOutbound::new("smssync", ContactType::Sms, "+15550100", "hello")
///     .with_from("12345");
/// assert_eq!(msg.status, MessageStatus::PendingPoll);
/// assert_eq!(msg.from, "12345");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewOutbound {
    pub provider: String,
    pub contact_type: ContactType,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub title: Option<String>,
    pub body: String,
    pub status: MessageStatus,
}

impl NewOutbound {
    pub fn new(
        provider: impl Into<String>,
        contact_type: ContactType,
        to: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            contact_type,
            from: String::new(),
            to: to.into(),
            title: None,
            body: body.into(),
            status: MessageStatus::PendingPoll,
        }
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Stores the message as `Unknown` so dispatch cycles skip it until made ready.
    pub fn held(mut self) -> Self {
        self.status = MessageStatus::Unknown;
        self
    }
}

/// Message handed to the receive path by a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InboundMessage {
    pub contact_type: ContactType,
    pub from: String,
    pub body: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Remote id used to drop re-fetched copies.
    #[serde(default)]
    pub provider_message_id: Option<String>,
}

impl InboundMessage {
    pub fn new(
        contact_type: ContactType,
        from: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            contact_type,
            from: from.into(),
            body: body.into(),
            to: None,
            title: None,
            provider_message_id: None,
        }
    }

    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_provider_message_id(mut self, id: impl Into<String>) -> Self {
        self.provider_message_id = Some(id.into());
        self
    }
}

/// Outcome of a single provider send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendReceipt {
    pub tracking_id: String,
    /// Set when the channel confirmed delivery synchronously.
    #[serde(default)]
    pub delivered: bool,
    /// Provider-specific status payload.
    #[serde(default)]
    pub raw: Value,
}

impl SendReceipt {
    pub fn sent(tracking_id: impl Into<String>) -> Self {
        Self {
            tracking_id: tracking_id.into(),
            delivered: false,
            raw: Value::Null,
        }
    }

    pub fn delivered(mut self) -> Self {
        self.delivered = true;
        self
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }
}
