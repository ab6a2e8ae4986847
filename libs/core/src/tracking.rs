//! Tracking id generation for outbound send attempts.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;

/// Strategy producing unique correlation ids for outbound messages.
pub trait TrackingIdGenerator: Send + Sync {
    /// Returns a new id prefixed with `kind` (usually the contact type).
    fn tracking_id(&self, kind: &str) -> String;
}

pub type SharedTrackingIds = Arc<dyn TrackingIdGenerator>;

/// Host-scoped generator: `{kind}-{host}-{instance}-{seq}`.
///
/// The host part separates coordinators on different machines, the instance
/// part separates processes on one machine, and the counter separates calls
/// within a process.
///
/// ```
/// use gsm_core::{HostTrackingIds, TrackingIdGenerator};
///
/// let ids = HostTrackingIds::new("relay01", "a1");
/// assert_eq!(ids.tracking_id("sms"), "sms-relay01-a1-1");
/// assert_eq!(ids.tracking_id("email"), "email-relay01-a1-2");
/// ```
#[derive(Debug)]
pub struct HostTrackingIds {
    host: String,
    instance: String,
    seq: AtomicU64,
}

impl HostTrackingIds {
    pub fn new(host: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            host: sanitize(&host.into()),
            instance: sanitize(&instance.into()),
            seq: AtomicU64::new(0),
        }
    }

    /// Uses the machine host name plus the process id and start time.
    pub fn from_system() -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "localhost".to_string());
        let started = OffsetDateTime::now_utc().unix_timestamp_nanos() as u128;
        let instance = format!("{:x}{:x}", std::process::id(), started);
        Self::new(host, instance)
    }

    pub fn shared(self) -> SharedTrackingIds {
        Arc::new(self)
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

impl TrackingIdGenerator for HostTrackingIds {
    fn tracking_id(&self, kind: &str) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{kind}-{}-{}-{seq}", self.host, self.instance)
    }
}

/// Escapes everything but ASCII alphanumerics and `.` as `_xx` per UTF-8
/// byte, so distinct inputs stay distinct and never contain `-`. Empty input
/// becomes a lone `_`, which no escape produces.
fn sanitize(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return "_".to_string();
    }
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'.' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("_{byte:02x}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_distinct_and_prefixed() {
        let ids = HostTrackingIds::from_system();
        let first = ids.tracking_id("sms");
        let second = ids.tracking_id("sms");
        assert_ne!(first, second);
        assert!(first.starts_with("sms"));
        assert!(second.starts_with("sms"));
    }

    #[test]
    fn host_is_sanitized() {
        let ids = HostTrackingIds::new("relay-01.example.org", "");
        assert_eq!(ids.host(), "relay_2d01.example.org");
        assert_eq!(ids.tracking_id("email"), "email-relay_2d01.example.org-_-1");
    }

    #[test]
    fn similar_host_names_stay_distinct() {
        let dash = HostTrackingIds::new("relay-01", "1");
        let underscore = HostTrackingIds::new("relay_01", "1");
        let space = HostTrackingIds::new("relay 01", "1");
        assert_eq!(underscore.host(), "relay_5f01");
        assert_eq!(space.host(), "relay_2001");
        assert_ne!(dash.tracking_id("sms"), underscore.tracking_id("sms"));
        assert_ne!(dash.host(), space.host());
    }

    #[test]
    fn different_hosts_never_collide() {
        let a = HostTrackingIds::new("a", "1");
        let b = HostTrackingIds::new("b", "1");
        let mut seen = HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(a.tracking_id("sms")));
            assert!(seen.insert(b.tracking_id("sms")));
        }
    }

    #[test]
    fn concurrent_callers_get_unique_ids() {
        let ids = Arc::new(HostTrackingIds::new("host", "proc"));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || {
                    (0..250).map(|_| ids.tracking_id("sms")).collect::<Vec<_>>()
                })
            })
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 1000);
    }
}
