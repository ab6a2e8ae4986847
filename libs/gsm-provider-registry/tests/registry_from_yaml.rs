use gsm_core::{ContactType, HostTrackingIds, InMemoryMessageStore, MessageStatus, StatusUpdate};
use gsm_provider_registry::testkit::{RecordingHandle, ScriptedInbox};
use gsm_provider_registry::{ProviderRegistry, ProvidersConfig, RegistryError};

const CONFIG: &str = r#"
default_provider: smssync
providers:
  SMSSync: { enabled: true, from: "12345", contact_type: sms, secret: "s3cr3t" }
  twitter: { enabled: true, contact_type: twitter }
  email: { enabled: false, contact_type: email }
  log: {}
"#;

fn registry() -> (ProviderRegistry, RecordingHandle, ScriptedInbox) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("providers.yaml");
    std::fs::write(&path, CONFIG).unwrap();
    let config = ProvidersConfig::from_path(&path).unwrap();

    let mut registry = ProviderRegistry::with_builtins(
        config,
        InMemoryMessageStore::shared(),
        HostTrackingIds::new("itest", "0").shared(),
    );
    let sms = RecordingHandle::new();
    let inbox = ScriptedInbox::new();
    registry.register("smssync", sms.factory()).unwrap();
    registry.register("twitter", inbox.factory()).unwrap();
    (registry, sms, inbox)
}

#[test]
fn available_providers_lists_enabled_names() {
    let (registry, _, _) = registry();
    let names: Vec<_> = registry.available_providers().into_iter().collect();
    assert_eq!(names, vec!["log", "smssync", "twitter"]);
    assert_eq!(registry.default_provider(), Some("smssync"));
}

#[test]
fn default_provider_carries_options_and_sender() {
    let (registry, sms, _) = registry();
    let provider = registry.resolve(None).unwrap();
    assert_eq!(provider.name(), "smssync");
    assert_eq!(provider.from(), "12345");
    assert_eq!(provider.contact_type(), ContactType::Sms);
    assert_eq!(provider.options()["secret"], "s3cr3t");

    registry.resolve(Some("SMSSYNC")).unwrap();
    assert_eq!(sms.builds(), 1);
}

#[test]
fn disabled_provider_is_rejected() {
    let (registry, _, _) = registry();
    match registry.resolve(Some("email")) {
        Err(RegistryError::ProviderDisabled(name)) => assert_eq!(name, "email"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("email should be disabled"),
    }
}

#[test]
fn only_polling_providers_are_returned() {
    let (registry, _, _) = registry();
    let polling = registry.polling_providers();
    let names: Vec<_> = polling
        .providers
        .iter()
        .map(|p| p.name().to_string())
        .collect();
    assert_eq!(names, vec!["twitter"]);
    assert!(polling.unresolved.is_empty());
}

#[tokio::test]
async fn pending_messages_are_claimed_through_the_provider() {
    let (registry, _, _) = registry();
    let provider = registry.resolve(Some("smssync")).unwrap();
    let store = registry.store();
    for to in ["+1", "+2", "+3"] {
        store
            .queue_outbound(gsm_core::NewOutbound::new("smssync", ContactType::Sms, to, "hi"))
            .await
            .unwrap();
    }

    let first = provider
        .get_pending_messages(Some(2), MessageStatus::PendingPoll, StatusUpdate::default())
        .await
        .unwrap();
    assert_eq!(first.len(), 2);
    let second = provider
        .get_pending_messages(Some(2), MessageStatus::PendingPoll, StatusUpdate::default())
        .await
        .unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].to, "+3");
}
