use crate::tests::support::{FakeBackend, RecordingLogger};
use crate::{
    DatacenterUri, Interrupt, PowerState, ResourceClaim, ResourceRequest, VirtualizationClient,
    VirtualizationError,
};
use std::sync::Arc;

async fn client(backend: &FakeBackend) -> VirtualizationClient {
    let client = VirtualizationClient::builder()
        .connector(backend.connector())
        .datacenter("vcc+vbox://dc1", "builder", "secret", 60)
        .unwrap()
        .build()
        .await
        .unwrap();
    client.wait_for_inventory().await;
    client
}

#[tokio::test]
async fn test_machine_added_later_becomes_claimable() {
    let backend = FakeBackend::new();
    let client = client(&backend).await;
    let logger = RecordingLogger::default();
    let claim = ResourceClaim::new(vec![ResourceRequest::parse("vcc+vbox://dc1", "late").unwrap()]);

    let failure = client
        .acquire(&claim, &logger, &Interrupt::never())
        .await
        .err()
        .unwrap();
    assert!(matches!(failure.cause, VirtualizationError::Resolution { .. }));

    backend.add_machine("late", PowerState::Suspended);
    client.wait_for_inventory().await;

    assert!(client.acquire(&claim, &logger, &Interrupt::never()).await.is_ok());
    assert_eq!(backend.state_of("late"), Some(PowerState::Running));
}

#[tokio::test]
async fn test_refresh_keeps_surviving_identities() {
    let backend = FakeBackend::new();
    backend.add_machine("a", PowerState::Suspended);
    backend.add_machine("b", PowerState::Suspended);
    let client = client(&backend).await;
    let uri = DatacenterUri::new("vcc+vbox://dc1").unwrap();
    let before = client.registry().lookup(&uri, "b").unwrap();

    backend.remove_machine("a");
    backend.add_machine("c", PowerState::Running);
    client.wait_for_inventory().await;

    let after = client.registry().lookup(&uri, "b").unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert!(client.registry().lookup(&uri, "a").is_none());
    assert!(client.registry().lookup(&uri, "c").is_some());

    let inventory = client.registry().datacenter(&uri).unwrap().inventory().list();
    let names: Vec<&str> = inventory.identities().map(|identity| identity.name()).collect();
    assert_eq!(names, vec!["b", "c"]);
}
