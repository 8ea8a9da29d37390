use crate::tests::support::{FakeBackend, RecordingLogger, Step};
use crate::{
    Interrupt, MachineCommand, PowerState, ResourceClaim, ResourceRequest, VirtualizationClient,
};
use std::sync::Arc;

fn request(uri: &str, name: &str) -> ResourceRequest {
    ResourceRequest::parse(uri, name).unwrap()
}

#[test]
fn test_overlapping_claims_conflict() {
    let first = ResourceClaim::new(vec![
        request("vcc+vbox://dc1", "a"),
        request("vcc+vbox://dc1", "b"),
    ]);
    let second = ResourceClaim::new(vec![request("vcc+vbox://dc1", "b")]);
    let disjoint = ResourceClaim::new(vec![request("vcc+vbox://dc1", "c")]);
    let elsewhere = ResourceClaim::new(vec![request("vcc+vbox://dc2", "a")]);

    assert!(first.resource_list().conflicts_with(&second.resource_list()));
    assert!(second.resource_list().conflicts_with(&first.resource_list()));
    assert!(!first.resource_list().conflicts_with(&disjoint.resource_list()));
    assert!(!first.resource_list().conflicts_with(&elsewhere.resource_list()));
}

#[test]
fn test_resource_list_nests_machine_under_datacenter() {
    let claim = ResourceClaim::new(vec![
        request("vcc+vbox://dc1", "a"),
        request("vcc+vbox://dc1", "a"),
    ]);
    let list = claim.resource_list();
    assert_eq!(list.keys().len(), 1);
    assert_eq!(list.keys()[0].to_string(), "vcc+vbox://dc1/a");
}

#[tokio::test]
async fn test_repeated_acquisition_reuses_resolved_identity() {
    let backend = FakeBackend::new();
    backend.add_machine("a", PowerState::Suspended);
    let client = VirtualizationClient::builder()
        .connector(backend.connector())
        .datacenter("vcc+vbox://dc1", "builder", "secret", 60)
        .unwrap()
        .build()
        .await
        .unwrap();
    client.wait_for_inventory().await;
    let logger = RecordingLogger::default();
    let claim = ResourceClaim::new(vec![request("vcc+vbox://dc1", "a")]);

    let first = client.acquire(&claim, &logger, &Interrupt::never()).await.unwrap();
    assert!(first.release(&logger, &Interrupt::never()).await);
    let second = client.acquire(&claim, &logger, &Interrupt::never()).await.unwrap();

    assert!(Arc::ptr_eq(&first.machines()[0], &second.machines()[0]));
    assert_eq!(backend.commands(MachineCommand::Start), vec!["a", "a"]);
}

#[tokio::test]
async fn test_slow_start_still_succeeds() {
    let backend = FakeBackend::new();
    backend.add_machine("slow", PowerState::Suspended);
    backend.script("slow", vec![Step::Timeout, Step::Timeout, Step::Complete]);
    let client = VirtualizationClient::builder()
        .connector(backend.connector())
        .datacenter("vcc+vbox://dc1", "builder", "secret", 60)
        .unwrap()
        .build()
        .await
        .unwrap();
    client.wait_for_inventory().await;
    let logger = RecordingLogger::default();

    let claim = ResourceClaim::new(vec![request("vcc+vbox://dc1", "slow")]);
    let acquired = client.acquire(&claim, &logger, &Interrupt::never()).await;

    assert!(acquired.is_ok());
    assert_eq!(logger.count("Still waiting for virtual computer slow to be started"), 2);
    assert!(logger.errors().is_empty());
}
