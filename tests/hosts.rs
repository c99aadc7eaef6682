use sni_proxy::forward::{Forwarder, create_http_client, parse_target};
use sni_proxy::hosts::{HostManager, InMemoryHostManager};
use sni_proxy::middleware::NoopResponseMiddleware;
use std::sync::Arc;

fn forwarder(address: &str) -> Forwarder {
    let target = parse_target(address).unwrap();
    Forwarder::new(
        &target,
        create_http_client().unwrap(),
        Arc::new(NoopResponseMiddleware::new()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_put_then_get() {
    let manager = InMemoryHostManager::new();
    manager
        .put_host("a.example.com", "http://localhost:9001", forwarder("http://localhost:9001"))
        .await
        .unwrap();

    let host = manager.get_host("a.example.com").await.unwrap().unwrap();
    assert_eq!(host.sni, "a.example.com");
    assert_eq!(host.address, "http://localhost:9001");
    assert_eq!(manager.len().unwrap(), 1);
}

#[tokio::test]
async fn test_get_unknown_is_none() {
    let manager = InMemoryHostManager::new();
    assert!(manager.get_host("missing.example.com").await.unwrap().is_none());
    assert!(manager.is_empty().unwrap());
}

#[tokio::test]
async fn test_put_replaces_existing() {
    let manager = InMemoryHostManager::new();
    manager
        .put_host("a.example.com", "http://localhost:9001", forwarder("http://localhost:9001"))
        .await
        .unwrap();
    manager
        .put_host("a.example.com", "http://localhost:9002", forwarder("http://localhost:9002"))
        .await
        .unwrap();

    let host = manager.get_host("a.example.com").await.unwrap().unwrap();
    assert_eq!(host.address, "http://localhost:9002");
    assert_eq!(manager.len().unwrap(), 1);
}

#[tokio::test]
async fn test_remove() {
    let manager = InMemoryHostManager::new();
    manager
        .put_host("a.example.com", "http://localhost:9001", forwarder("http://localhost:9001"))
        .await
        .unwrap();

    manager.remove_host("a.example.com").await.unwrap();
    assert!(manager.get_host("a.example.com").await.unwrap().is_none());

    // Removing again is not an error
    manager.remove_host("a.example.com").await.unwrap();
    manager.remove_host("never-added.example.com").await.unwrap();
}

#[tokio::test]
async fn test_concurrent_reads_during_writes() {
    let manager = Arc::new(InMemoryHostManager::new());
    manager
        .put_host("stable.example.com", "http://localhost:9001", forwarder("http://localhost:9001"))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let manager = Arc::clone(&manager);
        tasks.push(tokio::spawn(async move {
            if i % 4 == 0 {
                let sni = format!("h{}.example.com", i);
                manager
                    .put_host(&sni, "http://localhost:9100", forwarder("http://localhost:9100"))
                    .await
                    .unwrap();
            }
            let host = manager.get_host("stable.example.com").await.unwrap();
            assert_eq!(host.unwrap().address, "http://localhost:9001");
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(manager.len().unwrap(), 5);
}
