//! End-to-end tests for the route synchronizer
//!
//! Drives `RouteSynchronizer` with a feed source, a static interface table
//! and the in-memory store, then inspects the resulting ROUTE_TABLE state.

use sonic_routesyncd::route_table::{
    FIELD_IFNAME, FIELD_NEXTHOP, ROUTE_TABLE_CHANNEL, ROUTE_TABLE_DEL_SET, ROUTE_TABLE_KEY_SET,
};
use sonic_routesyncd::{
    AddressFamily, FeedRouteSource, MemoryRouteStore, MultipathHop, RouteChangeEvent,
    RouteChangeType, RouteSynchronizer, StaticInterfaceResolver, StoreOp, SyncOptions, SyncState,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn resolver() -> StaticInterfaceResolver {
    StaticInterfaceResolver::new()
        .with(1, "lo")
        .with(3, "eth0")
        .with(4, "Ethernet0")
        .with(5, "Ethernet4")
}

fn route(change: RouteChangeType, destination: Option<&str>, gateway: Option<&str>, oif: u32) -> RouteChangeEvent {
    let family = match destination.or(gateway) {
        Some(addr) if addr.contains(':') => AddressFamily::Ipv6,
        _ => AddressFamily::Ipv4,
    };
    let mut event = RouteChangeEvent::new(change, family);
    event.destination = destination.map(|d| d.parse().unwrap());
    event.gateway = gateway.map(|g| g.parse().unwrap());
    event.out_ifindex = oif;
    event
}

fn hop(gateway: &str, oif: u32) -> MultipathHop {
    MultipathHop {
        gateway: Some(gateway.parse().unwrap()),
        out_ifindex: oif,
    }
}

/// Replay `events` as the initial dump, close the source and wait for the
/// worker to drain the channel and exit.
async fn run_to_completion(
    store: &MemoryRouteStore,
    events: Vec<RouteChangeEvent>,
) -> RouteSynchronizer<MemoryRouteStore> {
    let (source, feed) = FeedRouteSource::new();
    let sync = RouteSynchronizer::new(
        store.clone(),
        resolver(),
        source.with_existing(events),
        SyncOptions::default(),
    )
    .unwrap();

    sync.start().unwrap();
    drop(feed);
    timeout(Duration::from_secs(5), sync.wait())
        .await
        .expect("worker did not finish");
    sync
}

#[tokio::test]
async fn test_ipv4_default_route_added() {
    let store = MemoryRouteStore::new();
    let sync = run_to_completion(&store, vec![route(RouteChangeType::New, None, None, 3)]).await;

    assert_eq!(store.set_members(ROUTE_TABLE_KEY_SET), vec!["0.0.0.0/0"]);
    let entry = store.hgetall("_ROUTE_TABLE:0.0.0.0/0");
    assert_eq!(entry.get(FIELD_NEXTHOP).unwrap(), "0.0.0.0");
    assert_eq!(entry.get(FIELD_IFNAME).unwrap(), "eth0");
    assert_eq!(
        store.published(),
        vec![(ROUTE_TABLE_CHANNEL.to_string(), "G".to_string())]
    );

    let stats = sync.stats();
    assert_eq!(stats.updates, 1);
    assert_eq!(stats.added, 1);
}

#[tokio::test]
async fn test_ipv6_route_added() {
    let store = MemoryRouteStore::new();
    run_to_completion(
        &store,
        vec![route(RouteChangeType::New, Some("2001:db8:1::/48"), Some("fe80::1"), 4)],
    )
    .await;

    let entry = store.hgetall("_ROUTE_TABLE:2001:db8:1::/48");
    assert_eq!(entry.get(FIELD_NEXTHOP).unwrap(), "fe80::1");
    assert_eq!(entry.get(FIELD_IFNAME).unwrap(), "Ethernet0");
}

#[tokio::test]
async fn test_route_deleted() {
    let store = MemoryRouteStore::new();
    let sync = run_to_completion(
        &store,
        vec![route(RouteChangeType::Delete, Some("10.0.0.0/8"), None, 0)],
    )
    .await;

    assert!(store.is_member(ROUTE_TABLE_KEY_SET, "10.0.0.0/8"));
    assert!(store.is_member(ROUTE_TABLE_DEL_SET, "10.0.0.0/8"));
    assert!(!store.contains_key("_ROUTE_TABLE:10.0.0.0/8"));
    assert_eq!(store.published().len(), 1);
    assert_eq!(sync.stats().deleted, 1);
}

#[tokio::test]
async fn test_add_then_delete_in_order() {
    let store = MemoryRouteStore::new();
    run_to_completion(
        &store,
        vec![
            route(RouteChangeType::New, Some("198.51.100.0/24"), Some("192.0.2.1"), 4),
            route(RouteChangeType::Delete, Some("198.51.100.0/24"), Some("192.0.2.1"), 4),
        ],
    )
    .await;

    assert!(!store.contains_key("_ROUTE_TABLE:198.51.100.0/24"));
    assert!(store.is_member(ROUTE_TABLE_DEL_SET, "198.51.100.0/24"));
    assert_eq!(store.published().len(), 2);
}

#[tokio::test]
async fn test_multipath_route() {
    let store = MemoryRouteStore::new();
    let mut event = route(RouteChangeType::New, Some("203.0.113.0/24"), None, 0);
    event.multipath = vec![hop("192.0.2.1", 4), hop("192.0.2.2", 5), hop("192.0.2.1", 5)];

    run_to_completion(&store, vec![event]).await;

    let entry = store.hgetall("_ROUTE_TABLE:203.0.113.0/24");
    assert_eq!(entry.get(FIELD_NEXTHOP).unwrap(), "192.0.2.1,192.0.2.2,192.0.2.1");
    assert_eq!(entry.get(FIELD_IFNAME).unwrap(), "Ethernet0,Ethernet4,Ethernet4");
}

#[tokio::test]
async fn test_multipath_unknown_interface_writes_nothing() {
    let store = MemoryRouteStore::new();
    let mut event = route(RouteChangeType::New, Some("203.0.113.0/24"), None, 0);
    event.multipath = vec![hop("192.0.2.1", 4), hop("192.0.2.2", 99)];

    let sync = run_to_completion(
        &store,
        vec![event, route(RouteChangeType::New, Some("10.0.0.0/8"), None, 3)],
    )
    .await;

    assert!(!store.contains_key("_ROUTE_TABLE:203.0.113.0/24"));
    assert!(!store.is_member(ROUTE_TABLE_KEY_SET, "203.0.113.0/24"));
    // The failure does not stop later events
    assert!(store.contains_key("_ROUTE_TABLE:10.0.0.0/8"));

    let stats = sync.stats();
    assert_eq!(stats.nexthop_failures, 1);
    assert_eq!(stats.added, 1);
    assert_eq!(stats.outcomes(), stats.updates);
}

#[tokio::test]
async fn test_non_default_table_ignored() {
    let store = MemoryRouteStore::new();
    let mut local = route(RouteChangeType::New, Some("127.0.0.0/8"), None, 1);
    local.table = 255;
    let mut removed = route(RouteChangeType::Delete, Some("10.0.0.0/8"), None, 3);
    removed.table = 100;

    let sync = run_to_completion(&store, vec![local, removed]).await;

    assert_eq!(store.operation_count(), 0);
    let stats = sync.stats();
    assert_eq!(stats.updates, 2);
    assert_eq!(stats.non_default_table, 2);
}

#[tokio::test]
async fn test_unsupported_family_ignored() {
    let store = MemoryRouteStore::new();
    // AF_MPLS
    let event = RouteChangeEvent::new(RouteChangeType::New, AddressFamily::Other(28));

    let sync = run_to_completion(&store, vec![event]).await;

    assert_eq!(store.operation_count(), 0);
    assert_eq!(sync.stats().unsupported_family, 1);
}

#[tokio::test]
async fn test_store_failures_are_counted() {
    let store = MemoryRouteStore::new();
    store.fail_on(StoreOp::Hset);
    store.fail_on(StoreOp::Del);

    let sync = run_to_completion(
        &store,
        vec![
            route(RouteChangeType::New, Some("10.0.0.0/8"), None, 3),
            route(RouteChangeType::Delete, Some("10.1.0.0/16"), None, 3),
        ],
    )
    .await;

    assert!(store.published().is_empty());
    let stats = sync.stats();
    assert_eq!(stats.add_failures, 1);
    assert_eq!(stats.delete_failures, 1);
    assert_eq!(stats.added + stats.deleted, 0);
}

#[tokio::test]
async fn test_list_existing_disabled() {
    let store = MemoryRouteStore::new();
    let (source, feed) = FeedRouteSource::new();
    let source = source.with_existing(vec![route(RouteChangeType::New, Some("10.0.0.0/8"), None, 3)]);
    let sync = RouteSynchronizer::new(
        store.clone(),
        resolver(),
        source,
        SyncOptions {
            list_existing: false,
            ..SyncOptions::default()
        },
    )
    .unwrap();

    sync.start().unwrap();
    feed.push(route(RouteChangeType::New, Some("172.16.0.0/12"), None, 3));
    drop(feed);
    timeout(Duration::from_secs(5), sync.wait()).await.unwrap();

    assert_eq!(store.set_members(ROUTE_TABLE_KEY_SET), vec!["172.16.0.0/12"]);
}

#[tokio::test]
async fn test_stop_and_wait_is_final() {
    let store = MemoryRouteStore::new();
    store.set_latency(Duration::from_millis(20));
    let (source, feed) = FeedRouteSource::new();
    let sync = RouteSynchronizer::new(store.clone(), resolver(), source, SyncOptions::default())
        .unwrap();

    sync.start().unwrap();
    for i in 0..50 {
        let prefix = format!("10.{}.0.0/16", i);
        feed.push(route(RouteChangeType::New, Some(&prefix), None, 3));
    }
    tokio::time::sleep(Duration::from_millis(30)).await;

    sync.stop_and_wait().await;
    let operations = store.operation_count();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(store.operation_count(), operations);
    assert_eq!(sync.state(), SyncState::Stopped);

    let stats = sync.stats();
    assert!(stats.updates < 50);
    assert_eq!(stats.outcomes(), stats.updates);
}

#[tokio::test]
async fn test_concurrent_stop_and_wait() {
    let store = MemoryRouteStore::new();
    store.set_latency(Duration::from_millis(10));
    let (source, feed) = FeedRouteSource::new();
    let sync = Arc::new(
        RouteSynchronizer::new(store.clone(), resolver(), source, SyncOptions::default()).unwrap(),
    );

    sync.start().unwrap();
    feed.push(route(RouteChangeType::New, Some("10.0.0.0/8"), None, 3));

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.stop_and_wait().await })
        })
        .collect();

    for waiter in waiters {
        timeout(Duration::from_secs(5), waiter)
            .await
            .expect("stop_and_wait did not return")
            .unwrap();
    }
    assert_eq!(sync.state(), SyncState::Stopped);

    let operations = store.operation_count();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.operation_count(), operations);

    // The event is either fully applied or never touched the store
    if operations == 0 {
        assert!(store.published().is_empty());
        assert_eq!(sync.stats().added, 0);
    } else {
        let entry = store.hgetall("_ROUTE_TABLE:10.0.0.0/8");
        assert_eq!(entry.get(FIELD_NEXTHOP).unwrap(), "0.0.0.0");
        assert_eq!(entry.get(FIELD_IFNAME).unwrap(), "eth0");
        assert!(store.is_member(ROUTE_TABLE_KEY_SET, "10.0.0.0/8"));
        assert_eq!(
            store.published(),
            vec![(ROUTE_TABLE_CHANNEL.to_string(), "G".to_string())]
        );
        assert_eq!(sync.stats().added, 1);
    }
    let stats = sync.stats();
    assert_eq!(stats.outcomes(), stats.updates);
}
