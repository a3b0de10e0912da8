//! Integration test: rescuing identities whose newest editions are broken.
//!
//! Peer 0 publishes through its own node; the other nodes learn an edition
//! hint and have to walk back to the newest edition that still decodes.

use std::sync::Arc;
use std::time::Duration;

use tern_engine::TernNodeConfig;
use tern_integration_tests::Network;
use tern_rescue::{FetchRequest, RescueConfig, RescueError, RescueState};
use tern_types::events::{IdentityUpdated, RescueFinished, UpdateOrigin};

/// Publish `n` editions as peer 0, one post each.
async fn publish_editions(net: &Network, n: u64) {
    for i in 1..=n {
        net.post(0, &format!("edition {i}")).await;
    }
}

#[tokio::test]
async fn test_walk_back_past_missing_and_corrupt_editions() {
    let net = Network::new(2);
    publish_editions(&net, 10).await;
    assert!(net.drop_edition(0, 10));
    net.corrupt_edition(0, 9);

    let alice = net.identity(0);
    net.node(1).add_remote_identity(alice, 10);
    let mut finished = net.node(1).events().subscribe::<RescueFinished>();
    let rescuer = net.node(1).rescuer(&alice).unwrap();

    let mut attempts = Vec::new();
    loop {
        rescuer.start_next_fetch().unwrap();
        let session = rescuer.finished().await;
        attempts.push((session.target_edition, session.state));
        if session.last_fetch_successful {
            break;
        }
        rescuer.set_edition(rescuer.next_edition().unwrap());
    }

    assert_eq!(
        attempts,
        vec![
            (10, RescueState::Failed),
            (9, RescueState::Failed),
            (8, RescueState::Succeeded),
        ]
    );
    assert_eq!(net.edition_seen(1, 0), Some(8));
    assert_eq!(
        net.node(1).posts_of(&alice, None).len(),
        8,
        "edition 8 carries eight posts"
    );

    let mut outcomes = Vec::new();
    for _ in 0..3 {
        let event = finished.recv().await.unwrap();
        outcomes.push((event.edition, event.success));
    }
    assert_eq!(outcomes, vec![(10, false), (9, false), (8, true)]);
    net.shutdown().await;
}

#[tokio::test]
async fn test_rescue_exhausts_at_edition_zero() {
    let net = Network::new(2);
    let alice = net.identity(0);
    net.node(1).add_remote_identity(alice, 2);
    let rescuer = net.node(1).rescuer(&alice).unwrap();

    let mut tried = Vec::new();
    loop {
        rescuer.start_next_fetch().unwrap();
        let session = rescuer.finished().await;
        tried.push(session.target_edition);
        if session.last_fetch_successful {
            break;
        }
        match rescuer.next_edition() {
            Some(next) => rescuer.set_edition(next),
            None => break,
        }
    }

    assert_eq!(tried, vec![2, 1, 0]);
    assert_eq!(rescuer.state(), RescueState::Exhausted);
    assert_eq!(rescuer.current_edition(), 0);
    assert!(!rescuer.has_next_edition());
    for _ in 0..3 {
        assert!(matches!(
            rescuer.start_next_fetch(),
            Err(RescueError::Exhausted { .. })
        ));
    }
    assert_eq!(net.edition_seen(1, 0), None);
    net.shutdown().await;
}

#[tokio::test]
async fn test_only_explicit_rescue_lowers_the_edition() {
    let net = Network::new(2);
    net.connect_all();
    publish_editions(&net, 5).await;
    let alice = net.identity(0);
    let mut updates = net.node(1).events().subscribe::<IdentityUpdated>();

    net.sync(1).await;
    assert_eq!(net.edition_seen(1, 0), Some(5));

    // Refresh from an older hint never goes backwards.
    net.node(1).add_remote_identity(alice, 2);
    net.sync(1).await;
    assert_eq!(net.edition_seen(1, 0), Some(5));

    // Rescue at the current target re-merges the same edition.
    let rescuer = net.node(1).rescuer(&alice).unwrap();
    assert_eq!(rescuer.current_edition(), 5);
    rescuer.start_next_fetch().unwrap();
    rescuer.finished().await;
    assert_eq!(net.edition_seen(1, 0), Some(5));

    // An explicitly older target is honoured.
    rescuer.set_edition(3);
    rescuer.start_next_fetch().unwrap();
    rescuer.finished().await;
    assert_eq!(net.edition_seen(1, 0), Some(3));

    // The next refresh climbs back up.
    net.sync(1).await;
    assert_eq!(net.edition_seen(1, 0), Some(5));

    let mut seen = Vec::new();
    while let Some(update) = updates.try_recv() {
        seen.push((update.edition, update.origin));
    }
    let lowered: Vec<_> = seen
        .windows(2)
        .filter(|w| w[1].0 < w[0].0)
        .map(|w| w[1])
        .collect();
    assert_eq!(lowered, vec![(3, UpdateOrigin::Rescue)]);
    net.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fetch_requests_run_once() {
    let net = Network::new(2);
    publish_editions(&net, 3).await;
    let alice = net.identity(0);
    net.node(1).add_remote_identity(alice, 3);
    let rescuer = net.node(1).rescuer(&alice).unwrap();
    let mut finished = net.node(1).events().subscribe::<RescueFinished>();

    // Holding the update lock keeps the first fetch pending.
    let guard = net.node(1).lock_updates(alice).await;
    let mut handles = Vec::new();
    for _ in 0..16 {
        let rescuer = Arc::clone(&rescuer);
        handles.push(tokio::spawn(async move { rescuer.start_next_fetch().unwrap() }));
    }
    let mut started = 0;
    for h in handles {
        if h.await.unwrap() == FetchRequest::Started {
            started += 1;
        }
    }
    assert_eq!(started, 1);

    drop(guard);
    let session = rescuer.finished().await;
    assert!(session.last_fetch_successful);

    assert_eq!(finished.recv().await.unwrap().edition, 3);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(finished.try_recv().is_none(), "exactly one fetch ran");
    net.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_repeated_requests_over_slow_store() {
    let net = Network::with_read_latency(2, 5, 15, 42);
    publish_editions(&net, 8).await;
    let alice = net.identity(0);
    net.node(1).add_remote_identity(alice, 8);
    let rescuer = net.node(1).rescuer(&alice).unwrap();

    for edition in (1..=8).rev() {
        rescuer.set_edition(edition);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let rescuer = Arc::clone(&rescuer);
            handles.push(tokio::spawn(async move { rescuer.start_next_fetch() }));
        }
        let mut started = 0;
        for h in handles {
            if h.await.unwrap().unwrap() == FetchRequest::Started {
                started += 1;
            }
        }
        let session = rescuer.finished().await;
        assert!(started >= 1, "edition {edition}: no fetch started");
        assert!(session.last_fetch_successful);
        assert_eq!(net.edition_seen(1, 0), Some(edition));
    }
    net.shutdown().await;
}

#[tokio::test]
async fn test_store_outage_fails_without_exhausting() {
    let net = Network::new(2);
    publish_editions(&net, 3).await;
    let alice = net.identity(0);
    net.node(1).add_remote_identity(alice, 3);
    let rescuer = net.node(1).rescuer(&alice).unwrap();

    net.set_store_down(true);
    rescuer.start_next_fetch().unwrap();
    let session = rescuer.finished().await;
    assert_eq!(session.state, RescueState::Failed);
    assert!(session.last_error.is_some());

    // Retrying the same edition once the store is back succeeds.
    net.set_store_down(false);
    rescuer.start_next_fetch().unwrap();
    let session = rescuer.finished().await;
    assert_eq!(session.state, RescueState::Succeeded);
    assert_eq!(session.recovered_edition, Some(3));
    net.shutdown().await;
}

#[tokio::test]
async fn test_lock_timeout_fails_the_attempt() {
    let config = TernNodeConfig {
        rescue: RescueConfig {
            lock_timeout: Some(Duration::from_millis(20)),
            fetch_timeout: None,
        },
        ..TernNodeConfig::default()
    };
    let net = Network::with_config(2, config);
    publish_editions(&net, 2).await;
    let alice = net.identity(0);
    net.node(1).add_remote_identity(alice, 2);
    let rescuer = net.node(1).rescuer(&alice).unwrap();

    let guard = net.node(1).lock_updates(alice).await;
    rescuer.start_next_fetch().unwrap();
    let session = rescuer.finished().await;
    drop(guard);

    assert!(!session.last_fetch_successful);
    assert_eq!(session.state, RescueState::Failed);
    assert_eq!(net.edition_seen(1, 0), None);

    rescuer.start_next_fetch().unwrap();
    assert!(rescuer.finished().await.last_fetch_successful);
    assert_eq!(net.edition_seen(1, 0), Some(2));
    net.shutdown().await;
}

#[tokio::test]
async fn test_refresh_steps_over_corrupt_edition() {
    let net = Network::new(2);
    publish_editions(&net, 4).await;
    net.corrupt_edition(0, 4);
    let alice = net.identity(0);
    net.node(1).add_remote_identity(alice, 0);

    assert_eq!(net.node(1).refresh(&alice).await.unwrap(), Some(3));

    // Once alice publishes again the corrupt edition is skipped.
    net.post(0, "edition 5").await;
    assert_eq!(net.node(1).refresh(&alice).await.unwrap(), Some(5));
    assert_eq!(net.node(1).posts_of(&alice, None).len(), 5);
    net.shutdown().await;
}
