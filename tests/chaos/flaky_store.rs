//! Chaos test: corruption injected while nodes publish and refresh.
//!
//! Four nodes over a store with random read latency. Writers publish
//! continuously, readers refresh continuously, and an injector corrupts
//! random older editions. Loaded editions must never move backwards, and
//! once the chaos stops every node must converge on every peer's newest
//! edition.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tern_integration_tests::Network;
use tokio::time;

const PEERS: usize = 4;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_corruption_during_refresh_converges() {
    let net = Arc::new(Network::with_read_latency(PEERS, 0, 3, 7));
    net.connect_all();

    let stop = Arc::new(AtomicBool::new(false));
    let published = Arc::new(AtomicUsize::new(0));
    let corrupted = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();

    // --- Writers: one per peer ---
    for i in 0..PEERS {
        let net = net.clone();
        let stop = stop.clone();
        let published = published.clone();
        handles.push(tokio::spawn(async move {
            let mut n = 0u32;
            while !stop.load(Ordering::Relaxed) {
                net.post(i, &format!("peer {i} post {n}")).await;
                published.fetch_add(1, Ordering::Relaxed);
                n += 1;
                time::sleep(Duration::from_millis(5)).await;
            }
        }));
    }

    // --- Readers: refresh everything and check monotonicity ---
    for i in 0..PEERS {
        let net = net.clone();
        let stop = stop.clone();
        handles.push(tokio::spawn(async move {
            let mut last: HashMap<usize, u64> = HashMap::new();
            while !stop.load(Ordering::Relaxed) {
                net.sync(i).await;
                for j in (0..PEERS).filter(|&j| j != i) {
                    if let Some(edition) = net.edition_seen(i, j) {
                        let prev = last.insert(j, edition).unwrap_or(0);
                        assert!(
                            edition >= prev,
                            "node {i} saw peer {j} go from {prev} to {edition}"
                        );
                    }
                }
                time::sleep(Duration::from_millis(3)).await;
            }
        }));
    }

    // --- Injector: corrupt an older edition of a random peer ---
    {
        let net = net.clone();
        let stop = stop.clone();
        let corrupted = corrupted.clone();
        handles.push(tokio::spawn(async move {
            let mut rng = StdRng::seed_from_u64(99);
            while !stop.load(Ordering::Relaxed) {
                let j = rng.random_range(0..PEERS);
                let newest = net.edition_seen(j, j).unwrap_or(0);
                if newest >= 2 {
                    let edition = rng.random_range(1..newest);
                    net.corrupt_edition(j, edition);
                    corrupted.fetch_add(1, Ordering::Relaxed);
                }
                time::sleep(Duration::from_millis(7)).await;
            }
        }));
    }

    time::sleep(Duration::from_secs(2)).await;
    stop.store(true, Ordering::Relaxed);
    for h in handles {
        h.await.unwrap();
    }

    assert!(published.load(Ordering::Relaxed) > PEERS);
    assert!(corrupted.load(Ordering::Relaxed) > 0);

    // Every peer publishes one clean edition on top of the damage.
    let mut newest = Vec::with_capacity(PEERS);
    for i in 0..PEERS {
        net.post(i, "final").await;
        newest.push(net.edition_seen(i, i).unwrap());
    }

    // A refresh probes a bounded window, so a lagging node may need a few.
    for _ in 0..32 {
        net.sync_all().await;
        let converged = (0..PEERS).all(|i| {
            (0..PEERS).all(|j| net.edition_seen(i, j) == Some(newest[j]))
        });
        if converged {
            break;
        }
    }

    for i in 0..PEERS {
        for j in 0..PEERS {
            assert_eq!(
                net.edition_seen(i, j),
                Some(newest[j]),
                "node {i} did not converge on peer {j}"
            );
        }
        let posts = net.node(i).posts_of(&net.identity((i + 1) % PEERS), None);
        assert!(posts.iter().any(|p| p.text == "final"));
    }

    // Rescue from the newest edition succeeds immediately everywhere.
    for j in 0..PEERS {
        let observer = (j + 1) % PEERS;
        let rescuer = net.node(observer).rescuer(&net.identity(j)).unwrap();
        rescuer.start_next_fetch().unwrap();
        let session = rescuer.finished().await;
        assert!(session.last_fetch_successful, "rescue of peer {j} failed");
        assert_eq!(session.recovered_edition, Some(newest[j]));
    }

    net.shutdown().await;
}
