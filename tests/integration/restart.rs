//! Integration test: nodes restarting on an existing store.

use tern_integration_tests::Network;

#[tokio::test]
async fn test_restart_restores_own_document() {
    let mut net = Network::new(1);
    let me = net.identity(0);
    for i in 0..3 {
        net.post(0, &format!("post {i}")).await;
    }

    net.restart(0).await;

    let snapshot = net.node(0).identity(&me).unwrap();
    assert_eq!(snapshot.edition, 3);
    assert_eq!(snapshot.document.as_ref().unwrap().posts.len(), 3);
    assert!(net.node(0).is_local(&me));

    // Publishing continues after the restored edition.
    net.node(0)
        .create_post(&me, None, "after restart")
        .await
        .unwrap();
    assert_eq!(net.insert(0).await, 4);
    net.shutdown().await;
}

#[tokio::test]
async fn test_restart_overwrites_corrupt_latest_edition() {
    let mut net = Network::new(2);
    net.connect_all();
    for i in 0..3 {
        net.post(0, &format!("post {i}")).await;
    }
    net.corrupt_edition(0, 3);

    net.restart(0).await;
    assert_eq!(net.edition_seen(0, 0), Some(2));

    // The next insert reuses the broken slot with a valid document.
    net.post(0, "repaired").await;
    net.sync(1).await;
    assert_eq!(net.edition_seen(1, 0), Some(3));
    let posts = net.node(1).posts_of(&net.identity(0), None);
    assert_eq!(posts.len(), 3);
    assert!(posts.iter().any(|p| p.text == "repaired"));
    assert!(!posts.iter().any(|p| p.text == "post 2"));
    net.shutdown().await;
}

#[tokio::test]
async fn test_restarted_node_catches_up_after_retracking() {
    let mut net = Network::new(3);
    net.connect_all();
    net.post(1, "before").await;
    net.sync(0).await;
    assert_eq!(net.edition_seen(0, 1), Some(1));

    net.restart(0).await;
    assert_eq!(net.edition_seen(0, 1), None);

    net.post(1, "while away").await;
    net.post(2, "also while away").await;
    net.track_all(0);
    net.sync(0).await;

    assert_eq!(net.edition_seen(0, 1), Some(2));
    assert_eq!(net.edition_seen(0, 2), Some(1));
    net.shutdown().await;
}

#[tokio::test]
async fn test_unpublished_drafts_do_not_survive_restart() {
    let mut net = Network::new(1);
    let me = net.identity(0);
    net.post(0, "published").await;
    net.node(0)
        .create_post(&me, None, "draft only")
        .await
        .unwrap();
    assert!(net.node(0).is_modified(&me));

    net.restart(0).await;

    let posts = net.node(0).posts_of(&me, Some(me));
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].text, "published");
    assert!(!net.node(0).is_modified(&me));
    net.shutdown().await;
}
