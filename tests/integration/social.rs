//! Integration test: posts, replies and listings across nodes.
//!
//! Nodes only share the store; everything one node learns about another
//! identity comes from refreshing the editions that identity published.

use tern_engine::LookupResult;
use tern_integration_tests::Network;
use tern_types::events::{PostFound, PostRemoved};

#[tokio::test]
async fn test_posts_propagate_between_nodes() {
    let net = Network::new(2);
    net.connect_all();

    let post = net.post(0, "hello from alice").await;
    assert_eq!(net.edition_seen(1, 0), None);

    net.sync(1).await;

    assert_eq!(net.edition_seen(1, 0), Some(1));
    let posts = net.node(1).posts_of(&net.identity(0), Some(net.identity(1)));
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].id, post);
    assert_eq!(posts[0].text, "hello from alice");
    assert_eq!(posts[0].owner, net.identity(0));
    net.shutdown().await;
}

#[tokio::test]
async fn test_reply_thread_across_nodes() {
    let net = Network::new(2);
    net.connect_all();
    let (alice, bob) = (net.identity(0), net.identity(1));

    let post = net.post(0, "question").await;
    net.sync(1).await;
    net.clock().advance(1_000);
    let first = net.reply(1, &post, "answer").await;
    net.clock().advance(1_000);
    let second = net.reply(1, &post, "addendum").await;
    net.sync(0).await;

    let replies = net.node(0).replies_to(&post, Some(alice));
    let ids: Vec<_> = replies.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![first, second]);
    assert!(replies.iter().all(|r| r.owner == bob));

    // Bob replied to a post he neither owns nor received.
    let replied = net.node(0).replied_posts(&bob, Some(alice));
    assert_eq!(replied.len(), 1);
    assert_eq!(replied[0].id, post);
    net.shutdown().await;
}

#[tokio::test]
async fn test_feed_holds_followed_and_directed_posts() {
    let net = Network::new(3);
    let me = net.identity(0);
    net.track_all(0);
    net.follow(0, 1);

    let followed = net.post(1, "from a followee").await;
    net.clock().advance(1_000);
    let stranger = net.post(2, "from a stranger").await;
    net.clock().advance(1_000);
    let directed = net.post_to(2, 0, "for you").await;
    net.clock().advance(1_000);
    let own = net.post(0, "my own").await;
    net.sync(0).await;

    let feed: Vec<_> = net.node(0).feed(&me).iter().map(|p| p.id).collect();
    assert_eq!(feed, vec![own, directed, followed]);
    assert!(!feed.contains(&stranger));

    // Directed posts also show up on the recipient's page.
    let page: Vec<_> = net
        .node(0)
        .posts_of(&me, Some(me))
        .iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(page, vec![own, directed]);
    net.shutdown().await;
}

#[tokio::test]
async fn test_new_posts_until_marked_known() {
    let net = Network::new(2);
    net.connect_all();
    let bob = net.identity(1);
    let mut found = net.node(1).events().subscribe::<PostFound>();

    let post = net.post(0, "fresh").await;
    net.sync(1).await;

    assert_eq!(found.try_recv().unwrap().post.id, post);
    let new: Vec<_> = net.node(1).new_posts(Some(bob)).iter().map(|p| p.id).collect();
    assert_eq!(new, vec![post]);

    net.node(1).mark_post_known(post);
    assert!(net.node(1).new_posts(Some(bob)).is_empty());

    // Bob's own posts never count as new to him.
    net.post(1, "mine").await;
    assert!(net.node(1).new_posts(Some(bob)).is_empty());
    net.shutdown().await;
}

#[tokio::test]
async fn test_deleted_post_disappears_remotely() {
    let net = Network::new(2);
    net.connect_all();
    let (alice, bob) = (net.identity(0), net.identity(1));

    let post = net.post(0, "regrettable").await;
    net.sync(1).await;
    assert_eq!(net.node(1).posts_of(&alice, Some(bob)).len(), 1);

    let mut removed = net.node(1).events().subscribe::<PostRemoved>();
    net.node(0).delete_post(&alice, &post).await.unwrap();
    net.insert(0).await;
    net.sync(1).await;

    assert_eq!(net.edition_seen(1, 0), Some(2));
    assert!(net.node(1).posts_of(&alice, Some(bob)).is_empty());
    assert_eq!(removed.try_recv().unwrap().post.id, post);
    net.shutdown().await;
}

#[tokio::test]
async fn test_lookup_resolves_remote_content() {
    let net = Network::new(2);
    net.connect_all();

    let post = net.post(0, "linked").await;
    net.sync(1).await;
    let reply = net.reply(1, &post, "linked reply").await;

    match net.node(1).lookup(&format!("post://{post}")) {
        Some(LookupResult::Post(found)) => assert_eq!(found.owner, net.identity(0)),
        other => panic!("expected post, got {other:?}"),
    }
    match net.node(1).lookup(&format!("reply://{reply}")) {
        Some(LookupResult::Post(parent)) => assert_eq!(parent.id, post),
        other => panic!("expected parent post, got {other:?}"),
    }
    match net.node(1).lookup(&net.identity(0).to_string()) {
        Some(LookupResult::Identity(id)) => assert_eq!(id, net.identity(0)),
        other => panic!("expected identity, got {other:?}"),
    }
    net.shutdown().await;
}

#[tokio::test]
async fn test_many_nodes_converge() {
    let net = Network::new(5);
    net.connect_all();

    for round in 0..3 {
        for i in 0..net.len() {
            net.post(i, &format!("node {i} round {round}")).await;
        }
    }
    net.sync_all().await;

    for i in 0..net.len() {
        for j in 0..net.len() {
            if i != j {
                assert_eq!(net.edition_seen(i, j), Some(3), "node {i} sees {j}");
            }
        }
        let viewer = Some(net.identity(i));
        let total: usize = (0..net.len())
            .map(|j| net.node(i).posts_of(&net.identity(j), viewer).len())
            .sum();
        assert_eq!(total, 15);
    }
    net.shutdown().await;
}
