//! Functional tests for the combination engine driven through a session.
//!
//! Core guarantees exercised here:
//! - The pair key is commutative: A+B and B+A resolve to one element.
//! - A pair is fused at most once, even under concurrent merge requests.
//! - A discovery reaches the durable store before the registry or cache,
//!   and a failed write leaves neither behind.
//! - A successful merge swaps two instances for one at their midpoint,
//!   atomically; a failed merge leaves the workspace untouched.

use craft_element::PairKey;
use craft_engine::{CraftError, DropResult, MergeOutcome, Phase, Point};
use craft_store::{ElementStore, SessionKey};
use craft_test_utils::{FakeFuser, Harness};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Scenario: Fire + Water yields a new element with sorted parents, stored
/// durably and placed at the midpoint of the consumed instances.
#[tokio::test]
async fn fire_and_water_make_a_new_element() {
    let h = Harness::new().await;
    h.classic_seeds().await;
    let fire = h.element("Fire");
    let water = h.element("Water");

    let a = h.session.place(fire.id(), Point::new(200.0, 200.0)).unwrap();
    let b = h.session.place(water.id(), Point::new(400.0, 300.0)).unwrap();
    let outcome = h.session.merge_instances(a, b).await.unwrap();

    let MergeOutcome::Merged {
        element,
        instance,
        discovered,
    } = outcome
    else {
        panic!("expected a merge, got {outcome:?}");
    };
    assert!(discovered);
    assert!(["Fire + Water", "Water + Fire"].contains(&element.title.as_str()));

    let mut expected = [fire.id(), water.id()];
    expected.sort();
    assert_eq!(element.parents().unwrap().ids(), expected);

    assert!(h.store.inner.contains(element.id()));
    assert!(h.session.element(element.id()).is_some());
    assert_eq!(h.session.discoveries().len(), 5);

    // (140,140) and (340,240) are the two origins
    assert_eq!(instance.position(), Point::new(240.0, 190.0));
    assert_eq!(instance.element_id, element.id());
    assert_eq!(h.session.instances(), vec![instance]);
}

/// Tenet: combine(A, B) and combine(B, A) hit the same cache entry.
#[tokio::test]
async fn combination_is_commutative() {
    let h = Harness::new().await;
    h.classic_seeds().await;
    let earth = h.element("Earth");
    let air = h.element("Air");

    let a1 = h.session.place(earth.id(), Point::new(100.0, 100.0)).unwrap();
    let b1 = h.session.place(air.id(), Point::new(300.0, 100.0)).unwrap();
    let first = h.session.merge_instances(a1, b1).await.unwrap();

    let a2 = h.session.place(air.id(), Point::new(100.0, 400.0)).unwrap();
    let b2 = h.session.place(earth.id(), Point::new(300.0, 400.0)).unwrap();
    let second = h.session.merge_instances(a2, b2).await.unwrap();

    assert_eq!(first.element().id(), second.element().id());
    assert_eq!(h.fuser.total_calls(), 1);
    assert!(
        h.session
            .cache()
            .contains(&PairKey::new(air.id(), earth.id()))
            .await
    );
}

/// Tenet: repeating a combination issues no second fusion call.
#[tokio::test]
async fn repeated_combination_uses_cache() {
    let h = Harness::new().await;
    h.classic_seeds().await;
    let fire = h.element("Fire");
    let earth = h.element("Earth");

    for _ in 0..3 {
        let a = h.session.place(fire.id(), Point::new(100.0, 100.0)).unwrap();
        let b = h.session.place(earth.id(), Point::new(150.0, 150.0)).unwrap();
        h.session.merge_instances(a, b).await.unwrap();
    }

    assert_eq!(h.fuser.calls_for(&fire, &earth), 1);
    assert_eq!(h.session.discoveries().len(), 5);
    assert_eq!(h.session.instances().len(), 3);
}

/// Tenet: concurrent merges of the same pair share one in-flight fusion.
#[tokio::test]
async fn concurrent_same_pair_merges_fuse_once() {
    let gate = Arc::new(Semaphore::new(0));
    let h = Harness::with_fuser(FakeFuser::gated(gate.clone())).await;
    h.classic_seeds().await;
    let fire = h.element("Fire");
    let water = h.element("Water");

    let a1 = h.session.place(fire.id(), Point::new(100.0, 100.0)).unwrap();
    let b1 = h.session.place(water.id(), Point::new(300.0, 100.0)).unwrap();
    let a2 = h.session.place(water.id(), Point::new(100.0, 400.0)).unwrap();
    let b2 = h.session.place(fire.id(), Point::new(300.0, 400.0)).unwrap();

    let release = async {
        h.fuser.wait_started().await;
        tokio::task::yield_now().await;
        gate.add_permits(1);
    };
    let (first, second, ()) = tokio::join!(
        h.session.merge_instances(a1, b1),
        h.session.merge_instances(a2, b2),
        release
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(h.fuser.total_calls(), 1);
    assert_eq!(first.element().id(), second.element().id());
    let discovered = [&first, &second]
        .iter()
        .filter(|o| matches!(o, MergeOutcome::Merged { discovered: true, .. }))
        .count();
    assert_eq!(discovered, 1);
    assert_eq!(h.session.discoveries().len(), 5);
    assert_eq!(h.session.instances().len(), 2);
}

/// Tenet: no registry or cache entry without a durable record.
///
/// The durable write is the first commit step, so failing it must leave
/// every later step unwritten and the merge safely retryable.
#[tokio::test]
async fn store_failure_leaves_no_dangling_entries() {
    let h = Harness::new().await;
    h.classic_seeds().await;
    let fire = h.element("Fire");
    let water = h.element("Water");
    let a = h.session.place(fire.id(), Point::new(100.0, 100.0)).unwrap();
    let b = h.session.place(water.id(), Point::new(300.0, 100.0)).unwrap();
    let before = h.session.instances();

    h.store.fail_puts(true);
    let err = h.session.merge_instances(a, b).await.unwrap_err();
    assert!(matches!(err, CraftError::Store(_)));
    assert!(err.is_retryable());

    assert_eq!(h.session.discoveries().len(), 4);
    assert_eq!(h.store.inner.len(), 4);
    assert!(!h.session.cache().contains(&PairKey::new(fire.id(), water.id())).await);
    assert_eq!(h.session.instances(), before);

    h.store.fail_puts(false);
    let outcome = h.session.merge_instances(a, b).await.unwrap();
    assert!(matches!(outcome, MergeOutcome::Merged { discovered: true, .. }));
    assert_eq!(h.fuser.total_calls(), 2);
    assert_eq!(h.store.inner.len(), 5);
}

/// Tenet: a failed fusion mutates nothing and can be retried.
#[tokio::test]
async fn generation_failure_keeps_workspace() {
    let h = Harness::new().await;
    h.classic_seeds().await;
    let a = h.session.place(h.element("Fire").id(), Point::new(100.0, 100.0)).unwrap();
    let b = h.session.place(h.element("Air").id(), Point::new(300.0, 100.0)).unwrap();
    let before = h.session.instances();

    h.fuser.fail_next(1);
    let err = h.session.merge_instances(a, b).await.unwrap_err();
    assert!(matches!(err, CraftError::Generation(_)));
    assert!(err.user_message().starts_with("Failed to combine"));
    assert_eq!(h.session.instances(), before);
    assert_eq!(h.session.discoveries().len(), 4);

    assert!(h.session.merge_instances(a, b).await.is_ok());
}

/// A source vanishing mid-generation keeps the discovery but not the swap.
#[tokio::test]
async fn vanished_source_yields_stale_outcome() {
    let gate = Arc::new(Semaphore::new(0));
    let h = Harness::with_fuser(FakeFuser::gated(gate.clone())).await;
    h.classic_seeds().await;
    let a = h.session.place(h.element("Water").id(), Point::new(100.0, 100.0)).unwrap();
    let b = h.session.place(h.element("Earth").id(), Point::new(300.0, 100.0)).unwrap();

    let interfere = async {
        h.fuser.wait_started().await;
        h.session.workspace().remove(&[a]);
        gate.add_permits(1);
    };
    let (outcome, ()) = tokio::join!(h.session.merge_instances(a, b), interfere);

    let MergeOutcome::Stale { element } = outcome.unwrap() else {
        panic!("expected a stale merge");
    };
    assert!(h.store.inner.contains(element.id()));
    assert_eq!(h.session.instances().len(), 1);
    assert_eq!(h.session.instances()[0].instance_id, b);
}

/// Tenet: a reset while a fusion is running leaves nothing behind once the
/// fusion finishes.
#[tokio::test]
async fn reset_during_generation_discards_result() {
    let gate = Arc::new(Semaphore::new(0));
    let h = Harness::with_fuser(FakeFuser::gated(gate.clone())).await;
    h.classic_seeds().await;
    let fire = h.element("Fire");
    let water = h.element("Water");
    let a = h.session.place(fire.id(), Point::new(100.0, 100.0)).unwrap();
    let b = h.session.place(water.id(), Point::new(300.0, 100.0)).unwrap();

    let interfere = async {
        h.fuser.wait_started().await;
        h.session.reset().await.unwrap();
        gate.add_permits(1);
    };
    let (outcome, ()) = tokio::join!(h.session.merge_instances(a, b), interfere);

    assert!(matches!(outcome, Err(CraftError::Superseded)));
    assert_eq!(h.fuser.total_calls(), 1);
    assert!(h.store.get_all().await.unwrap().is_empty());
    assert!(h.session.discoveries().is_empty());
    assert!(h.session.instances().is_empty());
    assert!(h.session.cache().get(&PairKey::new(fire.id(), water.id())).await.is_none());
    assert!(!h.state.contains(SessionKey::CombinationCache));
    assert_eq!(h.session.phase(), Phase::AwaitingSeeds);
}

/// An instance cannot be merged with itself; no fusion is requested.
#[tokio::test]
async fn merging_instance_with_itself_is_rejected() {
    let h = Harness::new().await;
    h.classic_seeds().await;
    let a = h.session.place(h.element("Fire").id(), Point::new(100.0, 100.0)).unwrap();

    let err = h.session.merge_instances(a, a).await.unwrap_err();

    assert!(matches!(err, CraftError::SelfMerge(id) if id == a));
    assert_eq!(h.fuser.total_calls(), 0);
    assert_eq!(h.session.discoveries().len(), 4);
    assert_eq!(h.session.instances().len(), 1);
}

/// Dragging one instance onto another runs the merge.
#[tokio::test]
async fn drop_onto_partner_merges() {
    let h = Harness::new().await;
    h.classic_seeds().await;
    let a = h.session.place(h.element("Fire").id(), Point::new(200.0, 200.0)).unwrap();
    let b = h.session.place(h.element("Air").id(), Point::new(500.0, 200.0)).unwrap();

    h.session.begin_drag(b, Point::new(500.0, 200.0)).unwrap();
    h.session.update_drag(b, Point::new(350.0, 200.0));
    h.session.update_drag(b, Point::new(240.0, 210.0));
    let result = h.session.end_drag(b).await.unwrap();

    let DropResult::Merged(MergeOutcome::Merged { element, .. }) = result else {
        panic!("expected merge, got {result:?}");
    };
    assert!(element.title.contains("Air") && element.title.contains("Fire"));
    assert!(h.session.workspace().get(a).is_none());
    assert!(h.session.workspace().get(b).is_none());
    assert_eq!(h.session.instances().len(), 1);
}

/// Edge-touching instances are not partners.
#[tokio::test]
async fn edge_touching_drop_only_moves() {
    let h = Harness::new().await;
    h.classic_seeds().await;
    h.session.place(h.element("Fire").id(), Point::new(200.0, 200.0)).unwrap();
    let b = h.session.place(h.element("Air").id(), Point::new(600.0, 200.0)).unwrap();

    // Fire spans x 140..260; Air ends up at x 260..380
    h.session.begin_drag(b, Point::new(600.0, 200.0)).unwrap();
    h.session.update_drag(b, Point::new(320.0, 200.0));
    assert!(matches!(h.session.end_drag(b).await.unwrap(), DropResult::Moved));
    assert_eq!(h.session.instances().len(), 2);
    assert_eq!(h.fuser.total_calls(), 0);
}
