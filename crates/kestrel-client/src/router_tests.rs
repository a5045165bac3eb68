//! Tests for sticky read routing.

use super::*;

fn routes(router: &mut StickyRouter, queue: &str, count: usize) -> Vec<ReadRoute> {
    (0..count).map(|_| router.select(queue)).collect()
}

#[test]
fn test_first_read_is_random() {
    let mut router = StickyRouter::new(3);
    assert_eq!(router.select("jobs"), ReadRoute::Random);
    assert_eq!(router.current_queue(), Some("jobs"));
}

#[test]
fn test_budget_of_n_gives_one_random_then_n_sticky() {
    let mut router = StickyRouter::new(4);
    let selected = routes(&mut router, "jobs", 5);

    assert_eq!(selected[0], ReadRoute::Random);
    assert!(selected[1..].iter().all(|r| *r == ReadRoute::Sticky));

    // Budget exhausted: the next read re-randomizes
    assert_eq!(router.select("jobs"), ReadRoute::Random);
}

#[test]
fn test_long_run_matches_budget() {
    let mut router = StickyRouter::new(100);
    let selected = routes(&mut router, "a_queue", 102);

    let random = selected.iter().filter(|r| **r == ReadRoute::Random).count();
    let sticky = selected.iter().filter(|r| **r == ReadRoute::Sticky).count();
    assert_eq!(random, 2);
    assert_eq!(sticky, 100);
}

#[test]
fn test_queue_change_resets_counter() {
    let mut router = StickyRouter::new(10);
    router.select("jobs");
    router.select("jobs");
    assert_eq!(router.counter(), 1);

    assert_eq!(router.select("other"), ReadRoute::Random);
    assert_eq!(router.counter(), 0);
    assert_eq!(router.select("other"), ReadRoute::Sticky);
}

#[test]
fn test_empty_read_forces_random_next() {
    let mut router = StickyRouter::new(10);
    assert_eq!(router.select("jobs"), ReadRoute::Random);
    assert_eq!(router.select("jobs"), ReadRoute::Sticky);

    router.record_empty();
    assert_eq!(router.select("jobs"), ReadRoute::Random);
    assert_eq!(router.select("jobs"), ReadRoute::Sticky);
}

#[test]
fn test_zero_budget_always_random() {
    let mut router = StickyRouter::new(0);
    let selected = routes(&mut router, "jobs", 3);
    assert!(selected.iter().all(|r| *r == ReadRoute::Random));
}

#[test]
fn test_last_server_tracking() {
    let mut router = StickyRouter::new(1);
    assert_eq!(router.last_server(), None);
    router.set_last_server(2);
    assert_eq!(router.last_server(), Some(2));
}
