// tests/round_robin.rs

use proptest::prelude::*;
use tcp_balancer::load_balancer::{NoHealthyUpstream, RoundRobin};
use tcp_balancer::proxy::ServerPool;

fn pool_of(n: u16) -> ServerPool {
    let ports: Vec<u16> = (9001..9001 + n).collect();
    ServerPool::new(7070, &ports).unwrap()
}

#[test]
fn full_cycle_visits_every_upstream_once_in_order() {
    let pool = pool_of(5);
    let router = RoundRobin::new();

    let picked: Vec<String> = (0..5)
        .map(|_| router.next_healthy(&pool).unwrap().address.clone())
        .collect();

    let expected: Vec<String> = pool.addresses().iter().map(|a| a.to_string()).collect();
    assert_eq!(picked, expected);

    // The next cycle continues in the same order.
    let second: Vec<String> = (0..5)
        .map(|_| router.next_healthy(&pool).unwrap().address.clone())
        .collect();
    assert_eq!(second, expected);
}

#[test]
fn single_healthy_upstream_is_always_selected() {
    let pool = pool_of(4);
    let router = RoundRobin::new();
    for index in [0, 2, 3] {
        pool.set_healthy(index, false);
    }

    for _ in 0..10 {
        let picked = router.next_healthy(&pool).unwrap();
        assert_eq!(picked.address, "127.0.0.1:9002");
    }
}

#[test]
fn no_healthy_upstream_fails_and_cursor_is_net_unchanged() {
    let pool = pool_of(3);
    let router = RoundRobin::new();

    // Establish a cursor position with one successful selection.
    router.next_healthy(&pool).unwrap();
    assert_eq!(router.cursor(), 0);

    for index in 0..3 {
        pool.set_healthy(index, false);
    }
    assert_eq!(router.next_healthy(&pool).unwrap_err(), NoHealthyUpstream);
    // One full cycle scanned, landing back on the same position.
    assert_eq!(router.cursor(), 0);

    // Recovery resumes the sequence where it left off.
    pool.set_healthy(1, true);
    assert_eq!(router.next_healthy(&pool).unwrap().address, "127.0.0.1:9002");
}

#[test]
fn failed_selection_from_initial_cursor_leaves_sentinel_position() {
    let pool = pool_of(3);
    let router = RoundRobin::new();
    for index in 0..3 {
        pool.set_healthy(index, false);
    }

    assert_eq!(router.cursor(), -1);
    assert_eq!(router.next_healthy(&pool).unwrap_err(), NoHealthyUpstream);
    // -1 and len-1 are the same position modulo the pool size.
    assert_eq!(router.cursor(), 2);
}

#[test]
fn unhealthy_members_are_skipped_every_cycle() {
    // Pool = [S1 healthy, S2 unhealthy, S3 healthy]; from the initial
    // cursor the selections must go S1, S3, S1.
    let pool = pool_of(3);
    let router = RoundRobin::new();
    pool.set_healthy(1, false);

    assert_eq!(router.next_healthy(&pool).unwrap().address, "127.0.0.1:9001");
    assert_eq!(router.next_healthy(&pool).unwrap().address, "127.0.0.1:9003");
    assert_eq!(router.next_healthy(&pool).unwrap().address, "127.0.0.1:9001");
}

#[test]
fn concurrent_callers_claim_distinct_positions() {
    use std::collections::HashMap;
    use std::sync::Arc;

    let pool = Arc::new(pool_of(8));
    let router = Arc::new(RoundRobin::new());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pool = pool.clone();
            let router = router.clone();
            std::thread::spawn(move || {
                let mut picks = Vec::new();
                for _ in 0..16 {
                    picks.push(router.next_healthy(&pool).unwrap().address.clone());
                }
                picks
            })
        })
        .collect();

    let mut counts: HashMap<String, usize> = HashMap::new();
    for handle in handles {
        for address in handle.join().unwrap() {
            *counts.entry(address).or_default() += 1;
        }
    }

    // 64 selections over 8 upstreams: every member claimed exactly 8 times.
    assert_eq!(counts.len(), 8);
    for (_, count) in counts {
        assert_eq!(count, 8);
    }
}

proptest! {
    #[test]
    fn n_selections_visit_each_member_exactly_once(n in 1u16..32) {
        let pool = pool_of(n);
        let router = RoundRobin::new();

        let picked: Vec<String> = (0..n)
            .map(|_| router.next_healthy(&pool).unwrap().address.clone())
            .collect();
        let expected: Vec<String> =
            pool.addresses().iter().map(|a| a.to_string()).collect();

        prop_assert_eq!(picked, expected);
    }
}
