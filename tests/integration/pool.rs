use std::{
    sync::{Arc, Barrier},
    thread,
};

use lifeguard::pool::{self, ResourcePool};

#[test]
fn concurrent_allocation_of_one_resource_has_one_winner() {
    const THREADS: usize = 16;
    let pool = Arc::new(ResourcePool::new());
    pool.add("brokers", "broker-1", true);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                pool.allocate("brokers", "broker-1")
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
    assert!(pool.available("brokers").is_empty());
}

#[test]
fn concurrent_allocate_any_hands_out_each_resource_once() {
    const THREADS: usize = 12;
    let pool = Arc::new(ResourcePool::new());
    for i in 0..4 {
        pool.add("tomcats", &format!("tomcat-{i}"), true);
    }
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                pool.allocate_any("tomcats")
            })
        })
        .collect();

    let mut allocated: Vec<String> = handles
        .into_iter()
        .filter_map(|handle| handle.join().unwrap())
        .collect();
    allocated.sort();
    assert_eq!(
        allocated,
        vec!["tomcat-0", "tomcat-1", "tomcat-2", "tomcat-3"]
    );
}

#[test]
fn released_resource_can_be_taken_again() {
    let pool = ResourcePool::new();
    pool.add("zk", "ensemble-a", true);
    assert!(pool.allocate("zk", "ensemble-a"));
    pool.release("zk", "ensemble-a");
    assert_eq!(pool.allocate_any("zk").as_deref(), Some("ensemble-a"));
}

#[test]
fn global_pool_is_shared_across_threads() {
    pool::global().add("global-integration", "slot", true);
    let taken = thread::spawn(|| pool::global().allocate("global-integration", "slot"))
        .join()
        .unwrap();
    assert!(taken);
    assert!(!pool::global().allocate("global-integration", "slot"));
    pool::global().release("global-integration", "slot");
}
