use std::{
    thread,
    time::{Duration, Instant},
};

use lifeguard::{
    probe,
    test_utils::{TestListener, free_port},
};

#[test]
fn zero_timeout_checks_exactly_once() {
    let port = free_port();
    let began = Instant::now();
    assert!(!probe::wait_for_reachability("127.0.0.1", port, Duration::ZERO, true));
    assert!(probe::wait_for_reachability("127.0.0.1", port, Duration::ZERO, false));
    assert!(began.elapsed() < Duration::from_secs(2));
}

#[test]
fn waits_for_a_port_that_opens_later() {
    let port = free_port();
    let opener = thread::spawn(move || {
        thread::sleep(Duration::from_millis(400));
        let listener = std::net::TcpListener::bind(("127.0.0.1", port)).unwrap();
        thread::sleep(Duration::from_secs(2));
        drop(listener);
    });

    assert!(probe::wait_for_reachability(
        "127.0.0.1",
        port,
        Duration::from_secs(5),
        true
    ));
    opener.join().unwrap();
}

#[test]
fn waits_for_a_port_to_close() {
    let listener = TestListener::bind();
    let port = listener.port();
    let closer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        listener.close();
    });

    assert!(probe::wait_for_reachability(
        "127.0.0.1",
        port,
        Duration::from_secs(5),
        false
    ));
    closer.join().unwrap();
}

#[test]
fn port_set_requires_every_port() {
    let a = TestListener::bind();
    let b = TestListener::bind();
    let closed = free_port();

    assert!(probe::all_reachable("127.0.0.1", &[a.port(), b.port()]));
    assert!(!probe::all_reachable("127.0.0.1", &[a.port(), closed]));
    assert!(!probe::none_reachable("127.0.0.1", &[closed, b.port()]));
    assert!(probe::none_reachable("127.0.0.1", &[closed]));

    let began = Instant::now();
    assert!(!probe::poll_until(
        Duration::from_millis(600),
        probe::POLL_INTERVAL,
        || probe::all_reachable("127.0.0.1", &[a.port(), closed])
    ));
    assert!(began.elapsed() >= Duration::from_millis(600));
}

#[test]
fn unresolvable_host_is_unreachable() {
    assert!(!probe::is_reachable("host.invalid", 80));
}
