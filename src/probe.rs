//! TCP reachability checks with bounded polling.
use std::{
    net::{TcpStream, ToSocketAddrs},
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, trace};

/// Interval between reachability checks while waiting.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Upper bound on a single connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Opens and immediately closes a connection to `host:port`. Any failure (refused, timed
/// out, unresolvable host) reads as "not reachable".
pub fn is_reachable(host: &str, port: u16) -> bool {
    let addrs = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(err) => {
            debug!("Unable to resolve {host}:{port}: {err}");
            return false;
        }
    };

    for addr in addrs {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => {
                drop(stream);
                return true;
            }
            Err(err) => trace!("{addr} not reachable: {err}"),
        }
    }
    false
}

/// True when every port in `ports` is reachable right now.
pub fn all_reachable(host: &str, ports: &[u16]) -> bool {
    ports.iter().all(|port| is_reachable(host, *port))
}

/// True when no port in `ports` is reachable right now.
pub fn none_reachable(host: &str, ports: &[u16]) -> bool {
    !ports.iter().any(|port| is_reachable(host, *port))
}

/// Polls a single port until its reachability equals `want_reachable` or `timeout` elapses.
/// Returns whether the desired state was observed; a timeout is not an error.
pub fn wait_for_reachability(
    host: &str,
    port: u16,
    timeout: Duration,
    want_reachable: bool,
) -> bool {
    poll_until(timeout, POLL_INTERVAL, || {
        is_reachable(host, port) == want_reachable
    })
}

/// Evaluates `condition` at least once, then every `interval` until it holds or `timeout`
/// elapses.
pub fn poll_until<F>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep(interval.min(deadline - now));
    }
}
