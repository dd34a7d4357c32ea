#[path = "common/mod.rs"]
mod common;

use common::{ScriptedControl, linux_line};
use lifeguard::reaper::{Reaper, SocketState};

#[test]
fn one_kill_attempt_per_matching_line_and_unparsable_lines_counted() {
    let listing = [
        "Active Internet connections (servers and established)".to_string(),
        "Proto Recv-Q Send-Q Local Address           Foreign Address         State       PID/Program name".to_string(),
        linux_line(8080, "LISTEN", 101),
        linux_line(8080, "LISTEN", 101),
        linux_line(8080, "LISTEN", 102),
        linux_line(8080, "ESTABLISHED", 103),
        linux_line(8005, "LISTEN", 104),
        "tcp        0      0 0.0.0.0:8080            0.0.0.0:*               LISTEN      -".to_string(),
        "garbage that is not a socket line".to_string(),
        String::new(),
    ]
    .join("\n");

    let reaper = Reaper::new(ScriptedControl::new(listing));
    let report = reaper.kill_by_port(8080, &[SocketState::Listen]).unwrap();

    // PID 101 appears on two matching lines and is attempted twice.
    assert_eq!(report.killed, vec![101, 101, 102]);
    assert_eq!(reaper.control().kills(), vec![101, 101, 102]);
    assert_eq!(report.attempts(), 3);
    // Two headers, the PID-less line and the garbage line; the blank line is ignored.
    assert_eq!(report.unparsable, 4);
    assert!(report.is_clean());
}

#[test]
fn one_failed_kill_does_not_stop_the_rest() {
    let listing = [
        linux_line(61616, "LISTEN", 201),
        linux_line(61616, "LISTEN", 202),
        linux_line(61616, "LISTEN", 203),
    ]
    .join("\n");

    let reaper = Reaper::new(ScriptedControl::new(listing).failing(&[202]));
    let report = reaper.kill_by_port(61616, &[SocketState::Listen]).unwrap();

    assert_eq!(report.killed, vec![201, 203]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, 202);
    assert_eq!(report.attempts(), 3);
    assert!(!report.is_clean());
}

#[test]
fn windows_listing_and_multiple_states() {
    let listing = "\r
Active Connections\r
\r
  Proto  Local Address          Foreign Address        State           PID\r
  TCP    0.0.0.0:2181           0.0.0.0:0              LISTENING       3001\r
  TCP    127.0.0.1:2181         127.0.0.1:50123        ESTABLISHED     3002\r
  TCP    127.0.0.1:2181         127.0.0.1:50124        TIME_WAIT       0\r
  UDP    0.0.0.0:2181           *:*                                    3003\r
";

    let reaper = Reaper::new(ScriptedControl::new(listing));
    let report = reaper
        .kill_by_port(2181, &[SocketState::Listen, SocketState::Established])
        .unwrap();
    assert_eq!(report.killed, vec![3001, 3002]);

    let everything = Reaper::new(ScriptedControl::new(listing))
        .kill_by_port(2181, &[])
        .unwrap();
    // PID 0 is never a kill target.
    assert_eq!(everything.killed, vec![3001, 3002, 3003]);
}

#[test]
fn no_match_is_an_empty_report() {
    let reaper = Reaper::new(ScriptedControl::new(linux_line(9000, "LISTEN", 5)));
    let report = reaper.kill_by_port(9001, &[SocketState::Listen]).unwrap();
    assert!(report.killed.is_empty());
    assert_eq!(report.attempts(), 0);
    assert!(reaper.control().kills().is_empty());
}

#[test]
fn own_pid_is_never_killed() {
    let own = std::process::id();
    let reaper = Reaper::new(ScriptedControl::new(linux_line(7000, "LISTEN", own)));
    let report = reaper.kill_by_port(7000, &[SocketState::Listen]).unwrap();
    assert!(report.killed.is_empty());
}

#[test]
fn window_title_kill_goes_through_control() {
    let reaper = Reaper::new(ScriptedControl::new(""));
    reaper.kill_by_window_title("Tomcat").unwrap();
    assert_eq!(
        reaper.control().signatures.lock().unwrap().clone(),
        vec!["Tomcat".to_string()]
    );
}

#[cfg(unix)]
#[test]
fn kill_by_pid_terminates_a_real_process() {
    use lifeguard::platform::Platform;
    use std::{process::Command, thread, time::Duration};

    let mut child = Command::new("sleep").arg("30").spawn().unwrap();
    let reaper = Reaper::system(Platform::Posix);
    reaper.kill_by_pid(child.id()).unwrap();

    let mut exited = false;
    for _ in 0..50 {
        if child.try_wait().unwrap().is_some() {
            exited = true;
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }
    assert!(exited);

    // Already gone counts as success.
    reaper.kill_by_pid(child.id()).unwrap();
}

#[cfg(unix)]
#[test]
fn window_title_never_matches_posix_command_lines() {
    use lifeguard::{
        platform::Platform,
        reaper::{ProcessControl, SystemProcessControl},
    };
    use std::{fs, process::Command, thread, time::Duration};

    let temp = tempfile::tempdir().unwrap();
    let log = temp.path().join("activemq.log");
    fs::write(&log, "broker log\n").unwrap();
    let mut tail = Command::new("tail").arg("-f").arg(&log).spawn().unwrap();

    let killed = SystemProcessControl::new(Platform::Posix)
        .kill_signature("activemq")
        .unwrap();
    let report = Reaper::system(Platform::Posix)
        .kill_by_window_title("activemq")
        .unwrap();
    thread::sleep(Duration::from_millis(300));

    let still_running = tail.try_wait().unwrap().is_none();
    tail.kill().unwrap();
    tail.wait().unwrap();
    assert!(killed.is_empty());
    assert!(report.killed.is_empty());
    assert!(still_running, "a process merely naming the title was killed");
}
