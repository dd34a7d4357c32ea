#[path = "common/mod.rs"]
mod common;

use std::{
    fs,
    time::{Duration, Instant},
};

use common::{ScriptedControl, linux_line};
use lifeguard::{
    descriptor::ServiceDescriptor,
    error::SupervisorError,
    platform::{CommandSpec, Platform},
    probe,
    supervisor::{LifecycleState, Supervisor},
    test_utils::TestListener,
};
use tempfile::tempdir;

fn noop() -> CommandSpec {
    CommandSpec::new("true", Vec::<String>::new())
}

fn port_bound(name: &str, port: u16) -> ServiceDescriptor {
    let mut descriptor = ServiceDescriptor::new(name, noop());
    descriptor.required_ports = vec![port];
    descriptor.stop_timeout = Duration::from_millis(300);
    descriptor
}

#[test]
fn fallback_kills_whatever_holds_the_port() {
    let dir = tempdir().unwrap();
    let listener = TestListener::bind();
    let port = listener.port();
    let control = ScriptedControl::new(linux_line(port, "LISTEN", 4242)).hold(4242, listener);

    let sup = Supervisor::with_control(port_bound("tomcat", port), Platform::Posix, control)
        .unwrap()
        .with_state_dir(dir.path());
    assert!(!sup.is_stopped());

    sup.stop().unwrap();
    sup.wait_to_stop().unwrap();

    assert_eq!(sup.reaper().control().kills(), vec![4242]);
    assert!(sup.is_stopped());
    assert_eq!(sup.state(), LifecycleState::Stopped);
}

#[test]
fn port_still_held_after_kills_is_a_shutdown_failure() {
    let dir = tempdir().unwrap();
    let listener = TestListener::bind();
    let port = listener.port();
    // The kill is reported as successful but nothing actually lets go of the port.
    let control = ScriptedControl::new(linux_line(port, "LISTEN", 5150));

    let sup = Supervisor::with_control(port_bound("broker", port), Platform::Posix, control)
        .unwrap()
        .with_state_dir(dir.path());

    let err = sup.wait_to_stop().unwrap_err();
    match err {
        SupervisorError::ShutdownFailed { service, reason } => {
            assert_eq!(service, "broker");
            assert!(reason.contains(&port.to_string()));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(sup.state(), LifecycleState::Failed);
    drop(listener);
}

#[test]
fn kill_failures_are_part_of_the_shutdown_failure() {
    let dir = tempdir().unwrap();
    let listener = TestListener::bind();
    let port = listener.port();
    let control = ScriptedControl::new(linux_line(port, "LISTEN", 6060)).failing(&[6060]);

    let sup = Supervisor::with_control(port_bound("zk", port), Platform::Posix, control)
        .unwrap()
        .with_state_dir(dir.path());

    match sup.wait_to_stop().unwrap_err() {
        SupervisorError::ShutdownFailed { reason, .. } => {
            assert!(reason.contains("kill failures"));
            assert!(reason.contains("6060"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn nothing_to_kill_is_a_shutdown_timeout() {
    let dir = tempdir().unwrap();
    let listener = TestListener::bind();
    let port = listener.port();
    let control = ScriptedControl::new(linux_line(port + 1, "LISTEN", 7070));

    let sup = Supervisor::with_control(port_bound("engine", port), Platform::Posix, control)
        .unwrap()
        .with_state_dir(dir.path());

    let began = Instant::now();
    let err = sup.wait_to_stop().unwrap_err();
    assert!(matches!(err, SupervisorError::ShutdownTimeout { .. }));
    // No grace period when nothing was killed.
    assert!(began.elapsed() < Duration::from_secs(4));
    assert!(sup.reaper().control().kills().is_empty());
    drop(listener);
}

#[test]
fn window_title_and_ports_are_both_reaped() {
    let dir = tempdir().unwrap();
    let listener = TestListener::bind();
    let port = listener.port();
    let control = ScriptedControl::new(linux_line(port, "LISTEN", 8181)).hold(8181, listener);

    let mut descriptor = port_bound("tomcat", port);
    descriptor.window_title = Some("Tomcat".into());
    let sup = Supervisor::with_control(descriptor, Platform::Posix, control)
        .unwrap()
        .with_state_dir(dir.path());

    sup.wait_to_stop().unwrap();
    assert_eq!(
        sup.reaper().control().signatures.lock().unwrap().clone(),
        vec!["Tomcat".to_string()]
    );
    assert_eq!(sup.reaper().control().kills(), vec![8181]);
}

#[test]
fn startup_timeout_on_a_port_that_never_opens() {
    let dir = tempdir().unwrap();
    let mut descriptor = ServiceDescriptor::new("late", noop());
    descriptor.required_ports = vec![lifeguard::test_utils::free_port()];
    descriptor.start_timeout = Duration::from_millis(400);
    let log = dir.path().join("late.log");
    fs::write(&log, "booting\n").unwrap();
    descriptor.log_paths = vec![log];

    let sup = Supervisor::with_control(descriptor, Platform::Posix, ScriptedControl::new(""))
        .unwrap()
        .with_state_dir(dir.path());

    match sup.wait_to_start().unwrap_err() {
        SupervisorError::StartupTimeout {
            service, timeout, ..
        } => {
            assert_eq!(service, "late");
            assert_eq!(timeout, Duration::from_millis(400));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(sup.state(), LifecycleState::Failed);
    assert!(sup.reaper().control().kills().is_empty());
}

#[cfg(unix)]
mod posix {
    use super::*;
    use lifeguard::descriptor::ReadyMarker;
    use regex::Regex;

    fn sh(script: &str) -> CommandSpec {
        Platform::Posix.shell(script)
    }

    #[test]
    fn log_marker_readiness() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("engine.log");
        let script = format!(
            "sleep 0.3; echo 'INFO Engine started in 12ms' >> '{}'; exec sleep 30",
            log.display()
        );
        let mut descriptor = ServiceDescriptor::new("engine", sh(&script));
        descriptor.start_timeout = Duration::from_secs(10);
        descriptor.stop_timeout = Duration::from_secs(5);
        descriptor.ready_marker = Some(ReadyMarker {
            log: log.clone(),
            pattern: Regex::new("(?i)engine started").unwrap(),
        });
        descriptor.log_paths = vec![log];

        let sup = Supervisor::new(descriptor, Platform::Posix)
            .unwrap()
            .with_state_dir(dir.path());
        sup.start().unwrap();
        sup.wait_to_start().unwrap();
        assert_eq!(sup.state(), LifecycleState::Running);
        assert!(!sup.is_stopped());

        sup.stop().unwrap();
        sup.wait_to_stop().unwrap();
        assert!(sup.is_stopped());
    }

    #[test]
    fn log_marker_that_never_appears_times_out() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("repository.log");
        fs::write(&log, "INFO still warming up\n").unwrap();
        let mut descriptor = ServiceDescriptor::new("repo", sh("exec sleep 30"));
        descriptor.start_timeout = Duration::from_millis(600);
        descriptor.stop_timeout = Duration::from_secs(5);
        descriptor.ready_marker = Some(ReadyMarker {
            log: log.clone(),
            pattern: Regex::new("(?i)repository (is )?ready").unwrap(),
        });

        let sup = Supervisor::new(descriptor, Platform::Posix)
            .unwrap()
            .with_state_dir(dir.path());
        sup.start().unwrap();
        let began = Instant::now();
        let err = sup.wait_to_start().unwrap_err();
        assert!(matches!(err, SupervisorError::StartupTimeout { .. }));
        assert!(began.elapsed() >= Duration::from_millis(500));
        assert!(began.elapsed() < Duration::from_secs(5));

        sup.stop().unwrap();
        sup.wait_to_stop().unwrap();
    }

    #[test]
    fn pid_file_readiness() {
        let dir = tempdir().unwrap();
        let pid_file = dir.path().join("service.pid");
        let script = format!("echo $$ > '{}'; exec sleep 30", pid_file.display());
        let mut descriptor = ServiceDescriptor::new("pidded", sh(&script));
        descriptor.pid_file = Some(pid_file.clone());
        descriptor.start_timeout = Duration::from_secs(10);
        descriptor.stop_timeout = Duration::from_secs(5);

        let sup = Supervisor::new(descriptor, Platform::Posix)
            .unwrap()
            .with_state_dir(dir.path());
        sup.start().unwrap();
        sup.wait_to_start().unwrap();

        let recorded: u32 = fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert_eq!(Some(recorded), sup.child_pid());
        assert!(common::is_process_alive(recorded));

        sup.stop().unwrap();
        sup.wait_to_stop().unwrap();
        assert_eq!(sup.child_pid(), None);
    }

    #[test]
    fn stop_command_is_preferred_over_signals() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("stopped");
        let mut descriptor = ServiceDescriptor::new("scripted", sh("exit 0"));
        descriptor.stop_command = Some(sh(&format!("touch '{}'", marker.display())));
        descriptor.stop_timeout = Duration::from_secs(5);

        let sup = Supervisor::new(descriptor, Platform::Posix)
            .unwrap()
            .with_state_dir(dir.path());
        sup.start().unwrap();
        sup.wait_to_start().unwrap();
        sup.stop().unwrap();
        sup.wait_to_stop().unwrap();
        assert!(marker.exists());
    }

    #[test]
    fn files_are_restored_even_when_stop_fails() {
        let dir = tempdir().unwrap();
        let conf = dir.path().join("broker.properties");
        fs::write(&conf, "port=61616\n").unwrap();

        let mut descriptor = ServiceDescriptor::new("broker", sh("exit 0"));
        descriptor.stop_command = Some(CommandSpec::new(
            dir.path().join("missing-stop-script").display().to_string(),
            Vec::<String>::new(),
        ));
        descriptor.backup_paths = vec![conf.clone()];

        let sup = Supervisor::new(descriptor, Platform::Posix)
            .unwrap()
            .with_state_dir(&dir.path().join("state"));
        let fixture = sup.setup().unwrap();
        fs::write(&conf, "port=1\n").unwrap();

        let err = fixture.teardown().unwrap_err();
        assert!(matches!(err, SupervisorError::ProcessControlFailure(_)));
        assert_eq!(fs::read_to_string(&conf).unwrap(), "port=61616\n");
        assert_eq!(sup.state(), LifecycleState::Failed);
    }

    #[test]
    fn failed_setup_restores_files() {
        let dir = tempdir().unwrap();
        let conf = dir.path().join("zoo.cfg");
        fs::write(&conf, "clientPort=2181\n").unwrap();

        let script = format!("echo 'clientPort=9' > '{}'; exit 3", conf.display());
        let mut descriptor = ServiceDescriptor::new("zk", sh(&script));
        descriptor.backup_paths = vec![conf.clone()];

        let sup = Supervisor::new(descriptor, Platform::Posix)
            .unwrap()
            .with_state_dir(dir.path());
        assert!(sup.setup().is_err());
        assert_eq!(fs::read_to_string(&conf).unwrap(), "clientPort=2181\n");
    }

    #[test]
    fn dropped_fixture_tears_down() {
        let dir = tempdir().unwrap();
        let pid_file = dir.path().join("dropped.pid");
        let script = format!("echo $$ > '{}'; exec sleep 30", pid_file.display());
        let mut descriptor = ServiceDescriptor::new("dropped", sh(&script));
        descriptor.pid_file = Some(pid_file);
        descriptor.start_timeout = Duration::from_secs(10);
        descriptor.stop_timeout = Duration::from_secs(5);

        let sup = Supervisor::new(descriptor, Platform::Posix)
            .unwrap()
            .with_state_dir(dir.path());
        let fixture = sup.setup().unwrap();
        assert!(!sup.is_stopped());
        drop(fixture);

        assert!(sup.is_stopped());
        assert_eq!(sup.state(), LifecycleState::Stopped);
        // The lock went with the fixture.
        sup.setup().unwrap().teardown().unwrap();
    }

    #[test]
    fn real_listener_is_started_and_stopped() {
        if !common::python3_available() {
            eprintln!("python3 not available; skipping");
            return;
        }
        let dir = tempdir().unwrap();
        let port = lifeguard::test_utils::free_port();
        let mut descriptor = ServiceDescriptor::new(
            "http",
            CommandSpec::new(
                "python3",
                [
                    "-m".to_string(),
                    "http.server".to_string(),
                    port.to_string(),
                    "--bind".to_string(),
                    "127.0.0.1".to_string(),
                ],
            ),
        );
        descriptor.required_ports = vec![port];
        descriptor.start_timeout = Duration::from_secs(20);
        descriptor.stop_timeout = Duration::from_secs(10);
        descriptor.start_working_directory = Some(dir.path().to_path_buf());

        let sup = Supervisor::new(descriptor, Platform::Posix)
            .unwrap()
            .with_state_dir(dir.path());
        let fixture = sup.setup().unwrap();
        assert!(probe::is_reachable("127.0.0.1", port));
        fixture.teardown().unwrap();
        assert!(!probe::is_reachable("127.0.0.1", port));
    }
}
