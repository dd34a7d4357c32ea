use std::fs;

use lifeguard::{
    backup::BackupSet,
    descriptor::ServiceDescriptor,
    error::SupervisorError,
    platform::{CommandSpec, Platform},
    supervisor::Supervisor,
};
use tempfile::tempdir;

#[test]
fn backup_then_restore_returns_files_to_their_original_content() {
    let temp = tempdir().unwrap();
    let home = temp.path().join("tomcat");
    fs::create_dir_all(home.join("conf/Catalina")).unwrap();
    fs::write(home.join("conf/server.xml"), "<Server port=\"8005\"/>").unwrap();
    fs::write(home.join("conf/Catalina/app.xml"), "<Context/>").unwrap();

    let mut descriptor =
        ServiceDescriptor::new("tomcat", CommandSpec::new("true", Vec::<String>::new()));
    descriptor.backup_paths = vec![home.join("conf/server.xml"), home.join("conf/Catalina")];
    let supervisor = Supervisor::new(descriptor, Platform::current())
        .unwrap()
        .with_state_dir(&temp.path().join("state"));

    supervisor.backup_service_files().unwrap();
    assert!(supervisor.backup_root().join("manifest.json").exists());

    fs::write(home.join("conf/server.xml"), "<Server port=\"9005\"/>").unwrap();
    fs::remove_file(home.join("conf/Catalina/app.xml")).unwrap();
    fs::write(home.join("conf/Catalina/new.xml"), "<Context/>").unwrap();

    supervisor.restore_service_files().unwrap();
    assert_eq!(
        fs::read_to_string(home.join("conf/server.xml")).unwrap(),
        "<Server port=\"8005\"/>"
    );
    assert!(home.join("conf/Catalina/app.xml").exists());
    assert!(!home.join("conf/Catalina/new.xml").exists());
    assert!(!supervisor.backup_root().exists());
}

#[test]
fn restore_picks_up_a_snapshot_from_another_supervisor() {
    let temp = tempdir().unwrap();
    let state = temp.path().join("state");
    let cfg = temp.path().join("zoo.cfg");
    fs::write(&cfg, "clientPort=2181\n").unwrap();

    let build = || {
        let mut descriptor =
            ServiceDescriptor::new("zk", CommandSpec::new("true", Vec::<String>::new()));
        descriptor.backup_paths = vec![cfg.clone()];
        Supervisor::new(descriptor, Platform::current())
            .unwrap()
            .with_state_dir(&state)
    };

    build().backup_service_files().unwrap();
    fs::write(&cfg, "clientPort=3181\n").unwrap();

    build().restore_service_files().unwrap();
    assert_eq!(fs::read_to_string(&cfg).unwrap(), "clientPort=2181\n");
}

#[test]
fn stale_snapshot_is_restored_before_a_new_backup() {
    let temp = tempdir().unwrap();
    let cfg = temp.path().join("activemq.xml");
    fs::write(&cfg, "pristine").unwrap();

    let mut descriptor =
        ServiceDescriptor::new("mq", CommandSpec::new("true", Vec::<String>::new()));
    descriptor.backup_paths = vec![cfg.clone()];
    let supervisor = Supervisor::new(descriptor, Platform::current())
        .unwrap()
        .with_state_dir(temp.path());

    supervisor.backup_service_files().unwrap();
    fs::write(&cfg, "modified by a crashed run").unwrap();

    // A second backup must not capture the modified file as the baseline.
    supervisor.backup_service_files().unwrap();
    assert_eq!(fs::read_to_string(&cfg).unwrap(), "pristine");
    let set = BackupSet::load(supervisor.backup_root()).unwrap().unwrap();
    assert_eq!(
        fs::read_to_string(&set.entries[0].saved).unwrap(),
        "pristine"
    );
}

#[test]
fn nothing_to_back_up_is_not_an_error() {
    let temp = tempdir().unwrap();
    let supervisor = Supervisor::new(
        ServiceDescriptor::new("plain", CommandSpec::new("true", Vec::<String>::new())),
        Platform::current(),
    )
    .unwrap()
    .with_state_dir(temp.path());
    supervisor.backup_service_files().unwrap();
    supervisor.restore_service_files().unwrap();
    assert!(supervisor.service_files_to_backup().is_empty());
}

#[test]
fn unreadable_manifest_surfaces_as_restore_failure() {
    let temp = tempdir().unwrap();
    let root = temp.path().join("backups/broken");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("manifest.json"), "{ not json").unwrap();
    assert!(matches!(
        BackupSet::load(&root),
        Err(SupervisorError::RestoreFailed { .. })
    ));
}
