mod common;

use std::fs;
use std::time::{Duration, Instant};

use std::sync::Arc;
use std::thread;

use bento_cluster::hosts::{HostsFileSynchronizer, PrivilegedHostsWriter, WriteOutcome};
use bento_cluster::{
    CancelToken, ErrorKind, InstanceState, LaunchOptions, LifecycleEvent, PollPolicy,
    StartOutcome, StopOutcome, SyncOptions,
};
use common::{container, harness, harness_with_hosts, unmanaged, FakeSupervisor, HelperOnly};

fn created_stopped(h: &common::Harness, name: &str) {
    let launch = LaunchOptions {
        start: false,
        ..LaunchOptions::default()
    };
    h.system
        .create(name, Some("cdh5.0.3"), &launch, &CancelToken::new())
        .unwrap();
}

#[test]
fn start_succeeds_once_services_come_up() {
    let h = harness(FakeSupervisor::never());
    created_stopped(&h, "t1");
    let instance = h.system.instance("t1").unwrap();
    assert_eq!(instance.state().unwrap(), InstanceState::Stopped);

    h.supervisor.ready_after(Duration::from_millis(300));
    let policy = PollPolicy::from_millis(100, 500).unwrap();
    let begun = Instant::now();
    let outcome = instance
        .start(&SyncOptions::default(), &policy, &CancelToken::new())
        .unwrap();

    assert_eq!(outcome, StartOutcome::Started);
    assert!(begun.elapsed() >= Duration::from_millis(300));
    assert_eq!(instance.state().unwrap(), InstanceState::Ready);
    assert_eq!(h.runtime.count("start"), 1);

    let address = instance.ip_address().unwrap();
    let hosts = fs::read_to_string(h.hosts_path()).unwrap();
    assert_eq!(hosts, format!("{} t1 # bento-cluster\n", address));
    assert!(h.config_root().join("t1/hadoop/core-site.xml").is_file());
    assert!(h.config_root().join("t1/bento-env.sh").is_file());
}

#[test]
fn start_timeout_leaves_container_running() {
    let h = harness(FakeSupervisor::never());
    created_stopped(&h, "t1");
    let instance = h.system.instance("t1").unwrap();

    let policy = PollPolicy::from_millis(10, 50).unwrap();
    let begun = Instant::now();
    let err = instance
        .start(&SyncOptions::default(), &policy, &CancelToken::new())
        .unwrap_err();
    let elapsed = begun.elapsed();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(elapsed >= Duration::from_millis(50), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(250), "{:?}", elapsed);

    assert!(h.runtime.container("t1").unwrap().running);
    assert_eq!(h.runtime.count("stop"), 0);
    assert_eq!(instance.state().unwrap(), InstanceState::Starting);
    // No sync before readiness.
    assert!(!h.hosts_path().exists());
}

#[test]
fn start_on_ready_instance_does_nothing() {
    let h = harness(FakeSupervisor::always());
    h.runtime.insert(container("t1", true));
    let instance = h.system.instance("t1").unwrap();

    let outcome = instance
        .start(&SyncOptions::default(), &PollPolicy::default(), &CancelToken::new())
        .unwrap();

    assert_eq!(outcome, StartOutcome::AlreadyReady);
    assert_eq!(h.runtime.count("start"), 0);
    assert_eq!(h.supervisor.queries(), 1);
    assert!(!h.hosts_path().exists());
    assert_eq!(
        h.sink.events(),
        vec![LifecycleEvent::AlreadyRunning {
            name: "t1".to_string()
        }]
    );
}

#[test]
fn start_resumes_waiting_when_container_already_up() {
    let h = harness(FakeSupervisor::never());
    h.runtime.insert(container("t1", true));
    h.supervisor.ready_after(Duration::from_millis(30));
    let instance = h.system.instance("t1").unwrap();

    let policy = PollPolicy::from_millis(10, 500).unwrap();
    let outcome = instance
        .start(&SyncOptions::none(), &policy, &CancelToken::new())
        .unwrap();

    assert_eq!(outcome, StartOutcome::Resumed);
    assert_eq!(h.runtime.count("start"), 0);
}

#[test]
fn cancelled_token_aborts_readiness_wait() {
    let h = harness(FakeSupervisor::never());
    created_stopped(&h, "t1");
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = h
        .system
        .instance("t1")
        .unwrap()
        .start(&SyncOptions::none(), &PollPolicy::default(), &cancel)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(h.runtime.container("t1").unwrap().running);
}

#[test]
fn stop_waits_until_container_halts() {
    let h = harness(FakeSupervisor::always());
    h.runtime.insert(container("t1", true));
    let instance = h.system.instance("t1").unwrap();

    let outcome = instance
        .stop(&PollPolicy::from_millis(10, 200).unwrap(), &CancelToken::new())
        .unwrap();

    assert_eq!(outcome, StopOutcome::Stopped);
    assert!(!instance.is_container_running().unwrap());
    assert_eq!(instance.state().unwrap(), InstanceState::Stopped);
    let events = h.sink.events();
    assert_eq!(
        events,
        vec![
            LifecycleEvent::Stopping {
                name: "t1".to_string()
            },
            LifecycleEvent::Stopped {
                name: "t1".to_string()
            },
        ]
    );
}

#[test]
fn stop_timeout_leaves_state_as_reported() {
    let h = harness(FakeSupervisor::always());
    h.runtime.insert(container("t1", true));
    h.runtime.ignore_stop();

    let err = h
        .system
        .instance("t1")
        .unwrap()
        .stop(&PollPolicy::from_millis(10, 50).unwrap(), &CancelToken::new())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(h.runtime.container("t1").unwrap().running);
}

#[test]
fn stop_on_stopped_container_is_quiet() {
    let h = harness(FakeSupervisor::always());
    h.runtime.insert(container("t1", false));

    let outcome = h
        .system
        .instance("t1")
        .unwrap()
        .stop(&PollPolicy::default(), &CancelToken::new())
        .unwrap();

    assert_eq!(outcome, StopOutcome::AlreadyStopped);
    assert_eq!(h.runtime.count("stop"), 0);
}

#[test]
fn update_hosts_replaces_previous_address() {
    let h = harness(FakeSupervisor::always());
    fs::write(h.hosts_path(), "127.0.0.1 localhost\n").unwrap();
    h.runtime.insert(container("bento", true));
    let instance = h.system.instance("bento").unwrap();

    assert_eq!(instance.update_hosts(None).unwrap(), WriteOutcome::Written);
    assert_eq!(instance.update_hosts(None).unwrap(), WriteOutcome::Unchanged);

    let mut moved = container("bento", true);
    moved.ip_address = "172.17.0.99".to_string();
    h.runtime.insert(moved);
    instance.update_hosts(None).unwrap();

    let hosts = fs::read_to_string(h.hosts_path()).unwrap();
    assert_eq!(
        hosts,
        "127.0.0.1 localhost\n172.17.0.99 bento # bento-cluster\n"
    );
}

#[test]
fn update_hosts_needs_an_address() {
    let h = harness(FakeSupervisor::always());
    h.runtime.insert(container("t1", false));
    let err = h
        .system
        .instance("t1")
        .unwrap()
        .update_hosts(None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime);
}

#[test]
fn config_written_to_explicit_dir() {
    let h = harness(FakeSupervisor::always());
    h.runtime.insert(container("t1", true));
    let target = h.dir.path().join("elsewhere");

    let dir = h
        .system
        .instance("t1")
        .unwrap()
        .write_hadoop_config(Some(target.clone()))
        .unwrap();

    assert_eq!(dir, target);
    let core = fs::read_to_string(target.join("hadoop/core-site.xml")).unwrap();
    assert!(core.contains("hdfs://t1:8020"));
}

#[test]
fn missing_bento_reports_absent() {
    let h = harness(FakeSupervisor::always());
    let instance = h.system.instance("ghost").unwrap();
    assert_eq!(instance.state().unwrap(), InstanceState::Absent);
    assert!(instance.details().unwrap_err().is_not_found());
    assert!(instance.get_log().unwrap_err().is_not_found());
}

#[test]
fn logs_come_from_runtime() {
    let h = harness(FakeSupervisor::always());
    h.runtime.insert(container("t1", true));
    let log = h.system.instance("t1").unwrap().get_log().unwrap();
    assert_eq!(log, b"supervisord started in t1\n");
}

#[test]
fn unmanaged_container_is_not_a_bento() {
    let h = harness(FakeSupervisor::always());
    h.runtime.insert(unmanaged("postgres", "postgres:16"));
    let instance = h.system.instance("postgres").unwrap();

    assert_eq!(instance.state().unwrap(), InstanceState::Absent);
    let err = instance
        .start(&SyncOptions::none(), &PollPolicy::default(), &CancelToken::new())
        .unwrap_err();
    assert!(err.is_not_found());
    let err = instance
        .stop(&PollPolicy::default(), &CancelToken::new())
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(instance.get_log().unwrap_err().is_not_found());

    assert!(h.runtime.calls().is_empty());
    assert!(h.runtime.container("postgres").unwrap().running);
}

#[test]
fn readiness_checks_are_bounded_by_remaining_budget() {
    let h = harness(FakeSupervisor::never());
    created_stopped(&h, "t1");
    let before = h.runtime.inspect_limits().len();

    let policy = PollPolicy::from_millis(10, 50).unwrap();
    let err = h
        .system
        .instance("t1")
        .unwrap()
        .start(&SyncOptions::none(), &policy, &CancelToken::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    let supervisor_limits = h.supervisor.limits();
    assert!(!supervisor_limits.is_empty());
    for limit in supervisor_limits {
        let limit = limit.expect("readiness query without a limit");
        assert!(limit >= policy.interval(), "{:?}", limit);
        assert!(limit <= policy.timeout(), "{:?}", limit);
    }

    let polled = &h.runtime.inspect_limits()[before..];
    assert!(polled.iter().skip(1).all(|l| l.is_some_and(|d| d <= policy.timeout())));
}

#[test]
fn state_reports_stopping_while_stop_waits() {
    let h = harness(FakeSupervisor::always());
    h.runtime.insert(container("t1", true));
    h.runtime.ignore_stop();
    let instance = h.system.instance("t1").unwrap();

    let stopper = instance.clone();
    let handle = thread::spawn(move || {
        stopper.stop(&PollPolicy::from_millis(10, 400).unwrap(), &CancelToken::new())
    });
    thread::sleep(Duration::from_millis(100));
    assert_eq!(instance.state().unwrap(), InstanceState::Stopping);

    let err = handle.join().unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(instance.state().unwrap(), InstanceState::Ready);
}

#[test]
fn write_hadoop_config_needs_an_address() {
    let h = harness(FakeSupervisor::always());
    h.runtime.insert(container("t1", false));

    let err = h
        .system
        .instance("t1")
        .unwrap()
        .write_hadoop_config(None)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert!(!h.config_root().exists());
    assert!(h.sink.events().is_empty());
}

#[test]
fn update_hosts_without_helper_is_skipped() {
    let writer = HelperOnly(PrivilegedHostsWriter::new("bento-update-hosts-missing"));
    let h = harness_with_hosts(
        FakeSupervisor::always(),
        HostsFileSynchronizer::new(Arc::new(writer)),
    );
    h.runtime.insert(container("t1", true));

    let outcome = h.system.instance("t1").unwrap().update_hosts(None).unwrap();

    assert_eq!(outcome, WriteOutcome::Skipped);
    assert!(!h.hosts_path().exists());
    assert_eq!(
        h.sink.events(),
        vec![LifecycleEvent::HostsSkipped {
            hostname: "t1".to_string(),
            address: "172.17.0.40".to_string(),
        }]
    );
}

#[cfg(unix)]
#[test]
fn update_hosts_hands_content_to_helper() {
    let helper_dir = tempfile::tempdir().unwrap();
    let helper = helper_dir.path().join("update-hosts");
    fs::write(
        &helper,
        format!(
            "#!/bin/sh\nprintf '%s' \"$1\" > '{}'\ncat > '{}'\n",
            helper_dir.path().join("argv").display(),
            helper_dir.path().join("stdin").display(),
        ),
    )
    .unwrap();
    let writer = PrivilegedHostsWriter::new(helper.to_string_lossy()).with_launcher(["sh"]);
    let h = harness_with_hosts(
        FakeSupervisor::always(),
        HostsFileSynchronizer::new(Arc::new(HelperOnly(writer))),
    );
    fs::write(h.hosts_path(), "127.0.0.1 localhost\n").unwrap();
    h.runtime.insert(container("t1", true));

    let outcome = h.system.instance("t1").unwrap().update_hosts(None).unwrap();

    assert_eq!(outcome, WriteOutcome::Delegated(helper.clone()));
    assert_eq!(
        fs::read_to_string(helper_dir.path().join("argv")).unwrap(),
        h.hosts_path().display().to_string()
    );
    assert_eq!(
        fs::read_to_string(helper_dir.path().join("stdin")).unwrap(),
        "127.0.0.1 localhost\n172.17.0.40 t1 # bento-cluster\n"
    );
    // The helper owns the write; the file itself is untouched here.
    assert_eq!(fs::read_to_string(h.hosts_path()).unwrap(), "127.0.0.1 localhost\n");
    assert!(matches!(
        h.sink.events().as_slice(),
        [LifecycleEvent::HostsUpdated { hostname, .. }] if hostname == "t1"
    ));
}

