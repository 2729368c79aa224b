use assert_cmd::Command;
use predicates::prelude::*;
use std::{fs, os::unix::fs::PermissionsExt, path::Path, time::Duration};
use wanrelay::{
    network::{self, IpcEndpoint},
    start_ipc_server, Dhcpv4Lease, Event, RelayConfig,
};

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

async fn wait_for_file(path: &Path) -> String {
    for _ in 0..50 {
        if let Ok(contents) = fs::read_to_string(path) {
            if !contents.is_empty() {
                return contents;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("{} was never written", path.display());
}

#[tokio::test]
async fn test_dhcpv4_lease_runs_action_script() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.txt");
    let script = dir.path().join("lease.sh");
    write_script(
        &script,
        &format!(
            "#!/bin/sh\necho \"$1 interface=$interface ip=$ip mask=$mask router=$router\" > {}\n",
            out.display()
        ),
    );

    let mut config = RelayConfig::new(Some(script));
    config.listen_addr = IpcEndpoint::from_path(dir.path().join("wan_manager.ipc"));
    let task = start_ipc_server(&config).unwrap();

    let record = Event::DhcpV4(Dhcpv4Lease {
        interface: "erouter0".to_string(),
        ip: "10.0.0.5".to_string(),
        mask: "255.255.255.0".to_string(),
        gateway: "10.0.0.1".to_string(),
        ..Default::default()
    })
    .encode();

    // A truncated record first; the loop must drop it and keep going.
    network::push_once(&config.listen_addr, &record[..record.len() - 1])
        .await
        .unwrap();
    tokio_test::assert_ok!(network::push_once(&config.listen_addr, &record).await);

    let recorded = wait_for_file(&out).await;
    assert_eq!(
        recorded.trim_end(),
        "bound interface=erouter0 ip=10.0.0.5 mask=255.255.255.0 router=10.0.0.1"
    );
    assert!(!task.is_finished());
    task.abort();
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let mut config = RelayConfig::new(None);
    config.listen_addr = IpcEndpoint::from_path("/nonexistent-dir/wan_manager.ipc");

    tokio_test::assert_err!(start_ipc_server(&config));
}

#[cfg(feature = "health-check")]
#[tokio::test]
async fn test_health_check_renew_marks_interface_down() {
    use std::sync::Arc;
    use wanrelay::{
        dhcp_client::ProcessDhcpClients,
        ihc::HealthCheckHandler,
        script::ActionExecutor,
        store::{InterfaceStatus, MemoryEventStore, MemoryInterfaceStore},
        Dispatcher, IhcMessage, IhcMessageType,
    };

    let dir = tempfile::tempdir().unwrap();
    let endpoint = IpcEndpoint::from_path(dir.path().join("wan_manager.ipc"));
    let interfaces = Arc::new(MemoryInterfaceStore::new(["erouter0"]));

    let socket = network::bind_pull_socket(&endpoint, 64 * 1024).unwrap();
    let task = Dispatcher::new(socket, ActionExecutor::new(None, Duration::from_secs(1)))
        .with_health_check(HealthCheckHandler::new(
            interfaces.clone(),
            Arc::new(MemoryEventStore::new()),
            Arc::new(ProcessDhcpClients::new("no-such-dhcpc", "no-such-dhcp6c")),
        ))
        .spawn();

    let record =
        Event::HealthCheck(IhcMessage::new(IhcMessageType::EchoRenewIpv4, "erouter0")).encode();
    network::push_once(&endpoint, &record).await.unwrap();

    let mut status = None;
    for _ in 0..50 {
        status = interfaces.status("erouter0");
        if status == Some(InterfaceStatus::ConnectionDown) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(status, Some(InterfaceStatus::ConnectionDown));
    task.abort();
}

#[tokio::test]
async fn test_detached_relay_keeps_serving() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.txt");
    let pid_file = dir.path().join("relay.pid");
    let script = dir.path().join("lease.sh");
    // The script's parent is the detached relay itself.
    write_script(
        &script,
        &format!(
            "#!/bin/sh\necho $PPID > {}\necho \"$1 $interface\" > {}\n",
            pid_file.display(),
            out.display()
        ),
    );
    let endpoint = IpcEndpoint::from_path(dir.path().join("w.ipc"));

    let started = std::time::Instant::now();
    Command::new(assert_cmd::cargo::cargo_bin!("wanrelay"))
        .env("WANRELAY_LISTEN_ADDR", endpoint.to_string())
        .arg("-d")
        .arg("-s")
        .arg(&script)
        .timeout(Duration::from_secs(5))
        .assert()
        .success();
    assert!(started.elapsed() < Duration::from_secs(5));

    for _ in 0..50 {
        if endpoint.path().exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let record = Event::DhcpV4(Dhcpv4Lease {
        interface: "erouter0".to_string(),
        ..Default::default()
    })
    .encode();
    network::push_once(&endpoint, &record).await.unwrap();

    assert_eq!(wait_for_file(&out).await.trim_end(), "bound erouter0");

    let pid: libc::pid_t = wait_for_file(&pid_file).await.trim().parse().unwrap();
    // SAFETY: pid was reported by the relay's own child script.
    assert_eq!(unsafe { libc::kill(pid, libc::SIGTERM) }, 0);
}

#[test]
fn test_unknown_flag_prints_usage_and_fails() {
    Command::new(assert_cmd::cargo::cargo_bin!("wanrelay"))
        .arg("-x")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_script_flag_requires_a_path() {
    Command::new(assert_cmd::cargo::cargo_bin!("wanrelay"))
        .arg("-s")
        .assert()
        .failure();
}
