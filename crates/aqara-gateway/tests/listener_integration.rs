//! Report listener tests over a loopback socket standing in for the
//! multicast group.

use std::net::{Ipv4Addr, UdpSocket};
use std::sync::Arc;

use aqara_core::FieldValue;
use aqara_gateway::infrastructure::network::gateway::Gateway;
use aqara_gateway::infrastructure::network::listener::{GatewayListener, ListenResult};
use tokio::sync::mpsc;

fn report(sid: &str, status: &str) -> Vec<u8> {
    format!(r#"{{"cmd":"report","model":"plug","sid":"{sid}","data":"{{\"status\":\"{status}\"}}"}}"#)
        .into_bytes()
}

#[tokio::test]
async fn test_every_report_is_delivered_in_order_through_capacity_one_channel() {
    // Arrange
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let target = socket.local_addr().unwrap();
    let gw = Arc::new(Gateway::new(Ipv4Addr::LOCALHOST, "gw", "", "127.0.0.1"));
    let listener = GatewayListener::new(vec![Arc::clone(&gw)]).unwrap();

    let (tx, mut rx) = mpsc::channel::<ListenResult>(1);
    let worker = std::thread::spawn(move || listener.run(&socket, &tx));

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    for i in 0..5 {
        sender.send_to(&report(&format!("plug{i}"), "on"), target).unwrap();
    }
    sender.send_to(b"garbage", target).unwrap();
    sender.send_to(&report("plug5", "off"), target).unwrap();

    // Act
    let mut received = Vec::new();
    for _ in 0..6 {
        received.push(rx.recv().await.expect("listener delivers"));
    }

    // Assert
    let sids: Vec<_> = received.iter().map(|r| r.report.sid.clone()).collect();
    assert_eq!(sids, vec!["plug0", "plug1", "plug2", "plug3", "plug4", "plug5"]);
    assert!(received.iter().all(|r| Arc::ptr_eq(&r.gateway, &gw)));
    assert_eq!(received[5].report.get("status"), Some(&FieldValue::from("off")));

    // Closing the consumer stops the listener at its next delivery.
    drop(rx);
    sender.send_to(&report("plug6", "on"), target).unwrap();
    let result = tokio::task::spawn_blocking(move || worker.join().unwrap()).await.unwrap();
    assert!(result.is_ok());
}

#[test]
fn test_std_sync_channel_works_as_sink() {
    // Arrange
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let target = socket.local_addr().unwrap();
    let gw = Arc::new(Gateway::new(Ipv4Addr::LOCALHOST, "gw", "", "127.0.0.1"));
    let listener = GatewayListener::new(vec![gw]).unwrap();
    let (tx, rx) = std::sync::mpsc::sync_channel::<ListenResult>(1);
    let worker = std::thread::spawn(move || listener.run(&socket, &tx));

    // Act
    UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .send_to(&report("plug0", "on"), target)
        .unwrap();
    let first = rx.recv().unwrap();
    drop(rx);
    UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .send_to(&report("plug1", "on"), target)
        .unwrap();

    // Assert
    assert_eq!(first.report.model, "plug");
    assert!(worker.join().unwrap().is_ok());
}

#[test]
fn test_slow_consumer_back_pressures_without_dropping() {
    // Arrange
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let target = socket.local_addr().unwrap();
    let gw = Arc::new(Gateway::new(Ipv4Addr::LOCALHOST, "gw", "", "127.0.0.1"));
    let listener = GatewayListener::new(vec![gw]).unwrap();
    let (tx, mut rx) = mpsc::channel::<ListenResult>(1);
    let worker = std::thread::spawn(move || listener.run(&socket, &tx));

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    for i in 0..3 {
        sender.send_to(&report(&format!("plug{i}"), "on"), target).unwrap();
    }

    // Act: consume slowly, long after all three datagrams arrived
    std::thread::sleep(std::time::Duration::from_millis(100));
    let sids: Vec<_> = (0..3)
        .map(|_| tokio_test::block_on(rx.recv()).unwrap().report.sid)
        .collect();

    // Assert
    assert_eq!(sids, vec!["plug0", "plug1", "plug2"]);

    drop(rx);
    sender.send_to(&report("plug3", "on"), target).unwrap();
    assert!(worker.join().unwrap().is_ok());
}

#[test]
fn test_spawn_listener_rejects_mixed_interfaces_before_binding() {
    use aqara_gateway::infrastructure::network::listener::{spawn_listener, ListenerError};

    let gateways = vec![
        Arc::new(Gateway::new(Ipv4Addr::new(192, 168, 1, 20), "a", "", "eth0")),
        Arc::new(Gateway::new(Ipv4Addr::new(10, 0, 0, 5), "b", "", "wlan0")),
    ];

    let result = spawn_listener(gateways);

    assert!(matches!(result, Err(ListenerError::MixedInterfaces { .. })));
}
