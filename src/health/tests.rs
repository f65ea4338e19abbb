use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use super::*;

/// Serves `response` to the first connection and returns the endpoint url.
async fn serve_once(response: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{addr}/health")
}

fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

#[test]
fn test_format_uptime() {
    assert_eq!(format_uptime(0), "0h 0m");
    assert_eq!(format_uptime(3725), "1h 2m");
    assert_eq!(format_uptime(90_000), "25h 0m");
}

#[tokio::test]
async fn test_healthy_endpoint_reads_online() {
    let url = serve_once(http_response(
        "200 OK",
        r#"{"status":"ok","uptime_sec":3725,"mqtt_connected":true,"agent_running":false,"timestamp":"2024-01-01T00:00:00Z"}"#,
    ))
    .await;
    let probe = HealthProbe::new(url, Duration::from_secs(2)).unwrap();

    match probe.check().await {
        SystemHealth::Online(report) => {
            assert!(report.is_ok());
            assert!(report.mqtt_connected);
            assert!(!report.agent_running);
            assert_eq!(report.uptime(), "1h 2m");
        }
        SystemHealth::Offline => panic!("expected online"),
    }
}

#[tokio::test]
async fn test_degraded_report_is_still_online() {
    let url = serve_once(http_response(
        "200 OK",
        r#"{"status":"degraded","uptime_sec":10,"mqtt_connected":false,"agent_running":true}"#,
    ))
    .await;
    let probe = HealthProbe::new(url, Duration::from_secs(2)).unwrap();

    let SystemHealth::Online(report) = probe.check().await else {
        panic!("expected online");
    };
    assert!(!report.is_ok());
}

#[tokio::test]
async fn test_error_status_reads_offline() {
    let url = serve_once(http_response("503 Service Unavailable", "{}")).await;
    let probe = HealthProbe::new(url, Duration::from_secs(2)).unwrap();

    assert!(matches!(
        probe.fetch().await,
        Err(crate::utils::error::HealthError::Status(status)) if status.as_u16() == 503
    ));
}

#[tokio::test]
async fn test_garbage_body_reads_offline() {
    let url = serve_once(http_response("200 OK", "not json")).await;
    let probe = HealthProbe::new(url, Duration::from_secs(2)).unwrap();

    assert_eq!(probe.check().await, SystemHealth::Offline);
}

#[tokio::test]
async fn test_unreachable_endpoint_reads_offline() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let probe = HealthProbe::new(format!("http://{addr}/health"), Duration::from_millis(500)).unwrap();
    assert_eq!(probe.check().await, SystemHealth::Offline);
}

#[tokio::test]
async fn test_poller_publishes_result() {
    let url = serve_once(http_response(
        "200 OK",
        r#"{"status":"ok","uptime_sec":1,"mqtt_connected":true,"agent_running":true}"#,
    ))
    .await;
    let probe = HealthProbe::new(url, Duration::from_secs(2)).unwrap();

    let (mut rx, task) = spawn_health_poller(probe, Duration::from_secs(60));
    assert_eq!(*rx.borrow(), SystemHealth::Offline);

    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(rx.borrow().is_online());
    task.abort();
}

#[tokio::test]
async fn test_poller_survives_zero_interval() {
    let url = serve_once(http_response(
        "200 OK",
        r#"{"status":"ok","uptime_sec":1,"mqtt_connected":true,"agent_running":true}"#,
    ))
    .await;
    let probe = HealthProbe::new(url, Duration::from_secs(2)).unwrap();

    let (mut rx, task) = spawn_health_poller(probe, Duration::ZERO);
    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(rx.borrow().is_online());
    assert!(!task.is_finished());
    task.abort();
}
