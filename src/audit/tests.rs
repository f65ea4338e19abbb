use std::time::Duration;

use super::*;
use crate::bus::{ConnectOptions, ConnectionManager};
use crate::protocol::{Packet, Publish, QoS};
use crate::transport::stub::StubConnector;

fn probe(name: &str) -> Probe {
    *PROBES.iter().find(|p| p.name == name).unwrap()
}

#[test]
fn test_probe_catalogue_names_are_unique() {
    let mut names: Vec<_> = PROBES.iter().map(|p| p.name).collect();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), PROBES.len());
}

#[test]
fn test_judge_accepts_what_the_consumer_accepts() {
    let dashboard = probe("dashboard_data");
    assert_eq!(
        dashboard.judge(r#"{"weather":{"location":"Jakarta","temperature":31},"integrations":{"GMAIL":true}}"#),
        Verdict::Pass
    );
    assert!(matches!(dashboard.judge("not json"), Verdict::Fail(_)));
}

#[test]
fn test_judge_reports_agent_errors() {
    let stats = probe("memory_stats");
    assert_eq!(
        stats.judge(r#"{"error":"memory store offline"}"#),
        Verdict::Fail("memory store offline".to_string())
    );
}

#[test]
fn test_verdicts_serialize_as_report_strings() {
    let mut report = BTreeMap::new();
    report.insert("a", Verdict::Pass);
    report.insert("b", Verdict::Fail("bad shape".to_string()));
    report.insert("c", Verdict::Timeout);

    assert_eq!(
        serde_json::to_string(&report).unwrap(),
        r#"{"a":"PASS","b":"FAIL (bad shape)","c":"TIMEOUT"}"#
    );
}

#[tokio::test]
async fn test_run_collects_answers_and_times_out_the_rest() {
    let (connector, mut brokers) = StubConnector::new();
    let mut manager = ConnectionManager::new(connector);
    let handle = manager
        .initialize(ConnectOptions::new("ws://broker.test:8884/mqtt"))
        .unwrap();

    let mut broker = brokers.recv().await.unwrap();
    broker.accept().await;
    assert!(handle.wait_connected(Duration::from_secs(5)).await);

    let probes = [probe("dashboard_data"), probe("history")];
    let audit = {
        let handle = handle.clone();
        tokio::spawn(async move { run(&handle, &probes, Duration::from_millis(500)).await })
    };

    let mut requested = Vec::new();
    for _ in 0..2 {
        match broker.expect().await {
            Packet::Publish(publish) => requested.push(publish.topic),
            other => panic!("expected PUBLISH, got {other:?}"),
        }
    }
    assert_eq!(requested, vec!["dashboard/request", "history/2"]);

    broker.send(Packet::Publish(Publish::new(
        topics::DASHBOARD_RESPONSE,
        r#"{"weather":null,"integrations":{}}"#,
        QoS::AtLeastOnce,
        1,
    )));

    let report = audit.await.unwrap();
    assert_eq!(report["dashboard_data"], Verdict::Pass);
    assert_eq!(report["history"], Verdict::Timeout);
    assert_eq!(
        dispatcher::lock(handle.dispatcher()).observer_count(topics::DASHBOARD_RESPONSE),
        0
    );
    manager.teardown().await;
    drop(broker);
}
