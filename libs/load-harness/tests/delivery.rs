use std::sync::Arc;
use std::time::Duration;

use broker_api::PublishRequest;
use broker_client::{ChannelExit, PublishClient};
use load_harness::{
    Assignment, LoadPlan, MetricsAggregator, Profile, RunMode, SubscriberState, SubscriberWorker,
};
use mock_broker::MockBroker;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn plan_for(broker: &MockBroker) -> LoadPlan {
    let mut plan = LoadPlan::for_profile(Profile::Perf);
    plan.broker_url = broker.http_url();
    plan.ws_url = broker.ws_url();
    plan.connect_timeout = Duration::from_secs(2);
    plan.dwell = Some(Duration::from_secs(10));
    plan
}

async fn wait_for_clients(broker: &MockBroker, n: usize) {
    for _ in 0..200 {
        if broker.state().clients().await.len() == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("broker never saw {n} subscribers");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn wildcard_and_exact_subscriptions() {
    let broker = MockBroker::start().await.unwrap();
    let mut plan = plan_for(&broker);
    plan.subscribers = 3;
    plan.assignment =
        Assignment::Explicit(vec!["*".into(), "orders".into(), "shipping".into()]);

    let metrics = Arc::new(MetricsAggregator::new());
    let stop = CancellationToken::new();
    let handles: Vec<_> = (0..3)
        .map(|id| {
            let worker = SubscriberWorker::new(id, &plan, metrics.clone());
            tokio::spawn(worker.run(stop.clone()))
        })
        .collect();
    wait_for_clients(&broker, 3).await;

    let client = PublishClient::new(&broker.http_url(), Duration::from_secs(2)).unwrap();
    client
        .publish(&PublishRequest {
            topic: "orders".into(),
            message_id: "m1".into(),
            producer: "p1".into(),
            message: json!({"timestamp": broker_api::unix_now_secs()}),
        })
        .await
        .unwrap();

    // Два подтверждения: wildcard и orders.
    for _ in 0..200 {
        if broker.state().consumptions().await.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    stop.cancel();

    let mut outcomes = Vec::new();
    for h in handles {
        outcomes.push(h.await.unwrap());
    }
    outcomes.sort_by_key(|o| o.id);

    assert_eq!(
        outcomes.iter().map(|o| o.received).collect::<Vec<_>>(),
        vec![1, 1, 0]
    );
    for o in &outcomes {
        assert_eq!(o.exit, Some(ChannelExit::Cancelled));
        assert_eq!(
            o.trail,
            vec![
                SubscriberState::Disconnected,
                SubscriberState::Connecting,
                SubscriberState::Subscribed,
                SubscriberState::Draining,
                SubscriberState::Disconnected,
            ]
        );
    }

    let snap = metrics.snapshot();
    assert_eq!(snap.connected, 3);
    assert_eq!(snap.subscribed, 3);
    assert_eq!(snap.received, 2);
    assert_eq!(snap.latency_samples.len(), 2);
    assert_eq!(snap.per_subscriber.get(&2), None);

    let mut consumers: Vec<_> = broker
        .state()
        .consumptions()
        .await
        .into_iter()
        .map(|c| (c.consumer, c.message_id))
        .collect();
    consumers.sort();
    assert_eq!(
        consumers,
        vec![
            ("subscriber-0".to_string(), "m1".to_string()),
            ("subscriber-1".to_string(), "m1".to_string()),
        ]
    );

    wait_for_clients(&broker, 0).await;
    broker.stop().await;
}

#[tokio::test]
async fn window_elapses_without_traffic() {
    let broker = MockBroker::start().await.unwrap();
    let mut plan = plan_for(&broker);
    plan.mode = RunMode::Count(0);
    plan.dwell = Some(Duration::from_millis(200));

    let metrics = Arc::new(MetricsAggregator::new());
    let out = SubscriberWorker::new(0, &plan, metrics.clone())
        .run(CancellationToken::new())
        .await;

    assert_eq!(out.exit, Some(ChannelExit::WindowElapsed));
    assert_eq!(out.received, 0);
    assert_eq!(metrics.snapshot().errors, 0);
    wait_for_clients(&broker, 0).await;
    broker.stop().await;
}
