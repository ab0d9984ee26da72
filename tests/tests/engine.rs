mod utils;
#[allow(unused)]
use utils::*;

#[cfg(feature = "integration")]
mod tests {
    use super::*;

    use loadgen::{
        BroadcastSink, ProfileKind, RunConfig, RunController, RunSnapshot, RunState, StartError,
        TargetPool,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn config(profile: ProfileKind) -> RunConfig {
        RunConfig {
            backend_address: BACKEND_ADDRESS.to_string(),
            max_rps: 100,
            load_profile: profile,
            from_rps: 0,
            to_rps: 0,
            step_rps: 0,
            step_duration: 0,
            once_count: 0,
        }
    }

    fn controller(ids: &[&str]) -> (RunController, Arc<BroadcastSink>) {
        let pool = TargetPool::new(ids.iter().map(|id| id.to_string()).collect());
        let sink = Arc::new(BroadcastSink::default());
        let controller = RunController::new(Arc::new(pool), sink.clone()).unwrap();
        (controller, sink)
    }

    async fn terminal(rx: &mut broadcast::Receiver<RunSnapshot>) -> RunSnapshot {
        tokio::time::timeout(Duration::from_secs(30), async {
            loop {
                match rx.recv().await {
                    Ok(snap) if !snap.is_running => return snap,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => {
                        panic!("snapshot stream closed without a terminal snapshot")
                    }
                }
            }
        })
        .await
        .expect("no terminal snapshot within 30s")
    }

    async fn wait_for_idle(controller: &RunController) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while controller.state() != RunState::Idle {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("controller did not return to idle");
    }

    #[tokio::test]
    async fn mock_backend_classifies_clients() -> anyhow::Result<()> {
        init().await;

        let client = reqwest::Client::new();

        let ok = client
            .get(format!("{BACKEND_ADDRESS}/ads?client_id=client-1"))
            .send()
            .await?;
        assert!(ok.status().is_success());
        let body: serde_json::Value = serde_json::from_str(&ok.text().await?)?;
        assert_eq!(body["ad_id"], "ad-for-client-1");

        let boom = client
            .get(format!("{BACKEND_ADDRESS}/ads?client_id=boom-1"))
            .send()
            .await?;
        assert_eq!(boom.status().as_u16(), 500);

        Ok(())
    }

    #[tokio::test]
    #[ntest::timeout(60000)]
    async fn once_profile_sends_exactly_count_requests() {
        init().await;

        let (controller, sink) = controller(&["client-1", "client-2"]);
        let mut rx = sink.subscribe();

        let mut cfg = config(ProfileKind::Once);
        cfg.once_count = 500;
        controller.start(cfg).unwrap();

        let snap = terminal(&mut rx).await;
        assert_eq!(snap.total_reqs, 500);
        assert_eq!(snap.total_errors, 0);
        wait_for_idle(&controller).await;
    }

    #[tokio::test]
    #[ntest::timeout(60000)]
    async fn const_profile_tracks_the_configured_rate() {
        init().await;

        let (controller, sink) = controller(&["client-1"]);
        let mut rx = sink.subscribe();

        let mut cfg = config(ProfileKind::Const);
        cfg.max_rps = 20;
        controller.start(cfg).unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        controller.stop();

        let snap = terminal(&mut rx).await;
        // ~5s at 20/s, with wide margins for scheduler noise.
        assert!(snap.total_reqs >= 50, "too few requests: {}", snap.total_reqs);
        assert!(snap.total_reqs <= 150, "too many requests: {}", snap.total_reqs);
        assert_eq!(snap.total_errors, 0);
        wait_for_idle(&controller).await;
    }

    #[tokio::test]
    #[ntest::timeout(60000)]
    async fn failing_clients_are_counted_as_errors() {
        init().await;

        let (controller, sink) = controller(&["boom-1"]);
        let mut rx = sink.subscribe();

        let mut cfg = config(ProfileKind::Once);
        cfg.once_count = 200;
        controller.start(cfg).unwrap();

        let snap = terminal(&mut rx).await;
        assert_eq!(snap.total_reqs, 200);
        assert_eq!(snap.total_errors, 200);
    }

    #[tokio::test]
    #[ntest::timeout(60000)]
    async fn rate_limited_backend_produces_partial_errors() {
        init().await;

        let (controller, sink) = controller(&["limited-1"]);
        let mut rx = sink.subscribe();

        let mut cfg = config(ProfileKind::Once);
        cfg.once_count = 500;
        cfg.max_rps = 200;
        controller.start(cfg).unwrap();

        let snap = terminal(&mut rx).await;
        assert_eq!(snap.total_reqs, 500);
        assert!(snap.total_errors > 0, "expected the rate limit to trip");
    }

    #[tokio::test]
    #[ntest::timeout(60000)]
    async fn start_is_exclusive_while_a_run_is_active() {
        init().await;

        let (controller, sink) = controller(&["client-1"]);
        let mut rx = sink.subscribe();

        controller.start(config(ProfileKind::Const)).unwrap();
        assert!(matches!(
            controller.start(config(ProfileKind::Const)),
            Err(StartError::AlreadyRunning)
        ));

        controller.stop();
        terminal(&mut rx).await;
        wait_for_idle(&controller).await;

        controller.start(config(ProfileKind::Const)).unwrap();
        controller.stop();
        terminal(&mut rx).await;
    }

    #[tokio::test]
    #[ntest::timeout(60000)]
    async fn stop_ends_an_unlimited_run() {
        init().await;

        let (controller, sink) = controller(&["client-1"]);
        let mut rx = sink.subscribe();

        let mut cfg = config(ProfileKind::Unlimited);
        cfg.max_rps = 50;
        controller.start(cfg).unwrap();

        // Let a couple of aggregation windows pass before stopping.
        tokio::time::sleep(Duration::from_secs(2)).await;
        controller.stop();

        let snap = terminal(&mut rx).await;
        assert!(snap.total_reqs > 0);
        wait_for_idle(&controller).await;
    }
}
