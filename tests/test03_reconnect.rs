mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pg_steady::driver::DriverEvent;
use pg_steady::events::EventKind;
use pg_steady::probe::PROBE_STATEMENT;
use pg_steady::supervisor::{Supervisor, SupervisorOptions, SupervisorState};

use support::{FakeDriver, FakeFactory, start_supervisor, wait_until};

fn count_reconnects(
    supervisor: &Arc<Supervisor<FakeFactory>>,
) -> Arc<AtomicUsize> {
    let reconnects = Arc::new(AtomicUsize::new(0));
    let counter = reconnects.clone();
    supervisor
        .events()
        .subscribe(EventKind::Reconnect, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        });
    reconnects
}

#[tokio::test(start_paused = true)]
async fn initial_connect_failure_is_fatal() {
    let driver = FakeDriver::new();
    driver.fail_next_creates(1);
    let result = Supervisor::start(
        FakeFactory::new(driver.clone()),
        Arc::new(pg_steady::events::EventBus::new()),
        SupervisorOptions::default(),
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn connection_end_triggers_reconnect_and_parks_callers() {
    let driver = FakeDriver::new();
    let supervisor = start_supervisor(&driver).await;
    let reconnects = count_reconnects(&supervisor);
    assert_eq!(supervisor.state(), SupervisorState::Ready);

    // First reconnect attempt fails, second succeeds.
    driver.fail_next_creates(1);
    driver.inject(DriverEvent::Closed);

    {
        let supervisor = supervisor.clone();
        wait_until(move || !supervisor.gate().is_open()).await;
    }
    assert_eq!(supervisor.state(), SupervisorState::Reconnecting);

    // A caller arriving during the outage parks and completes after reopen.
    let parked = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.acquire().await.map(|_| ()) })
    };

    {
        let driver = driver.clone();
        let supervisor = supervisor.clone();
        wait_until(move || driver.created() == 2 && supervisor.gate().is_open()).await;
    }

    parked.await.unwrap().unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Ready);
    assert_eq!(reconnects.load(Ordering::SeqCst), 1);
    // The stale resource was destroyed exactly once.
    assert_eq!(driver.destroyed(), 1);
}

#[tokio::test(start_paused = true)]
async fn driver_error_with_healthy_probe_keeps_gate_open() {
    let driver = FakeDriver::new();
    let supervisor = start_supervisor(&driver).await;
    let reconnects = count_reconnects(&supervisor);
    let probes_before = driver
        .sql_log()
        .iter()
        .filter(|sql| *sql == PROBE_STATEMENT)
        .count();

    driver.inject(DriverEvent::Error("spurious wakeup".to_string()));

    {
        let driver = driver.clone();
        wait_until(move || {
            driver
                .sql_log()
                .iter()
                .filter(|sql| *sql == PROBE_STATEMENT)
                .count()
                > probes_before
        })
        .await;
    }

    assert!(supervisor.gate().is_open());
    assert_eq!(supervisor.state(), SupervisorState::Ready);
    assert_eq!(driver.created(), 1);
    assert_eq!(reconnects.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn driver_error_with_failing_probe_reconnects_once() {
    let driver = FakeDriver::new();
    let supervisor = start_supervisor(&driver).await;
    let reconnects = count_reconnects(&supervisor);

    driver.fail_next_probes(1);
    driver.inject(DriverEvent::Error("socket reset".to_string()));

    {
        let driver = driver.clone();
        let supervisor = supervisor.clone();
        wait_until(move || driver.created() == 2 && supervisor.gate().is_open()).await;
    }

    // Gate reopened exactly once: one reconnect event, still Ready.
    assert_eq!(reconnects.load(Ordering::SeqCst), 1);
    assert_eq!(supervisor.state(), SupervisorState::Ready);
    supervisor.acquire().await.unwrap();
}
