mod support;

use std::time::Duration;

use pg_steady::error::PgSteadyError;
use pg_steady::executor::QueryExecutor;
use pg_steady::types::RowValues;

use support::{FakeDriver, Reply, start_supervisor};

#[tokio::test(start_paused = true)]
async fn happy_query_returns_rows_and_settles_counter() {
    let driver = FakeDriver::new();
    let supervisor = start_supervisor(&driver).await;
    let executor = QueryExecutor::new(supervisor, 2);

    let rows = executor.execute("SELECT 1;", &[]).await.unwrap();
    assert_eq!(rows.results.len(), 1);
    assert_eq!(rows.results[0].get("value"), Some(&RowValues::Int(1)));
    assert_eq!(executor.active_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_retries_once_with_backoff() {
    let driver = FakeDriver::new();
    let supervisor = start_supervisor(&driver).await;
    let executor = QueryExecutor::new(supervisor, 2);

    driver.push_reply(Reply::Fail {
        code: Some("40001"),
        message: "serialization failure",
    });

    let started = tokio::time::Instant::now();
    let rows = executor.execute("UPDATE t SET x=1", &[]).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(rows.results.len(), 1);
    let updates = driver
        .statements()
        .iter()
        .filter(|sql| sql.starts_with("UPDATE"))
        .count();
    assert_eq!(updates, 2);
    // Exactly one backoff sleep: base 1s plus at most 500ms jitter.
    assert!(elapsed >= Duration::from_secs(1), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "elapsed {elapsed:?}");
    assert_eq!(executor.active_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn non_retriable_failure_surfaces_without_retry() {
    let driver = FakeDriver::new();
    let supervisor = start_supervisor(&driver).await;
    let executor = QueryExecutor::new(supervisor, 3);

    driver.push_reply(Reply::Fail {
        code: Some("23505"),
        message: "unique violation",
    });

    let started = tokio::time::Instant::now();
    let error = executor
        .execute("INSERT INTO t VALUES (1)", &[])
        .await
        .unwrap_err();

    assert!(matches!(error, PgSteadyError::SqlState { code, .. } if code == "23505"));
    let inserts = driver
        .statements()
        .iter()
        .filter(|sql| sql.starts_with("INSERT"))
        .count();
    assert_eq!(inserts, 1);
    // No backoff was taken.
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(executor.active_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn single_attempt_disables_retry() {
    let driver = FakeDriver::new();
    let supervisor = start_supervisor(&driver).await;
    // Zero is floored to one attempt.
    let executor = QueryExecutor::new(supervisor, 0);
    assert_eq!(executor.max_attempts(), 1);

    driver.push_reply(Reply::Fail {
        code: Some("40001"),
        message: "serialization failure",
    });

    let error = executor.execute("UPDATE t SET x=1", &[]).await.unwrap_err();
    assert!(matches!(error, PgSteadyError::SqlState { code, .. } if code == "40001"));
    assert_eq!(executor.active_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn last_attempt_failure_surfaces_transient_error() {
    let driver = FakeDriver::new();
    let supervisor = start_supervisor(&driver).await;
    let executor = QueryExecutor::new(supervisor, 2);

    driver.push_reply(Reply::Fail {
        code: Some("40001"),
        message: "first",
    });
    driver.push_reply(Reply::Fail {
        code: Some("40001"),
        message: "second",
    });

    let error = executor.execute("UPDATE t SET x=1", &[]).await.unwrap_err();
    assert!(matches!(error, PgSteadyError::SqlState { message, .. } if message == "second"));
    assert_eq!(executor.active_requests(), 0);
}
