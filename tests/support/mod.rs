// In-memory driver used to exercise the supervisor/executor/notification
// stack without a server. Replies are scripted as a queue consumed by every
// non-probe statement in call order; the probe statement has its own failure
// counter so scripts stay independent of probe timing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use pg_steady::driver::{DriverEvent, QueryHandle, ResourceFactory};
use pg_steady::error::PgSteadyError;
use pg_steady::probe::PROBE_STATEMENT;
use pg_steady::results::ResultSet;
use pg_steady::types::RowValues;

#[allow(dead_code)]
pub enum Reply {
    Ok(ResultSet),
    Fail {
        code: Option<&'static str>,
        message: &'static str,
    },
    Delayed(Duration, Box<Reply>),
}

#[derive(Default)]
struct DriverInner {
    replies: Mutex<VecDeque<Reply>>,
    sql_log: Mutex<Vec<String>>,
    failing_creates: AtomicUsize,
    failing_probes: AtomicUsize,
    created: AtomicUsize,
    destroyed: AtomicUsize,
    events: Mutex<Option<UnboundedSender<DriverEvent>>>,
}

/// Scriptable in-memory driver. Cloning shares the script and counters.
#[derive(Clone, Default)]
pub struct FakeDriver {
    inner: Arc<DriverInner>,
}

impl std::fmt::Debug for FakeDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeDriver").finish_non_exhaustive()
    }
}

#[allow(dead_code)]
impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply: Reply) {
        self.inner.replies.lock().unwrap().push_back(reply);
    }

    /// Make the next `n` resource creations fail.
    pub fn fail_next_creates(&self, n: usize) {
        self.inner.failing_creates.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` probe statements fail.
    pub fn fail_next_probes(&self, n: usize) {
        self.inner.failing_probes.store(n, Ordering::SeqCst);
    }

    /// Every statement issued so far, probes included.
    pub fn sql_log(&self) -> Vec<String> {
        self.inner.sql_log.lock().unwrap().clone()
    }

    /// Statements issued, probes filtered out.
    pub fn statements(&self) -> Vec<String> {
        self.sql_log()
            .into_iter()
            .filter(|sql| sql != PROBE_STATEMENT)
            .collect()
    }

    pub fn created(&self) -> usize {
        self.inner.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Inject an asynchronous driver signal, as the wire driver would.
    pub fn inject(&self, event: DriverEvent) {
        let sender = self.inner.events.lock().unwrap().clone();
        sender
            .expect("no resource created yet")
            .send(event)
            .expect("supervisor inbox closed");
    }

    fn log(&self, sql: &str) {
        self.inner.sql_log.lock().unwrap().push(sql.to_string());
    }

    fn next_reply(&self) -> Option<Reply> {
        self.inner.replies.lock().unwrap().pop_front()
    }
}

pub struct FakeResource;

#[derive(Clone, Debug)]
pub struct FakeHandle {
    driver: FakeDriver,
}


#[async_trait]
impl QueryHandle for FakeHandle {
    async fn run(&self, sql: &str, _params: &[RowValues]) -> Result<ResultSet, PgSteadyError> {
        self.driver.log(sql);
        if sql == PROBE_STATEMENT {
            if take_one(&self.driver.inner.failing_probes) {
                return Err(PgSteadyError::ConnectionError("probe refused".to_string()));
            }
            return Ok(single_int_row(1));
        }
        match self.driver.next_reply() {
            None => Ok(single_int_row(1)),
            Some(reply) => resolve(reply).await,
        }
    }

    async fn run_batch(&self, sql: &str) -> Result<(), PgSteadyError> {
        self.driver.log(sql);
        match self.driver.next_reply() {
            None => Ok(()),
            Some(reply) => resolve(reply).await.map(|_| ()),
        }
    }
}

async fn resolve(reply: Reply) -> Result<ResultSet, PgSteadyError> {
    match reply {
        Reply::Ok(rows) => Ok(rows),
        Reply::Fail { code, message } => Err(match code {
            Some(code) => PgSteadyError::SqlState {
                code: code.to_string(),
                message: message.to_string(),
            },
            None => PgSteadyError::ExecutionError(message.to_string()),
        }),
        Reply::Delayed(wait, inner) => {
            tokio::time::sleep(wait).await;
            Box::pin(resolve(*inner)).await
        }
    }
}

pub struct FakeFactory {
    pub driver: FakeDriver,
}

impl FakeFactory {
    pub fn new(driver: FakeDriver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl ResourceFactory for FakeFactory {
    type Resource = FakeResource;
    type Handle = FakeHandle;

    async fn create(
        &self,
        events: UnboundedSender<DriverEvent>,
    ) -> Result<FakeResource, PgSteadyError> {
        if take_one(&self.driver.inner.failing_creates) {
            return Err(PgSteadyError::ConnectionError("connect refused".to_string()));
        }
        *self.driver.inner.events.lock().unwrap() = Some(events);
        self.driver.inner.created.fetch_add(1, Ordering::SeqCst);
        Ok(FakeResource)
    }

    async fn acquire(&self, _resource: &FakeResource) -> Result<FakeHandle, PgSteadyError> {
        Ok(FakeHandle {
            driver: self.driver.clone(),
        })
    }

    async fn destroy(&self, _resource: FakeResource) -> Result<(), PgSteadyError> {
        self.driver.inner.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// One row, one `int8` column named `value`.
pub fn single_int_row(value: i64) -> ResultSet {
    let mut set = ResultSet::with_capacity(1);
    set.set_column_names(Arc::new(vec!["value".to_string()]));
    set.add_row_values(vec![RowValues::Int(value)]);
    set
}

/// Start a supervisor over the fake driver with default options.
#[allow(dead_code)]
pub async fn start_supervisor(
    driver: &FakeDriver,
) -> std::sync::Arc<pg_steady::supervisor::Supervisor<FakeFactory>> {
    pg_steady::supervisor::Supervisor::start(
        FakeFactory::new(driver.clone()),
        Arc::new(pg_steady::events::EventBus::new()),
        pg_steady::supervisor::SupervisorOptions::default(),
    )
    .await
    .expect("supervisor start failed")
}

/// Poll `condition` under paused time until it holds.
#[allow(dead_code)]
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
