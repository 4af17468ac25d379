//! Instrumented in-memory pool driver
//!
//! Every driver call is appended to a shared [`Recorder`], so tests can
//! assert both how often something happened and in which order. Failures are
//! injected through [`Faults`], which all clones of a driver and its pools
//! share.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pool_lifespan::{ConnectionPool, DbTransaction, Driver, DriverOptions, PooledConnection};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Target accepted by [`MockDriver`].
pub const MOCK_TARGET: &str = "mock://localhost/app";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    CreatePool,
    Acquire(usize),
    Release(usize),
    Execute(String),
    Begin,
    Commit,
    Rollback,
    /// A transaction was dropped without commit or rollback.
    DropActive,
    Ping,
    Close,
}

/// Shared, ordered log of driver events.
#[derive(Debug, Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Event>>>);

impl Recorder {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, wanted: fn(&Event) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|e| wanted(e)).count()
    }

    pub fn acquired(&self) -> usize {
        self.count(|e| matches!(e, Event::Acquire(_)))
    }

    pub fn released(&self) -> usize {
        self.count(|e| matches!(e, Event::Release(_)))
    }

    pub fn created(&self) -> usize {
        self.count(|e| *e == Event::CreatePool)
    }

    pub fn closed(&self) -> usize {
        self.count(|e| *e == Event::Close)
    }

    pub fn committed(&self) -> usize {
        self.count(|e| *e == Event::Commit)
    }

    pub fn rolled_back(&self) -> usize {
        self.count(|e| *e == Event::Rollback)
    }

    /// Events with connection ids erased, for order assertions.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events()
            .iter()
            .map(|e| match e {
                Event::CreatePool => "create",
                Event::Acquire(_) => "acquire",
                Event::Release(_) => "release",
                Event::Execute(_) => "execute",
                Event::Begin => "begin",
                Event::Commit => "commit",
                Event::Rollback => "rollback",
                Event::DropActive => "drop_active",
                Event::Ping => "ping",
                Event::Close => "close",
            })
            .collect()
    }
}

/// Switches that make the next driver calls fail.
#[derive(Debug, Default)]
pub struct Faults {
    pub create: AtomicBool,
    pub acquire: AtomicBool,
    pub begin: AtomicBool,
    pub commit: AtomicBool,
    pub rollback: AtomicBool,
}

impl Faults {
    fn hit(flag: &AtomicBool) -> bool {
        flag.load(Ordering::SeqCst)
    }
}

fn injected(what: &str) -> sqlx::Error {
    sqlx::Error::Protocol(format!("injected {what} failure"))
}

#[derive(Debug, Clone)]
pub struct MockDriver {
    pub recorder: Recorder,
    pub faults: Arc<Faults>,
    capacity: usize,
}

impl MockDriver {
    pub fn new(capacity: usize) -> Self {
        Self {
            recorder: Recorder::default(),
            faults: Arc::new(Faults::default()),
            capacity,
        }
    }

    /// A pool built outside any binder, as a test harness would supply it.
    pub fn external_pool(&self) -> MockPool {
        MockPool::new(self.capacity, self.recorder.clone(), Arc::clone(&self.faults))
    }
}

#[async_trait]
impl Driver for MockDriver {
    type Pool = MockPool;

    async fn create_pool(
        &self,
        target: &str,
        options: &DriverOptions,
    ) -> Result<MockPool, sqlx::Error> {
        self.recorder.push(Event::CreatePool);
        if Faults::hit(&self.faults.create) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        if !target.starts_with("mock://") {
            return Err(sqlx::Error::Configuration(
                format!("unsupported target {target:?}").into(),
            ));
        }

        let capacity = options
            .get::<usize>("max_connections")
            .map_err(|e| sqlx::Error::Configuration(e.into()))?
            .unwrap_or(self.capacity);
        Ok(MockPool::new(
            capacity,
            self.recorder.clone(),
            Arc::clone(&self.faults),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct MockPool {
    recorder: Recorder,
    faults: Arc<Faults>,
    permits: Arc<Semaphore>,
    free: Arc<Mutex<Vec<usize>>>,
    checked_out: Arc<Mutex<HashSet<usize>>>,
    closed: Arc<AtomicBool>,
}

impl MockPool {
    fn new(capacity: usize, recorder: Recorder, faults: Arc<Faults>) -> Self {
        Self {
            recorder,
            faults,
            permits: Arc::new(Semaphore::new(capacity)),
            free: Arc::new(Mutex::new((0..capacity).rev().collect())),
            checked_out: Arc::new(Mutex::new(HashSet::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Whether `other` is a handle to the same pool.
    pub fn same_pool(&self, other: &MockPool) -> bool {
        Arc::ptr_eq(&self.permits, &other.permits)
    }
}

#[async_trait]
impl ConnectionPool for MockPool {
    type Connection = MockConnection;

    async fn acquire(&self) -> Result<MockConnection, sqlx::Error> {
        if Faults::hit(&self.faults.acquire) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| sqlx::Error::PoolClosed)?;
        let id = self
            .free
            .lock()
            .unwrap()
            .pop()
            .expect("a permit always has a free connection");
        assert!(
            self.checked_out.lock().unwrap().insert(id),
            "connection {id} handed out twice"
        );
        self.recorder.push(Event::Acquire(id));

        Ok(MockConnection {
            id,
            recorder: self.recorder.clone(),
            faults: Arc::clone(&self.faults),
            free: Arc::clone(&self.free),
            checked_out: Arc::clone(&self.checked_out),
            _permit: permit,
        })
    }

    async fn close(&self) {
        self.recorder.push(Event::Close);
        self.closed.store(true, Ordering::SeqCst);
        self.permits.close();
    }
}

#[derive(Debug)]
pub struct MockConnection {
    pub id: usize,
    recorder: Recorder,
    faults: Arc<Faults>,
    free: Arc<Mutex<Vec<usize>>>,
    checked_out: Arc<Mutex<HashSet<usize>>>,
    _permit: OwnedSemaphorePermit,
}

impl MockConnection {
    pub fn execute(&mut self, statement: &str) {
        self.recorder.push(Event::Execute(statement.to_string()));
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.checked_out.lock().unwrap().remove(&self.id);
        self.free.lock().unwrap().push(self.id);
        self.recorder.push(Event::Release(self.id));
    }
}

#[async_trait]
impl PooledConnection for MockConnection {
    type Transaction<'c> = MockTransaction<'c>;

    async fn begin<'c>(&'c mut self) -> Result<MockTransaction<'c>, sqlx::Error> {
        self.recorder.push(Event::Begin);
        if Faults::hit(&self.faults.begin) {
            return Err(injected("begin"));
        }
        Ok(MockTransaction {
            conn: self,
            finished: false,
        })
    }

    async fn ping(&mut self) -> Result<(), sqlx::Error> {
        self.recorder.push(Event::Ping);
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockTransaction<'c> {
    conn: &'c mut MockConnection,
    finished: bool,
}

impl MockTransaction<'_> {
    pub fn execute(&mut self, statement: &str) {
        self.conn.execute(statement);
    }

    pub fn connection_id(&self) -> usize {
        self.conn.id
    }
}

impl Drop for MockTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.conn.recorder.push(Event::DropActive);
        }
    }
}

#[async_trait]
impl<'c> DbTransaction for MockTransaction<'c> {
    async fn commit(mut self) -> Result<(), sqlx::Error> {
        self.finished = true;
        self.conn.recorder.push(Event::Commit);
        if Faults::hit(&self.conn.faults.commit) {
            return Err(injected("commit"));
        }
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), sqlx::Error> {
        self.finished = true;
        self.conn.recorder.push(Event::Rollback);
        if Faults::hit(&self.conn.faults.rollback) {
            return Err(injected("rollback"));
        }
        Ok(())
    }
}
