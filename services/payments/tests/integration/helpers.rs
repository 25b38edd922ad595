#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use tokio::time::Instant;

use payflow_domain::job::Job;
use payflow_payments::domain::repository::{JobConsumer, JobQueue, KeyValueStore};
use payflow_payments::domain::types::{JobHandle, ReservedJob};
use payflow_payments::error::PaymentServiceError;
use payflow_payments::infra::rate_limiter::FixedWindowLimiter;
use payflow_payments::infra::record_store::KvPaymentRepository;
use payflow_payments::state::AppState;
use payflow_payments::worker::WorkerSettings;

fn store_down(what: &str) -> PaymentServiceError {
    PaymentServiceError::StoreUnavailable(anyhow!("{what} refused"))
}

fn queue_down(what: &str) -> PaymentServiceError {
    PaymentServiceError::QueueUnavailable(anyhow!("{what} refused"))
}

// ── MemoryStore ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

#[derive(Default)]
pub struct StoreFaults {
    pub fail_get: bool,
    pub fail_incr: bool,
    /// Number of `set` calls that succeed before every later one fails.
    pub fail_set_after: Option<usize>,
}

/// In-memory `KeyValueStore` with expiry on the tokio clock, so
/// `#[tokio::test(start_paused = true)]` tests can advance time.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    sets: Arc<Mutex<usize>>,
    pub faults: Arc<Mutex<StoreFaults>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .is_some_and(Entry::live)
    }

    pub fn live_keys(&self) -> Vec<String> {
        let entries = self.entries.lock().unwrap();
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.live())
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn expires_at(&self, key: &str) -> Option<Instant> {
        self.entries.lock().unwrap().get(key).and_then(|e| e.expires_at)
    }

    pub fn put_raw(&self, key: &str, value: &[u8]) {
        self.entries.lock().unwrap().insert(
            key.to_owned(),
            Entry {
                value: value.to_vec(),
                expires_at: None,
            },
        );
    }

    pub fn remove(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PaymentServiceError> {
        if self.faults.lock().unwrap().fail_get {
            return Err(store_down("get"));
        }
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .get(key)
            .filter(|e| e.live())
            .map(|e| e.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), PaymentServiceError> {
        let mut sets = self.sets.lock().unwrap();
        if let Some(limit) = self.faults.lock().unwrap().fail_set_after {
            if *sets >= limit {
                return Err(store_down("set"));
            }
        }
        *sets += 1;
        self.entries.lock().unwrap().insert(
            key.to_owned(),
            Entry {
                value,
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, PaymentServiceError> {
        if self.faults.lock().unwrap().fail_incr {
            return Err(store_down("incr"));
        }
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.to_owned()).or_default();
        let current = if entry.live() {
            std::str::from_utf8(&entry.value)
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0)
        } else {
            entry.expires_at = None;
            0
        };
        let next = current + 1;
        entry.value = next.to_string().into_bytes();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), PaymentServiceError> {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }
}

// ── MemoryBroker ─────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct BrokerState {
    next_id: u64,
    pub ready: VecDeque<(u64, Vec<u8>)>,
    reserved: HashMap<u64, (Vec<u8>, Instant)>,
    pub buried: Vec<(u64, Vec<u8>)>,
    pub deleted: Vec<u64>,
    pub released: Vec<u64>,
    pub fail_publish: bool,
    /// Number of upcoming `reserve` calls that fail.
    pub fail_reserves: usize,
    pub reserve_calls: usize,
}

impl BrokerState {
    fn release_expired(&mut self) {
        let now = Instant::now();
        let expired: Vec<u64> = self
            .reserved
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            if let Some((payload, _)) = self.reserved.remove(&id) {
                self.ready.push_back((id, payload));
            }
        }
    }

    pub fn reserved_count(&self) -> usize {
        self.reserved.len()
    }
}

/// In-memory work queue with reservation deadlines on the tokio clock. A
/// reservation not settled within `ttr` goes back to the ready list.
#[derive(Clone)]
pub struct MemoryBroker {
    pub state: Arc<Mutex<BrokerState>>,
    ttr: Duration,
}

impl MemoryBroker {
    pub fn new(ttr: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState::default())),
            ttr,
        }
    }

    pub fn queue(&self) -> MemoryQueue {
        MemoryQueue {
            broker: self.clone(),
        }
    }

    pub fn consumer(&self) -> MemoryConsumer {
        MemoryConsumer {
            broker: self.clone(),
        }
    }

    pub fn push_raw(&self, payload: &[u8]) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.ready.push_back((id, payload.to_vec()));
        id
    }

    pub fn ready_payloads(&self) -> Vec<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state.ready.iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn buried_count(&self) -> usize {
        self.state.lock().unwrap().buried.len()
    }

    pub fn deleted_count(&self) -> usize {
        self.state.lock().unwrap().deleted.len()
    }
}

#[derive(Clone)]
pub struct MemoryQueue {
    broker: MemoryBroker,
}

impl JobQueue for MemoryQueue {
    async fn publish(&self, job: &Job) -> Result<(), PaymentServiceError> {
        let mut state = self.broker.state.lock().unwrap();
        if state.fail_publish {
            return Err(queue_down("put"));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.ready.push_back((id, job.payload.clone()));
        Ok(())
    }
}

pub struct MemoryConsumer {
    broker: MemoryBroker,
}

impl MemoryConsumer {
    fn try_reserve(&self) -> Option<ReservedJob> {
        let mut state = self.broker.state.lock().unwrap();
        state.release_expired();
        let (id, payload) = state.ready.pop_front()?;
        let deadline = Instant::now() + self.broker.ttr;
        state.reserved.insert(id, (payload.clone(), deadline));
        Some(ReservedJob {
            handle: JobHandle(id),
            payload,
        })
    }
}

impl JobConsumer for MemoryConsumer {
    async fn reserve(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<ReservedJob>, PaymentServiceError> {
        {
            let mut state = self.broker.state.lock().unwrap();
            state.reserve_calls += 1;
            if state.fail_reserves > 0 {
                state.fail_reserves -= 1;
                return Err(queue_down("reserve"));
            }
        }
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(job) = self.try_reserve() {
                return Ok(Some(job));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn acknowledge(&mut self, handle: JobHandle) -> Result<(), PaymentServiceError> {
        let mut state = self.broker.state.lock().unwrap();
        match state.reserved.remove(&handle.0) {
            Some(_) => {
                state.deleted.push(handle.0);
                Ok(())
            }
            None => Err(queue_down("delete")),
        }
    }

    async fn release(
        &mut self,
        handle: JobHandle,
        delay: Duration,
    ) -> Result<(), PaymentServiceError> {
        let mut guard = self.broker.state.lock().unwrap();
        let state = &mut *guard;
        match state.reserved.get_mut(&handle.0) {
            Some((_, deadline)) => {
                // A lapsed reservation and a delayed release both return to `ready`.
                *deadline = Instant::now() + delay;
                state.released.push(handle.0);
                Ok(())
            }
            None => Err(queue_down("release")),
        }
    }

    async fn fail_permanently(&mut self, handle: JobHandle) -> Result<(), PaymentServiceError> {
        let mut state = self.broker.state.lock().unwrap();
        match state.reserved.remove(&handle.0) {
            Some((payload, _)) => {
                state.buried.push((handle.0, payload));
                Ok(())
            }
            None => Err(queue_down("bury")),
        }
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

pub const TEST_LIMIT: u64 = 5;
pub const TEST_WINDOW: Duration = Duration::from_secs(60);
pub const TEST_TTR: Duration = Duration::from_secs(30);

pub type MemoryAppState =
    AppState<FixedWindowLimiter<MemoryStore>, KvPaymentRepository<MemoryStore>, MemoryQueue>;

/// Wiring shared by the use-case, handler, and end-to-end tests.
pub struct Harness {
    pub store: MemoryStore,
    pub broker: MemoryBroker,
    pub state: MemoryAppState,
}

impl Harness {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let broker = MemoryBroker::new(TEST_TTR);
        let state = AppState {
            limiter: FixedWindowLimiter::new(store.clone(), TEST_LIMIT, TEST_WINDOW),
            payments: KvPaymentRepository::new(store.clone(), Duration::ZERO),
            queue: broker.queue(),
        };
        Self {
            store,
            broker,
            state,
        }
    }

    pub fn payments(&self) -> KvPaymentRepository<MemoryStore> {
        self.state.payments.clone()
    }
}

pub fn fast_worker_settings() -> WorkerSettings {
    WorkerSettings {
        reserve_timeout: Duration::from_millis(100),
        backoff: Duration::from_secs(5),
        processing_delay: Duration::from_millis(50),
    }
}
