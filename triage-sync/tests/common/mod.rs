//! Scripted in-memory triage service shared by the store tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use triage_sync::config::EngineConfig;
use triage_sync::state::{StoreEvent, TriageStore};
use triage_sync::sync::transitions::apply_to_item;
use triage_sync::types::{
    CountSnapshot, DetailBody, ItemStatus, ListPage, ListRequest, MutateMode,
};
use triage_sync::{Item, Result, TriageAction, TriageError, TriageService};

/// Items `t-0..t-{n-1}`, newest first, all in todo
pub fn todo_items(n: usize) -> Vec<Item> {
    (0..n)
        .map(|i| item(&format!("t-{i}"), ItemStatus::Todo, i))
        .collect()
}

/// An item received `age_minutes` before a fixed origin
pub fn item(id: &str, status: ItemStatus, age_minutes: usize) -> Item {
    let origin = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let suffix = id.rsplit('-').next().unwrap_or(id);
    Item::new(
        id,
        status,
        origin - chrono::Duration::minutes(age_minutes as i64),
    )
    .with_subject(format!("Subject {suffix}"))
}

pub fn ids(items: &[Item]) -> Vec<String> {
    items.iter().map(|item| item.id.clone()).collect()
}

/// Config with warm-up prefetch disabled so detail calls stay predictable
pub fn quiet_config() -> EngineConfig {
    EngineConfig {
        warmup_prefetch_count: 0,
        ..EngineConfig::default()
    }
}

pub fn drain(events: &flume::Receiver<StoreEvent>) -> Vec<StoreEvent> {
    events.try_iter().collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutateCall {
    pub id: String,
    pub action: TriageAction,
    pub mode: MutateMode,
}

#[derive(Default)]
pub struct MockService {
    items: Mutex<Vec<Item>>,
    list_delays: Mutex<VecDeque<Duration>>,
    list_calls: AtomicUsize,
    detail_delays: Mutex<HashMap<String, Duration>>,
    detail_calls: Mutex<Vec<String>>,
    mutate_delay: Mutex<Duration>,
    mutate_calls: Mutex<Vec<MutateCall>>,
    failures: Mutex<HashMap<String, VecDeque<TriageError>>>,
    outstanding: AtomicUsize,
    peak: AtomicUsize,
    counts_calls: AtomicUsize,
}

impl MockService {
    pub fn new(items: Vec<Item>) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(items),
            ..Self::default()
        })
    }

    /// Delay for the next list call; unscripted calls answer immediately
    pub fn push_list_delay(&self, delay: Duration) {
        self.list_delays.lock().unwrap().push_back(delay);
    }

    pub fn set_detail_delay(&self, id: &str, delay: Duration) {
        self.detail_delays
            .lock()
            .unwrap()
            .insert(id.to_string(), delay);
    }

    pub fn set_mutate_delay(&self, delay: Duration) {
        *self.mutate_delay.lock().unwrap() = delay;
    }

    /// Fail the next mutate call for `id` with `error`
    pub fn fail_next(&self, id: &str, error: TriageError) {
        self.failures
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push_back(error);
    }

    /// Someone else removed the item remotely
    pub fn remove_item(&self, id: &str) {
        self.items.lock().unwrap().retain(|item| item.id != id);
    }

    pub fn server_item(&self, id: &str) -> Option<Item> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|item| item.id == id)
            .cloned()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self) -> Vec<String> {
        self.detail_calls.lock().unwrap().clone()
    }

    pub fn detail_calls_for(&self, id: &str) -> usize {
        self.detail_calls().iter().filter(|call| *call == id).count()
    }

    pub fn mutate_calls(&self) -> Vec<MutateCall> {
        self.mutate_calls.lock().unwrap().clone()
    }

    pub fn mutate_calls_named(&self, name: &str) -> Vec<MutateCall> {
        self.mutate_calls()
            .into_iter()
            .filter(|call| call.action.name() == name)
            .collect()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn counts_calls(&self) -> usize {
        self.counts_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TriageService for MockService {
    async fn list(&self, request: &ListRequest) -> Result<ListPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.list_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let matching: Vec<Item> = self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|item| request.view.contains(item))
            .cloned()
            .collect();

        let offset: usize = request
            .page_token
            .as_deref()
            .map(|token| token.parse().unwrap())
            .unwrap_or(0);
        let end = (offset + request.page_size).min(matching.len());
        let next_page_token = (end < matching.len()).then(|| end.to_string());

        Ok(ListPage {
            items: matching[offset.min(end)..end].to_vec(),
            next_page_token,
        })
    }

    async fn detail(&self, id: &str) -> Result<DetailBody> {
        self.detail_calls.lock().unwrap().push(id.to_string());
        let delay = self.detail_delays.lock().unwrap().get(id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.server_item(id).is_none() {
            return Err(TriageError::NotFound(id.to_string()));
        }
        Ok(DetailBody {
            body_plain: Some(format!("body of {id}")),
            body_html: None,
            notice: None,
        })
    }

    async fn mutate(&self, id: &str, action: &TriageAction, mode: MutateMode) -> Result<()> {
        self.mutate_calls.lock().unwrap().push(MutateCall {
            id: id.to_string(),
            action: action.clone(),
            mode,
        });

        let now = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let delay = *self.mutate_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.outstanding.fetch_sub(1, Ordering::SeqCst);

        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(|queue| queue.pop_front());
        if let Some(error) = failure {
            return Err(error);
        }

        let mut items = self.items.lock().unwrap();
        match items.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                apply_to_item(item, action);
                Ok(())
            }
            None => Err(TriageError::NotFound(id.to_string())),
        }
    }

    async fn counts(&self) -> Result<CountSnapshot> {
        self.counts_calls.fetch_add(1, Ordering::SeqCst);
        let items = self.items.lock().unwrap();
        let mut counts = CountSnapshot::new();
        for status in ItemStatus::ALL {
            let n = items.iter().filter(|item| item.status == status).count();
            counts.set(status, n as u64);
        }
        Ok(counts)
    }
}

/// Store over `service` with the first page and counts loaded
pub async fn loaded_store(
    service: &Arc<MockService>,
    config: EngineConfig,
) -> (TriageStore, flume::Receiver<StoreEvent>) {
    let (store, events) = TriageStore::new(service.clone(), config);
    store.load_list().await.unwrap();
    store.refresh_counts().await.unwrap();
    (store, events)
}

pub fn set_of(values: &[&str]) -> HashSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}
