use std::{
    collections::HashMap,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use async_trait::async_trait;
use futures::{future::BoxFuture, FutureExt};
use serde_json::Value;
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::{
    error::SyncResult,
    ingest::route_event,
    remote::{envelope, RemoteControl, RemoteEvent},
};

pub type WatchFuture = BoxFuture<'static, anyhow::Result<()>>;
pub type WatchFn = Arc<dyn Fn(Value) -> WatchFuture + Send + Sync>;

pub fn watcher<F, Fut>(f: F) -> WatchFn
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |value| f(value).boxed())
}

pub fn sync_watcher<F>(f: F) -> WatchFn
where
    F: Fn(Value) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(move |value| {
        let result = f(value);
        async move { result }.boxed()
    })
}

/// A custom setter must notify watchers itself, by broadcasting or through a
/// protocol event.
#[async_trait]
pub trait ValueOverride: Send + Sync {
    async fn get(&self, hub: &SyncHub, name: &str) -> SyncResult<Value> {
        hub.get_default(name).await
    }

    async fn set(&self, hub: &SyncHub, name: &str, value: Value) -> SyncResult<()> {
        hub.set_default(name, value).await
    }
}

#[derive(Clone)]
pub enum ValueStrategy {
    Default,
    Custom(Arc<dyn ValueOverride>),
}

impl ValueStrategy {
    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

#[derive(Default)]
struct Registry {
    exact: HashMap<String, Arc<dyn ValueOverride>>,
    families: Vec<(String, Arc<dyn ValueOverride>)>,
}

impl Registry {
    fn lookup(&self, name: &str) -> ValueStrategy {
        if let Some(custom) = self.exact.get(name) {
            return ValueStrategy::Custom(Arc::clone(custom));
        }
        self.families
            .iter()
            .filter(|(prefix, _)| name.len() > prefix.len() && name.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, custom)| ValueStrategy::Custom(Arc::clone(custom)))
            .unwrap_or(ValueStrategy::Default)
    }
}

/// Dropping the handle does not unregister the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchHandle {
    id: u64,
    name: String,
}

impl WatchHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

struct Registration {
    id: u64,
    callback: WatchFn,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SyncHub {
    remote: Arc<dyn RemoteControl>,
    registry: Mutex<Registry>,
    watchers: Mutex<HashMap<String, Vec<Registration>>>,
    next_watch_id: AtomicU64,
}

impl SyncHub {
    pub fn new(remote: Arc<dyn RemoteControl>) -> Arc<Self> {
        Arc::new(Self {
            remote,
            registry: Mutex::new(Registry::default()),
            watchers: Mutex::new(HashMap::new()),
            next_watch_id: AtomicU64::new(1),
        })
    }

    pub fn remote(&self) -> &Arc<dyn RemoteControl> {
        &self.remote
    }

    pub fn register(&self, name: impl Into<String>, custom: Arc<dyn ValueOverride>) {
        let name = name.into();
        if lock(&self.registry)
            .exact
            .insert(name.clone(), custom)
            .is_some()
        {
            warn!(name = %name, "replaced existing value override");
        }
    }

    /// Exact registrations win over families, then the longest prefix.
    pub fn register_family(&self, prefix: impl Into<String>, custom: Arc<dyn ValueOverride>) {
        let prefix = prefix.into();
        let mut registry = lock(&self.registry);
        if let Some(slot) = registry.families.iter_mut().find(|(p, _)| *p == prefix) {
            warn!(prefix = %prefix, "replaced existing family override");
            slot.1 = custom;
        } else {
            registry.families.push((prefix, custom));
        }
    }

    pub fn strategy(&self, name: &str) -> ValueStrategy {
        lock(&self.registry).lookup(name)
    }

    pub async fn get(&self, name: &str) -> SyncResult<Value> {
        match self.strategy(name) {
            ValueStrategy::Custom(custom) => custom.get(self, name).await,
            ValueStrategy::Default => self.get_default(name).await,
        }
    }

    pub async fn set(&self, name: &str, value: Value) -> SyncResult<()> {
        debug!(name, %value, "set");
        match self.strategy(name) {
            ValueStrategy::Custom(custom) => custom.set(self, name, value).await,
            ValueStrategy::Default => self.set_default(name, value).await,
        }
    }

    pub async fn get_default(&self, name: &str) -> SyncResult<Value> {
        Ok(self.remote.get_slot(name).await?)
    }

    pub async fn set_default(&self, name: &str, value: Value) -> SyncResult<()> {
        self.persist(name, value.clone()).await?;
        self.broadcast(name, value).await
    }

    pub async fn persist(&self, name: &str, value: Value) -> SyncResult<()> {
        Ok(self.remote.set_slot(name, value).await?)
    }

    pub async fn broadcast(&self, name: &str, value: Value) -> SyncResult<()> {
        Ok(self.remote.broadcast_event(envelope(name, value)).await?)
    }

    pub fn watch(&self, name: impl Into<String>, callback: WatchFn) -> WatchHandle {
        let name = name.into();
        let id = self.next_watch_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.watchers)
            .entry(name.clone())
            .or_default()
            .push(Registration { id, callback });
        debug!(name = %name, id, "watch registered");
        WatchHandle { id, name }
    }

    pub fn unwatch(&self, handle: &WatchHandle) -> bool {
        let mut watchers = lock(&self.watchers);
        let Some(list) = watchers.get_mut(&handle.name) else {
            return false;
        };
        let before = list.len();
        list.retain(|registration| registration.id != handle.id);
        let removed = list.len() != before;
        if list.is_empty() {
            watchers.remove(&handle.name);
        }
        removed
    }

    pub fn watcher_count(&self, name: &str) -> usize {
        lock(&self.watchers).get(name).map_or(0, Vec::len)
    }

    /// Registers before reading, so a callback may see the same value twice.
    pub async fn watch_init(&self, name: &str, callback: WatchFn) -> SyncResult<WatchHandle> {
        let handle = self.watch(name, Arc::clone(&callback));
        let value = match self.get(name).await {
            Ok(value) => value,
            Err(err) => {
                self.unwatch(&handle);
                return Err(err);
            }
        };
        invoke(name, handle.id, &callback, value).await;
        Ok(handle)
    }

    pub async fn trigger(&self, name: &str, value: Value) -> usize {
        let callbacks: Vec<(u64, WatchFn)> = lock(&self.watchers)
            .get(name)
            .map(|list| {
                list.iter()
                    .map(|registration| (registration.id, Arc::clone(&registration.callback)))
                    .collect()
            })
            .unwrap_or_default();
        for (id, callback) in &callbacks {
            invoke(name, *id, callback, value.clone()).await;
        }
        callbacks.len()
    }

    pub async fn force(&self, name: &str) -> SyncResult<usize> {
        let value = self.get(name).await?;
        Ok(self.trigger(name, value).await)
    }

    pub async fn ingest(&self, event: &RemoteEvent) {
        for routed in route_event(event) {
            match routed {
                Ok((name, value)) => {
                    self.trigger(&name, value).await;
                }
                Err(malformed) => {
                    warn!(
                        event_type = %event.event_type,
                        %malformed,
                        "skipping malformed envelope entry"
                    );
                }
            }
        }
    }

    /// Watchers run on this task and must not wait for their own echoes.
    pub fn spawn_ingestion(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.remote.subscribe_events();
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => hub.ingest(&event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "ingestion lagged behind remote events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            info!("remote event stream closed; ingestion stopped");
        })
    }
}

async fn invoke(name: &str, id: u64, callback: &WatchFn, value: Value) {
    let callback = Arc::clone(callback);
    let outcome = AssertUnwindSafe(async move { callback(value).await })
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(name, watcher = id, error = %err, "watcher failed"),
        Err(_) => error!(name, watcher = id, "watcher panicked"),
    }
}

#[cfg(test)]
#[path = "tests/hub_tests.rs"]
mod tests;
