//! Housekeeping
//!
//! `check_clock` runs the application's `__clock` handler under the global
//! lock and persists the GlobalVars it returns. The ticker runs it on a
//! fixed interval, followed by poll delivery for every session.

use chrono::Utc;
use serde_json::Value;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::Hub;
use crate::event::{clone_event, Event, CONN, SESSION};
use crate::session::CLIENT_CHANNEL;
use crate::store::{format_timestamp, parse_timestamp, StoreResult};

/// System event for periodic maintenance
pub const CLOCK_EVENT: &str = "__clock";
/// Key of the GlobalVars bag on a `__clock` event
pub const GLOBAL_VARS: &str = "globalVars";
/// GlobalVars entry holding the previous tick
pub const LAST_TICK: &str = "_lastTick";

impl Hub {
    /// One housekeeping pass. Returns `Ok(false)` when another holder had
    /// the global lock and the pass was skipped.
    pub async fn check_clock(&self) -> StoreResult<bool> {
        let store = self.store();
        if !store.lock_global_vars().await? {
            tracing::debug!("Global vars locked elsewhere, skipping tick");
            return Ok(false);
        }

        let outcome = self.run_clock().await;
        let released = store.unlock_global_vars().await;
        outcome?;
        released?;
        Ok(true)
    }

    async fn run_clock(&self) -> StoreResult<()> {
        let store = self.store();
        let mut vars = store.read_global_vars().await?;

        let tick = format_timestamp(Utc::now());
        let last_tick = vars
            .remove(LAST_TICK)
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|raw| parse_timestamp(raw).is_some())
            .unwrap_or_else(|| tick.clone());

        let request = Event::new(CLOCK_EVENT)
            .with("tick", tick.clone())
            .with("lastTick", last_tick)
            .with(GLOBAL_VARS, Value::Object(vars.clone()));
        let reply = self.trigger(request).await;

        let mut updated = match reply.get(GLOBAL_VARS) {
            Some(Value::Object(returned)) => returned.clone(),
            _ => vars,
        };
        updated.insert(LAST_TICK.to_string(), Value::String(tick));
        store.write_global_vars(&updated).await
    }

    /// Housekeeping followed by poll delivery to every session. Returns the
    /// number of frames emitted.
    pub async fn tick(&self) -> usize {
        if let Err(e) = self.check_clock().await {
            tracing::warn!(error = %e, "Housekeeping failed");
        }

        let sessions = self.sessions().await;
        let mut emitted = 0;
        for session in &sessions {
            let events = self
                .receive(Vec::new(), &session.session_data, false)
                .await;
            for event in &events {
                let payload = clone_event(event, &[SESSION, CONN]).to_value();
                emitted += session
                    .conn
                    .iter()
                    .filter(|socket| socket.emit(CLIENT_CHANNEL, payload.clone()).is_ok())
                    .count();
            }
        }
        emitted
    }

    /// Spawn the background ticker. It stops after [`Hub::shutdown`].
    pub fn start(&self) -> JoinHandle<()> {
        let hub = self.clone();
        let period = Duration::from_millis(self.config().tick_interval_ms.max(1));

        tokio::spawn(async move {
            tracing::info!(interval_ms = period.as_millis() as u64, "Hub ticker started");
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if hub.is_shutdown().await {
                    break;
                }
                let emitted = hub.tick().await;
                if emitted > 0 {
                    tracing::debug!(emitted, "Poll delivery");
                }
            }

            tracing::info!("Hub ticker stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Fields;
    use crate::hub::{HubConfig, RECEIVE_EVENT};
    use crate::session::Socket;
    use crate::store::{GlobalStore, MemoryStore, SqliteStore};
    use crate::trigger::{HandlerContext, HandlerFuture, Tier};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    /// `__clock` handler that bumps `globalVars.count`
    fn counting_clock(
        calls: Arc<AtomicUsize>,
    ) -> impl Fn(Event, HandlerContext) -> HandlerFuture + Send + Sync + 'static {
        move |mut ev: Event, _ctx: HandlerContext| -> HandlerFuture {
            let calls = Arc::clone(&calls);
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                let mut vars = ev.get_object(GLOBAL_VARS)?.clone();
                let count = vars.get("count").and_then(Value::as_i64).unwrap_or(0);
                vars.insert("count".to_string(), json!(count + 1));
                ev.set(GLOBAL_VARS, Value::Object(vars));
                Ok::<Event, anyhow::Error>(ev)
            })
        }
    }

    #[tokio::test]
    async fn test_clock_persists_global_vars() {
        let store = Arc::new(MemoryStore::new());
        let hub = Hub::new(HubConfig::default(), store.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        hub.on(Tier::Api, CLOCK_EVENT, counting_clock(calls.clone()))
            .await;

        assert!(hub.check_clock().await.unwrap());
        assert!(hub.check_clock().await.unwrap());

        let vars = store.read_global_vars().await.unwrap();
        assert_eq!(vars["count"], json!(2));
        let last = vars[LAST_TICK].as_str().unwrap();
        assert!(parse_timestamp(last).is_some());
        assert!(!store.is_locked());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_last_tick_defaults_to_tick() {
        let hub = Hub::new(HubConfig::default(), Arc::new(MemoryStore::new()));
        let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        hub.on(Tier::Api, CLOCK_EVENT, move |ev: Event, _ctx| {
            let log = Arc::clone(&log);
            async move {
                let tick = ev.get_str("tick")?.to_string();
                let last = ev.get_str("lastTick")?.to_string();
                let has_marker = ev.get_object(GLOBAL_VARS)?.contains_key(LAST_TICK);
                log.lock().await.push((tick, last, has_marker));
                Ok(ev)
            }
        })
        .await;

        hub.check_clock().await.unwrap();
        hub.check_clock().await.unwrap();

        let seen = seen.lock().await;
        assert_eq!(seen[0].0, seen[0].1);
        assert!(!seen[0].2);
        // second tick sees the first one as lastTick
        assert_eq!(seen[1].1, seen[0].0);
        assert!(!seen[1].2);
    }

    #[tokio::test]
    async fn test_clock_without_handler_still_records_tick() {
        let mut initial = Fields::new();
        initial.insert("keep".to_string(), json!("me"));
        let store = Arc::new(MemoryStore::with_vars(initial));
        let hub = Hub::new(HubConfig::default(), store.clone());

        assert!(hub.check_clock().await.unwrap());

        let vars = store.read_global_vars().await.unwrap();
        assert_eq!(vars["keep"], json!("me"));
        assert!(vars.contains_key(LAST_TICK));
    }

    #[tokio::test]
    async fn test_concurrent_clocks_never_interleave() {
        let hub = Hub::new(HubConfig::default(), Arc::new(MemoryStore::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        hub.on(Tier::Api, CLOCK_EVENT, counting_clock(calls.clone()))
            .await;

        let (a, b) = tokio::join!(hub.check_clock(), hub.check_clock());

        let ran = [a.unwrap(), b.unwrap()];
        assert_eq!(ran.iter().filter(|r| **r).count(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clock_skips_when_other_process_holds_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.db");
        let other = SqliteStore::open(&path, "", 60).unwrap();
        let ours = Arc::new(SqliteStore::open(&path, "", 60).unwrap());
        let hub = Hub::new(HubConfig::default(), ours);

        assert!(other.lock_global_vars().await.unwrap());
        assert!(!hub.check_clock().await.unwrap());

        other.unlock_global_vars().await.unwrap();
        assert!(hub.check_clock().await.unwrap());
    }

    #[tokio::test]
    async fn test_tick_delivers_queued_events() {
        let hub = Hub::new(HubConfig::default(), Arc::new(MemoryStore::new()));
        hub.on(Tier::Api, RECEIVE_EVENT, |mut ev: Event, _ctx| async move {
            ev.set("eventQueue", json!([{"type": "notify", "_session": {"x": 1}}]));
            Ok(ev)
        })
        .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let socket = Socket::new(tx);
        hub.connect(&socket).await.unwrap();

        assert_eq!(hub.tick().await, 1);
        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.payload, json!({"type": "notify"}));
    }

    #[tokio::test]
    async fn test_ticker_runs_until_shutdown() {
        let config = HubConfig {
            tick_interval_ms: 10,
            ..HubConfig::default()
        };
        let hub = Hub::new(config, Arc::new(MemoryStore::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        hub.on(Tier::Api, CLOCK_EVENT, counting_clock(calls.clone()))
            .await;

        let handle = hub.start();
        tokio::time::sleep(Duration::from_millis(120)).await;
        hub.shutdown().await;

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(calls.load(Ordering::SeqCst) >= 1);
    }
}
