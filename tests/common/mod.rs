#![allow(dead_code)]

use brrtfn::dependencies::{Dependency, Scoped};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Shared record of what dependencies did during a test.
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Arc<AtomicUsize>,
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    /// Plain dependency counting its invocations and returning the count.
    pub fn counter(&self, key: &str) -> Dependency {
        let calls = Arc::clone(&self.calls);
        Dependency::plain_sync(key, move |_| Ok(calls.fetch_add(1, Ordering::SeqCst) + 1))
    }

    /// Scoped dependency recording `open <key>` and `close <key>`.
    pub fn resource(&self, key: &'static str) -> Dependency {
        let recorder = self.clone();
        Dependency::scoped_sync(key, move |_| {
            recorder.calls.fetch_add(1, Ordering::SeqCst);
            recorder.record(format!("open {key}"));
            let closer = recorder.clone();
            Ok(Scoped::with_sync_cleanup(key.to_owned(), move || {
                closer.record(format!("close {key}"));
                Ok(())
            }))
        })
    }

    /// Async scoped dependency that yields before producing its value.
    pub fn async_resource(&self, key: &'static str) -> Dependency {
        let recorder = self.clone();
        Dependency::scoped(key, move |_| {
            let recorder = recorder.clone();
            async move {
                tokio::task::yield_now().await;
                recorder.record(format!("open {key}"));
                let closer = recorder.clone();
                Ok::<_, anyhow::Error>(Scoped::new(key.to_owned(), move || async move {
                    closer.record(format!("close {key}"));
                    Ok::<_, anyhow::Error>(())
                }))
            }
        })
    }
}
