//! Consumer supervision
//!
//! Runs every registered consumer on its own task, all driven by one shared
//! cancellation token, and provides a single `stop` that cancels them and
//! waits until each one has returned.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::consumer::RunnableConsumer;

struct RunningConsumer {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct State {
    consumers: HashMap<String, Arc<dyn RunnableConsumer>>,
    running: HashMap<String, RunningConsumer>,
    /// Unregistered while running, still awaited by `stop`
    retired: Vec<(String, JoinHandle<()>)>,
    stopped: bool,
}

pub struct ConsumerSupervisor {
    state: Mutex<State>,
    cancel: CancellationToken,
}

impl ConsumerSupervisor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            cancel: CancellationToken::new(),
        }
    }

    /// Register a consumer under its name.
    ///
    /// A consumer registered under a name that is already running only
    /// replaces the stored instance; the running task keeps going.
    pub fn register(&self, consumer: Arc<dyn RunnableConsumer>) {
        let name = consumer.name().to_string();
        if let Ok(mut state) = self.state.lock() {
            if state.consumers.insert(name.clone(), consumer).is_some() {
                debug!(consumer = %name, "Replaced registered consumer");
            }
        }
    }

    /// Remove a consumer; a running one is cancelled and awaited by `stop`
    pub fn unregister(&self, name: &str) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };

        let removed = state.consumers.remove(name).is_some();
        if let Some(running) = state.running.remove(name) {
            running.cancel.cancel();
            state.retired.push((name.to_string(), running.handle));
        }

        if removed {
            info!(consumer = %name, "Consumer unregistered");
        }
        removed
    }

    /// Spawn every registered consumer that is not running yet.
    ///
    /// Returns how many were started.
    pub fn start_all(&self) -> usize {
        let Ok(mut state) = self.state.lock() else {
            return 0;
        };

        if state.stopped {
            warn!("Supervisor already stopped, not starting consumers");
            return 0;
        }

        let pending: Vec<(String, Arc<dyn RunnableConsumer>)> = state
            .consumers
            .iter()
            .filter(|(name, _)| !state.running.contains_key(*name))
            .map(|(name, consumer)| (name.clone(), consumer.clone()))
            .collect();

        for (name, consumer) in &pending {
            let cancel = self.cancel.child_token();
            let token = cancel.clone();
            let consumer = consumer.clone();
            let handle = tokio::spawn(async move { consumer.run(token).await });

            info!(consumer = %name, "Consumer started");
            state
                .running
                .insert(name.clone(), RunningConsumer { handle, cancel });
        }

        pending.len()
    }

    /// Cancel all consumers and wait for every task to return.
    ///
    /// Calling it again is a no-op.
    pub async fn stop(&self) {
        let handles: Vec<(String, JoinHandle<()>)> = match self.state.lock() {
            Ok(mut state) => {
                state.stopped = true;
                let mut handles: Vec<(String, JoinHandle<()>)> = state
                    .running
                    .drain()
                    .map(|(name, running)| (name, running.handle))
                    .collect();
                handles.append(&mut state.retired);
                handles
            }
            Err(_) => Vec::new(),
        };

        self.cancel.cancel();

        if handles.is_empty() {
            return;
        }

        info!("Stopping {} consumer(s)", handles.len());
        for (name, handle) in handles {
            if let Err(e) = handle.await {
                error!(consumer = %name, error = %e, "Consumer task failed");
            }
        }
        info!("All consumers stopped");
    }

    /// Names of consumers that have been started and not stopped
    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = match self.state.lock() {
            Ok(state) => state.running.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for ConsumerSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct IdleConsumer {
        name: String,
        finished: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RunnableConsumer for IdleConsumer {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self, cancel: CancellationToken) {
            cancel.cancelled().await;
            // Simulate releasing broker handles after cancellation
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn idle(name: &str, finished: &Arc<AtomicUsize>) -> Arc<dyn RunnableConsumer> {
        Arc::new(IdleConsumer {
            name: name.to_string(),
            finished: finished.clone(),
        })
    }

    #[tokio::test]
    async fn test_stop_waits_for_every_consumer() {
        let finished = Arc::new(AtomicUsize::new(0));
        let supervisor = ConsumerSupervisor::new();

        supervisor.register(idle("friend", &finished));
        supervisor.register(idle("team", &finished));

        assert_eq!(supervisor.start_all(), 2);
        assert_eq!(supervisor.running(), vec!["friend", "team"]);

        supervisor.stop().await;

        assert_eq!(finished.load(Ordering::SeqCst), 2);
        assert!(supervisor.running().is_empty());
        assert!(supervisor.is_stopped());

        // Idempotent
        supervisor.stop().await;
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_start_all_skips_running_consumers() {
        let finished = Arc::new(AtomicUsize::new(0));
        let supervisor = ConsumerSupervisor::new();

        supervisor.register(idle("friend", &finished));
        assert_eq!(supervisor.start_all(), 1);

        supervisor.register(idle("team", &finished));
        assert_eq!(supervisor.start_all(), 1);
        assert_eq!(supervisor.start_all(), 0);

        supervisor.stop().await;
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_replacing_registered_consumer() {
        let finished = Arc::new(AtomicUsize::new(0));
        let supervisor = ConsumerSupervisor::new();

        supervisor.register(idle("friend", &finished));
        supervisor.register(idle("friend", &finished));

        // Should still be only one consumer
        assert_eq!(supervisor.start_all(), 1);
        supervisor.stop().await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unregister_running_consumer() {
        let finished = Arc::new(AtomicUsize::new(0));
        let supervisor = ConsumerSupervisor::new();

        supervisor.register(idle("friend", &finished));
        supervisor.register(idle("team", &finished));
        supervisor.start_all();

        assert!(supervisor.unregister("friend"));
        assert!(!supervisor.unregister("friend"));
        assert_eq!(supervisor.running(), vec!["team"]);

        supervisor.stop().await;
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_start_after_stop() {
        let finished = Arc::new(AtomicUsize::new(0));
        let supervisor = ConsumerSupervisor::new();

        supervisor.stop().await;
        supervisor.register(idle("friend", &finished));

        assert_eq!(supervisor.start_all(), 0);
        assert!(supervisor.running().is_empty());
    }
}
