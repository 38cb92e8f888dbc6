//! A minimal saga runner for operations that span the payment processor and the ledger.
//!
//! Each forward step that has an external side effect registers a compensation. When the operation fails, the
//! compensations run in reverse order. A saga that is dropped before it is settled (typically because the caller
//! abandoned the future) spawns its compensations onto the current tokio runtime, so an outstanding hold is never
//! silently leaked.
use std::{future::Future, pin::Pin};

use log::*;

pub type Compensation = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

pub struct Saga {
    name: String,
    compensations: Vec<(String, Compensation)>,
    settled: bool,
}

impl Saga {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into(), compensations: Vec::new(), settled: false }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// The number of compensations currently registered
    pub fn pending_compensations(&self) -> usize {
        self.compensations.len()
    }

    /// Runs a forward step. If it succeeds, `compensate` is called with the step's output to build the future that
    /// undoes it, and that future is held until the saga is settled.
    pub async fn step<T, E, F, C, CF>(&mut self, step: &str, forward: F, compensate: C) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        C: FnOnce(&T) -> CF,
        CF: Future<Output = Result<(), String>> + Send + 'static,
    {
        let output = forward.await?;
        trace!("🔄️ Saga {}: step '{step}' complete", self.name);
        self.compensations.push((step.to_string(), Box::pin(compensate(&output))));
        Ok(output)
    }

    /// The operation succeeded. The registered compensations are discarded.
    pub fn commit(mut self) {
        self.settled = true;
        self.compensations.clear();
        trace!("🔄️ Saga {} committed", self.name);
    }

    /// The operation failed. Runs the registered compensations in reverse order. Failures are logged and do not stop the
    /// remaining compensations from running.
    pub async fn abort(mut self) {
        self.settled = true;
        let compensations = std::mem::take(&mut self.compensations);
        run_compensations(&self.name, compensations).await;
    }

    /// Commits on `Ok`, aborts on `Err`, and hands the result back.
    pub async fn settle<T, E>(self, result: Result<T, E>) -> Result<T, E> {
        match &result {
            Ok(_) => self.commit(),
            Err(_) => self.abort().await,
        }
        result
    }
}

async fn run_compensations(name: &str, compensations: Vec<(String, Compensation)>) {
    for (step, compensation) in compensations.into_iter().rev() {
        match compensation.await {
            Ok(()) => info!("🔄️ Saga {name}: compensated step '{step}'"),
            Err(e) => error!("🔄️ Saga {name}: compensation for '{step}' failed. Manual intervention is required. {e}"),
        }
    }
}

impl Drop for Saga {
    fn drop(&mut self) {
        if self.settled || self.compensations.is_empty() {
            return;
        }
        let compensations = std::mem::take(&mut self.compensations);
        let name = self.name.clone();
        warn!("🔄️ Saga {name} was abandoned with {} outstanding steps. Compensating.", compensations.len());
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { run_compensations(&name, compensations).await });
            },
            Err(_) => {
                error!("🔄️ Saga {name} was abandoned outside a tokio runtime. Its compensations cannot run.");
            },
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Compensation) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = log.clone();
        let make = move |label: &str| {
            let l = l.clone();
            let label = label.to_string();
            Box::pin(async move {
                l.lock().unwrap().push(label);
                Ok(())
            }) as Compensation
        };
        (log, make)
    }

    #[tokio::test]
    async fn abort_runs_compensations_in_reverse() {
        let (log, make) = recorder();
        let mut saga = Saga::new("test");
        let a: Result<u32, String> = saga.step("a", async { Ok(1) }, |_| make("undo a")).await;
        assert_eq!(a.unwrap(), 1);
        let _ = saga.step("b", async { Ok::<_, String>(2) }, |_| make("undo b")).await;
        assert_eq!(saga.pending_compensations(), 2);
        saga.abort().await;
        assert_eq!(*log.lock().unwrap(), vec!["undo b".to_string(), "undo a".to_string()]);
    }

    #[tokio::test]
    async fn failed_steps_register_nothing() {
        let (log, make) = recorder();
        let mut saga = Saga::new("test");
        let r: Result<u32, String> = saga.step("a", async { Err("nope".to_string()) }, |_| make("undo a")).await;
        assert!(r.is_err());
        assert_eq!(saga.pending_compensations(), 0);
        let r = saga.settle(r).await;
        assert!(r.is_err());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_discards_compensations() {
        let (log, make) = recorder();
        let mut saga = Saga::new("test");
        let r = saga.step("a", async { Ok::<_, String>("hold") }, |_| make("undo a")).await;
        let r = saga.settle(r).await;
        assert_eq!(r.unwrap(), "hold");
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn abandoned_saga_compensates() {
        let (log, make) = recorder();
        {
            let mut saga = Saga::new("test");
            let _ = saga.step("a", async { Ok::<_, String>(()) }, |_| make("undo a")).await;
        }
        for _ in 0..50 {
            if !log.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(*log.lock().unwrap(), vec!["undo a".to_string()]);
    }
}
