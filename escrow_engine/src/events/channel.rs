//! Stateless pub-sub for engine events.
//!
//! Producers hand events to a bounded channel and move on; a single handler task drains the channel and spawns the
//! (async) hook for each event. Hooks only ever see the event itself, never the ledger, so a slow or failing hook
//! cannot hold up a payment flow.
use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

use log::*;
use tokio::sync::mpsc;

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // Shut down once the last producer is dropped
        drop(self.sender);
        let jobs = Arc::new(AtomicI64::new(0));
        while let Some(ev) = self.listener.recv().await {
            trace!("📬️ Handling event");
            let handler = Arc::clone(&self.handler);
            jobs.fetch_add(1, Ordering::SeqCst);
            let job = jobs.clone();
            tokio::spawn(async move {
                (handler)(ev).await;
                job.fetch_sub(1, Ordering::Relaxed);
                trace!("📬️ Event handled");
            });
        }
        match tokio::spawn(async move {
            while jobs.load(Ordering::SeqCst) > 0 {
                debug!("📬️ Waiting for {} hooks to complete", jobs.load(Ordering::SeqCst));
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        })
        .await
        {
            Ok(_) => {
                debug!("📬️ Event handler shutting down gracefully");
            },
            Err(e) => {
                warn!("📬️ Event handler did not shut down cleanly. {e}");
            },
        }
        debug!("📬️ Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to send event: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        db_types::MinorUnits,
        events::{NotificationEvent, NotificationKind},
    };

    #[tokio::test]
    async fn every_published_event_reaches_the_hook() {
        let _ = env_logger::try_init();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s2 = seen.clone();
        let handler: Handler<NotificationEvent> = Arc::new(move |ev: NotificationEvent| {
            let seen = seen.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                seen.lock().unwrap().push(ev.amount.value());
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let event_handler = EventHandler::new(1, handler);
        let payer = event_handler.subscribe();
        let payee = event_handler.subscribe();
        tokio::spawn(async move {
            for i in 0..5 {
                let ev = NotificationEvent::new(NotificationKind::PaymentAuthorized, vec![], MinorUnits::from(i), "usd");
                payer.publish_event(ev).await;
            }
        });
        tokio::spawn(async move {
            for i in 5..10 {
                let ev = NotificationEvent::new(NotificationKind::PayoutRequested, vec![], MinorUnits::from(i), "usd");
                payee.publish_event(ev).await;
            }
        });
        // Returns once both producers are dropped and all hooks have run
        event_handler.start_handler().await;
        let mut seen = s2.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, (0..10).collect::<Vec<i64>>());
    }
}
