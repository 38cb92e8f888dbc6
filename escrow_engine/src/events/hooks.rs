use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::{
    events::{EventHandler, EventProducer, Handler, NotificationEvent},
    traits::Notifier,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub notification_producer: Vec<EventProducer<NotificationEvent>>,
}

impl EventProducers {
    /// Fire-and-forget. A full or closed channel is logged by the producer and otherwise ignored.
    pub async fn notify(&self, event: NotificationEvent) {
        for emitter in &self.notification_producer {
            trace!("📬️ Publishing {:?} to {} recipients", event.kind, event.recipients.len());
            emitter.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_notification: Option<EventHandler<NotificationEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_notification = hooks.on_notification.map(|f| EventHandler::new(buffer_size, f));
        Self { on_notification }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_notification {
            result.notification_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_notification {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_notification: Option<Handler<NotificationEvent>>,
}

impl EventHooks {
    pub fn on_notification<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(NotificationEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_notification = Some(Arc::new(f));
        self
    }

    /// Routes every notification event to `notifier`. Delivery failures are logged and dropped.
    pub fn with_notifier(&mut self, notifier: Arc<dyn Notifier>) -> &mut Self {
        self.on_notification(move |event: NotificationEvent| {
            let notifier = Arc::clone(&notifier);
            Box::pin(async move {
                let notification = event.to_notification();
                if let Err(e) = notifier.send(notification).await {
                    warn!("📬️ Could not deliver {} notification. {e}", event.kind.tag());
                }
            })
        })
    }
}
