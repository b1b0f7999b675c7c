use actix_web::web::Bytes;
use futures::Stream;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

pub const HELLO: &str = "event: hello\ndata: {}\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PatientAdded,
    PatientArchived,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PatientAdded => "patient_added",
            EventType::PatientArchived => "patient_archived",
        }
    }
}

// Event payloads
#[derive(Debug, Serialize, Deserialize)]
pub struct PatientAddedEvent {
    pub id: i32,
    pub profile_id: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PatientArchivedEvent {
    pub stored_id: i32,
}

/// One server-sent event frame.
pub fn format_event<T: Serialize>(event_type: EventType, payload: &T) -> String {
    let data = serde_json::to_string(payload).unwrap_or_else(|e| {
        error!("Failed to serialize {} event: {}", event_type.as_str(), e);
        "{}".to_string()
    });
    format!("event: {}\ndata: {}\n\n", event_type.as_str(), data)
}

struct BrokerInner {
    subscribers: Mutex<HashMap<u64, mpsc::Sender<String>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl BrokerInner {
    fn remove(&self, id: u64) {
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.remove(&id);
    }
}

/// Fan-out of realtime events to every open `/events/patients` stream.
/// Slow subscribers lose messages rather than block publishers.
#[derive(Clone)]
pub struct EventBroker {
    inner: Arc<BrokerInner>,
}

impl EventBroker {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        match self.inner.subscribers.lock() {
            Ok(mut guard) => guard.insert(id, tx),
            Err(poisoned) => poisoned.into_inner().insert(id, tx),
        };
        debug!("Event subscriber {} connected", id);
        Subscription {
            id,
            greeted: false,
            rx,
            broker: self.inner.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        match self.inner.subscribers.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn publish<T: Serialize>(&self, event_type: EventType, payload: &T) {
        let frame = format_event(event_type, payload);
        let targets: Vec<(u64, mpsc::Sender<String>)> = match self.inner.subscribers.lock() {
            Ok(guard) => guard.iter().map(|(id, tx)| (*id, tx.clone())).collect(),
            Err(poisoned) => poisoned.into_inner().iter().map(|(id, tx)| (*id, tx.clone())).collect(),
        };
        for (id, tx) in targets {
            if let Err(e) = tx.try_send(frame.clone()) {
                debug!("Dropped {} event for subscriber {}: {}", event_type.as_str(), id, e);
            }
        }
    }

    pub fn publish_patient_added(&self, id: i32, profile_id: Option<i32>) {
        self.publish(EventType::PatientAdded, &PatientAddedEvent { id, profile_id });
    }

    pub fn publish_patient_archived(&self, stored_id: i32) {
        self.publish(EventType::PatientArchived, &PatientArchivedEvent { stored_id });
    }
}

/// Byte stream for one SSE client. Starts with a `hello` frame and
/// unregisters itself when dropped.
pub struct Subscription {
    id: u64,
    greeted: bool,
    rx: mpsc::Receiver<String>,
    broker: Arc<BrokerInner>,
}

impl Stream for Subscription {
    type Item = Result<Bytes, actix_web::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if !self.greeted {
            self.greeted = true;
            return Poll::Ready(Some(Ok(Bytes::from_static(HELLO.as_bytes()))));
        }
        self.rx.poll_recv(cx).map(|frame| frame.map(|f| Ok(Bytes::from(f))))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broker.remove(self.id);
        debug!("Event subscriber {} disconnected", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn next_frame(sub: &mut Subscription) -> String {
        let bytes = sub.next().await.unwrap().unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn frames_use_sse_layout() {
        let frame = format_event(EventType::PatientAdded, &PatientAddedEvent { id: 4, profile_id: Some(2) });
        assert_eq!(frame, "event: patient_added\ndata: {\"id\":4,\"profile_id\":2}\n\n");
    }

    #[tokio::test]
    async fn subscriber_gets_hello_then_events() {
        let broker = EventBroker::new(8);
        let mut sub = broker.subscribe();
        broker.publish_patient_archived(11);

        assert_eq!(next_frame(&mut sub).await, HELLO);
        assert_eq!(
            next_frame(&mut sub).await,
            "event: patient_archived\ndata: {\"stored_id\":11}\n\n"
        );
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let broker = EventBroker::new(1);
        let mut sub = broker.subscribe();
        broker.publish_patient_added(1, None);
        broker.publish_patient_added(2, None);

        assert_eq!(next_frame(&mut sub).await, HELLO);
        assert!(next_frame(&mut sub).await.contains("\"id\":1"));
        broker.publish_patient_added(3, None);
        assert!(next_frame(&mut sub).await.contains("\"id\":3"));
    }

    #[tokio::test]
    async fn dropping_stream_unsubscribes() {
        let broker = EventBroker::new(4);
        let first = broker.subscribe();
        let _second = broker.subscribe();
        assert_eq!(broker.subscriber_count(), 2);
        drop(first);
        assert_eq!(broker.subscriber_count(), 1);
        broker.publish_patient_added(5, Some(1));
    }
}
