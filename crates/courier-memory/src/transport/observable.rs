use std::fmt;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use courier::transport::{TransportObservable, TransportObserver};
use courier::{RawResponse, Request, ResponseBody, TransportError};
use parking_lot::Mutex;
use tracing::trace;
use uuid::Uuid;

use super::{carries, observed_filters};
use crate::broker::{MemoryBroker, Message};

#[derive(Default)]
struct Listeners {
    subscriptions: Vec<Uuid>,
    observers: Vec<Arc<dyn TransportObserver>>,
}

/// A repeatable subscription on the in-memory broker.
///
/// Every [`TransportObservable::subscribe`] adds broker subscriptions; they
/// are all dropped together by `unsubscribe` or `cancel`.
pub struct MemoryObservable {
    request: Request,
    broker: MemoryBroker,
    canceled: AtomicBool,
    listeners: Mutex<Listeners>,
}

impl MemoryObservable {
    pub(crate) fn new(request: Request, broker: MemoryBroker) -> Self {
        Self {
            request,
            broker,
            canceled: AtomicBool::new(false),
            listeners: Mutex::default(),
        }
    }

    fn release(&self) -> Listeners {
        let listeners = mem::take(&mut *self.listeners.lock());
        for id in &listeners.subscriptions {
            self.broker.unsubscribe(*id);
        }
        listeners
    }
}

impl TransportObservable for MemoryObservable {
    fn request(&self) -> &Request {
        &self.request
    }

    fn subscribe(
        &self,
        observer: Option<Arc<dyn TransportObserver>>,
    ) -> Result<(), TransportError> {
        if self.is_canceled() {
            return Err(TransportError::Canceled);
        }

        let mut subscribed = Vec::new();
        for (filter, keyword) in observed_filters(&self.request) {
            let observer = observer.clone();
            let result = self.broker.subscribe(filter, move |message: &Message| {
                if !carries(message, keyword.as_deref()) {
                    return;
                }
                trace!(topic = %message.topic, "message observed");
                if let Some(observer) = &observer {
                    observer.on_response(RawResponse::new(
                        keyword.clone(),
                        ResponseBody::new(message.topic.clone(), message.payload.clone()),
                    ));
                }
            });
            match result {
                Ok(id) => subscribed.push(id),
                Err(error) => {
                    for id in subscribed {
                        self.broker.unsubscribe(id);
                    }
                    return Err(error.into());
                }
            }
        }

        let mut listeners = self.listeners.lock();
        listeners.subscriptions.extend(subscribed);
        listeners.observers.extend(observer);
        Ok(())
    }

    fn unsubscribe(&self) -> Result<(), TransportError> {
        let released = self.release();
        trace!(
            subscriptions = released.subscriptions.len(),
            "unsubscribed"
        );
        Ok(())
    }

    fn cancel(&self) {
        if self.canceled.swap(true, Ordering::AcqRel) {
            return;
        }
        for observer in self.release().observers {
            observer.on_failure(TransportError::Canceled);
        }
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }
}

impl fmt::Debug for MemoryObservable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryObservable")
            .field("request", &self.request)
            .field("subscriptions", &self.listeners.lock().subscriptions.len())
            .field("canceled", &self.is_canceled())
            .finish()
    }
}
