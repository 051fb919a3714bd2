use std::fmt;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use courier::transport::{TransportCall, TransportCallback};
use courier::{RawResponse, Request, ResponseBody, TransportError};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::{carries, filters, message};
use crate::broker::{MemoryBroker, Message, WeakBroker};

/// State of an enqueued exchange, shared with its subscription handlers and
/// timer.
#[derive(Default)]
struct Exchange {
    callback: Option<Box<dyn TransportCallback>>,
    subscriptions: Vec<Uuid>,
    timer: Option<CancellationToken>,
}

impl Exchange {
    /// Take the pending callback and release everything the exchange holds.
    ///
    /// Returns `None` once the exchange has completed.
    fn finish(exchange: &Mutex<Self>, broker: &WeakBroker) -> Option<Box<dyn TransportCallback>> {
        let mut state = exchange.lock();
        let callback = state.callback.take()?;
        let subscriptions = mem::take(&mut state.subscriptions);
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        drop(state);

        if let Some(broker) = broker.upgrade() {
            for id in subscriptions {
                broker.unsubscribe(id);
            }
        }
        Some(callback)
    }
}

/// A single exchange on the in-memory broker.
///
/// Enqueuing subscribes to the request's response filters, publishes the
/// request and completes with the first message carrying the keyword. A
/// request that listens on nothing completes with an empty acknowledgement as
/// soon as it is published.
pub struct MemoryCall {
    request: Request,
    broker: MemoryBroker,
    runtime: Option<Handle>,
    canceled: AtomicBool,
    exchange: Arc<Mutex<Exchange>>,
}

impl MemoryCall {
    pub(crate) fn new(request: Request, broker: MemoryBroker, runtime: Option<Handle>) -> Self {
        Self {
            request,
            broker,
            runtime,
            canceled: AtomicBool::new(false),
            exchange: Arc::default(),
        }
    }

    fn listen(&self, filter: &str, keyword: Option<String>) -> Result<(), TransportError> {
        let exchange = Arc::clone(&self.exchange);
        let broker = self.broker.downgrade();

        let id = self.broker.subscribe(filter, move |message: &Message| {
            if !carries(message, keyword.as_deref()) {
                return;
            }
            if let Some(callback) = Exchange::finish(&exchange, &broker) {
                trace!(topic = %message.topic, "response received");
                callback.on_response(RawResponse::new(
                    keyword.clone(),
                    ResponseBody::new(message.topic.clone(), message.payload.clone()),
                ));
            }
        })?;

        let mut state = self.exchange.lock();
        if state.callback.is_some() {
            state.subscriptions.push(id);
        } else {
            // Already answered by a retained message.
            drop(state);
            self.broker.unsubscribe(id);
        }
        Ok(())
    }

    fn arm_timer(&self) {
        let timeout = self.request.timeout();
        if timeout.is_zero() {
            return;
        }
        let Some(runtime) = &self.runtime else {
            warn!(topic = self.request.topic(), "no tokio runtime, response timeout disabled");
            return;
        };

        let token = CancellationToken::new();
        {
            let mut state = self.exchange.lock();
            if state.callback.is_none() {
                return;
            }
            state.timer = Some(token.clone());
        }

        let exchange = Arc::clone(&self.exchange);
        let broker = self.broker.downgrade();
        let topic = self.request.topic().to_string();
        runtime.spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(timeout) => {
                    if let Some(callback) = Exchange::finish(&exchange, &broker) {
                        debug!(%topic, ?timeout, "no response in time");
                        callback.on_failure(TransportError::Timeout(timeout));
                    }
                }
            }
        });
    }

    fn fail(&self, error: TransportError) {
        if let Some(callback) = Exchange::finish(&self.exchange, &self.broker.downgrade()) {
            callback.on_failure(error);
        }
    }
}

impl TransportCall for MemoryCall {
    fn request(&self) -> &Request {
        &self.request
    }

    fn publish(&self) -> Result<(), TransportError> {
        if self.is_canceled() {
            return Err(TransportError::Canceled);
        }
        let receivers = self.broker.publish(message(&self.request))?;
        debug!(topic = self.request.topic(), receivers, "published request");
        Ok(())
    }

    fn enqueue(&self, callback: Box<dyn TransportCallback>) {
        if self.is_canceled() {
            callback.on_failure(TransportError::Canceled);
            return;
        }

        let filters = filters(&self.request);
        if filters.is_empty() {
            match self.publish() {
                Ok(()) => callback.on_response(RawResponse::new(
                    None,
                    ResponseBody::new(self.request.topic(), Bytes::new()),
                )),
                Err(error) => callback.on_failure(error),
            }
            return;
        }

        self.exchange.lock().callback = Some(callback);

        for (filter, keyword) in filters {
            if let Err(error) = self.listen(&filter, keyword) {
                self.fail(error);
                return;
            }
        }

        self.arm_timer();

        if !self.request.topic().is_empty() {
            if let Err(error) = self.publish() {
                self.fail(error);
            }
        }
    }

    fn cancel(&self) {
        if self.canceled.swap(true, Ordering::AcqRel) {
            return;
        }
        trace!(topic = self.request.topic(), "call canceled");
        self.fail(TransportError::Canceled);
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }
}

impl fmt::Debug for MemoryCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCall")
            .field("request", &self.request)
            .field("canceled", &self.is_canceled())
            .finish_non_exhaustive()
    }
}
