//! Process-wide, read-only state shared by every frame of a run.

use std::sync::Arc;

use crate::approval::broker::ApprovalBroker;
use crate::cancel::CancelSignal;
use crate::config::settings::RuntimeSettings;
use crate::events::{EventSink, NullSink};

use super::model::Model;

/// Built once before a run and never mutated by it. Clones share the same
/// broker, model, sink and cancel signal.
#[derive(Clone)]
pub struct RuntimeContext {
    settings: Arc<RuntimeSettings>,
    broker: Arc<ApprovalBroker>,
    model: Arc<dyn Model>,
    sink: Arc<dyn EventSink>,
    cancel: CancelSignal,
}

impl std::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("settings", &self.settings)
            .field("broker", &self.broker)
            .finish_non_exhaustive()
    }
}

impl RuntimeContext {
    pub fn new(settings: RuntimeSettings, model: Arc<dyn Model>) -> Self {
        let sink: Arc<dyn EventSink> = Arc::new(NullSink);
        Self {
            settings: Arc::new(settings),
            broker: Arc::new(ApprovalBroker::new(sink.clone())),
            model,
            sink,
            cancel: CancelSignal::never(),
        }
    }

    /// Route events to `sink`. Replaces the broker so approval events reach
    /// the same sink; call before [`RuntimeContext::with_broker`].
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.broker = Arc::new(ApprovalBroker::new(sink.clone()));
        self.sink = sink;
        self
    }

    pub fn with_broker(mut self, broker: Arc<ApprovalBroker>) -> Self {
        self.broker = broker;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub fn broker(&self) -> &Arc<ApprovalBroker> {
        &self.broker
    }

    pub fn model(&self) -> &Arc<dyn Model> {
        &self.model
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    pub fn cancel(&self) -> &CancelSignal {
        &self.cancel
    }
}
