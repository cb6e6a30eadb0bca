//! Preview host - owns the isolated surface and relays its diagnostics.

use crate::message::{DiagnosticMessage, MessageInbox};
use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, trace};

/// An isolated execution surface (an iframe `srcdoc` equivalent).
///
/// `load` replaces whatever the surface was running with the given document.
/// Failures of the previewed code itself are not errors here; they reach the
/// host as messages on the surface's [`MessagePort`](crate::MessagePort).
#[async_trait(?Send)]
pub trait PreviewSurface {
    async fn load(&mut self, document: &str) -> Result<()>;
}

/// Destination for relayed diagnostics (the log console).
pub trait LogSink {
    fn record(&mut self, message: &DiagnosticMessage);
}

/// Keeps relayed lines in memory, formatted as `[kind] text`.
#[derive(Debug, Default, Clone)]
pub struct MemoryLog {
    lines: Vec<String>,
}

impl MemoryLog {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl LogSink for MemoryLog {
    fn record(&mut self, message: &DiagnosticMessage) {
        self.lines.push(message.to_string());
    }
}

type Handler = Box<dyn FnMut(&DiagnosticMessage)>;

pub struct PreviewHost<S> {
    surface: S,
    inbox: MessageInbox,
    sink: Box<dyn LogSink>,
    handlers: Vec<Handler>,
}

impl<S: PreviewSurface> PreviewHost<S> {
    /// `inbox` must be the receiving half of the port given to `surface`.
    pub fn new(surface: S, inbox: MessageInbox, sink: Box<dyn LogSink>) -> Self {
        Self {
            surface,
            inbox,
            sink,
            handlers: Vec::new(),
        }
    }

    /// Load a composed document, replacing the previous context.
    ///
    /// Messages already queued from the old context are relayed first so
    /// arrival order is kept; messages produced while loading are relayed
    /// before returning.
    pub async fn load(&mut self, document: &str) -> Result<()> {
        self.relay();
        debug!(bytes = document.len(), "loading preview document");
        self.surface.load(document).await?;
        self.relay();
        Ok(())
    }

    /// Subscribe to validated diagnostics.
    pub fn on_message(&mut self, handler: impl FnMut(&DiagnosticMessage) + 'static) {
        self.handlers.push(Box::new(handler));
    }

    /// Drain the inbox, dispatching every well-formed message in arrival
    /// order. Returns how many were dispatched.
    pub fn relay(&mut self) -> usize {
        let mut dispatched = 0;
        while let Some(raw) = self.inbox.try_next() {
            let Some(message) = DiagnosticMessage::from_value(&raw) else {
                trace!(%raw, "ignoring unrecognized message");
                continue;
            };
            self.dispatch(&message);
            dispatched += 1;
        }
        dispatched
    }

    fn dispatch(&mut self, message: &DiagnosticMessage) {
        self.sink.record(message);
        for handler in &mut self.handlers {
            handler(message);
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }
}
