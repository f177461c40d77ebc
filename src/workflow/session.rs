use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use super::traits::CaptureEngine;
use super::types::{CaptureState, FeedbackSet};
use crate::telemetry::create_session_span;

/// Engine output forwarded to the workflow's coordinator task.
#[derive(Debug, Clone)]
pub(crate) enum EngineEvent {
    State(CaptureState),
    Feedback(FeedbackSet),
}

/// An engine event tagged with the epoch of the session that produced it.
#[derive(Debug, Clone)]
pub(crate) struct EngineDispatch {
    pub epoch: u64,
    pub event: EngineEvent,
}

/// A capture engine handle together with the listener tasks reading its
/// streams. Dropping the session cancels the listeners.
pub(crate) struct CaptureSession {
    pub engine: Arc<dyn CaptureEngine>,
    pub epoch: u64,
    pub session_id: Uuid,
    listeners: [JoinHandle<()>; 2],
}

impl CaptureSession {
    pub fn attach(
        engine: Arc<dyn CaptureEngine>,
        epoch: u64,
        session_id: Uuid,
        state_updates: broadcast::Receiver<CaptureState>,
        feedback_updates: broadcast::Receiver<FeedbackSet>,
        dispatch: mpsc::UnboundedSender<EngineDispatch>,
    ) -> Self {
        let span = create_session_span(&session_id, epoch);

        let state_listener = tokio::spawn(
            forward(
                state_updates,
                epoch,
                dispatch.clone(),
                EngineEvent::State,
                "state",
            )
            .instrument(span.clone()),
        );
        let feedback_listener = tokio::spawn(
            forward(
                feedback_updates,
                epoch,
                dispatch,
                EngineEvent::Feedback,
                "feedback",
            )
            .instrument(span),
        );

        Self {
            engine,
            epoch,
            session_id,
            listeners: [state_listener, feedback_listener],
        }
    }

    /// Requests both listeners to stop. Safe to call more than once.
    pub fn cancel_listeners(&self) {
        for listener in &self.listeners {
            listener.abort();
        }
    }

    /// Cancels the listeners and waits until their tasks are gone, so the
    /// engine's streams have no subscribers left from this session.
    pub async fn shutdown(&mut self) {
        self.cancel_listeners();
        for listener in &mut self.listeners {
            // Cancelled, or already finished after the stream closed.
            let _ = listener.await;
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.cancel_listeners();
    }
}

async fn forward<T: Clone>(
    mut updates: broadcast::Receiver<T>,
    epoch: u64,
    dispatch: mpsc::UnboundedSender<EngineDispatch>,
    wrap: fn(T) -> EngineEvent,
    stream: &'static str,
) {
    loop {
        match updates.recv().await {
            Ok(update) => {
                let event = EngineDispatch {
                    epoch,
                    event: wrap(update),
                };
                if dispatch.send(event).is_err() {
                    debug!(stream, "Workflow gone, stopping listener");
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(stream, skipped, "Capture engine updates lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(stream, "Capture engine stream closed");
                break;
            }
        }
    }
}
