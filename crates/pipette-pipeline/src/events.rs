//! Pipeline event system for observability.
//!
//! The orchestrator emits a [`PipelineEvent`] before and after every stage
//! and around the whole run. Observers subscribe with an
//! [`std::sync::mpsc`] receiver, so loggers and event sinks hook into stage
//! execution without coupling to the engine internals.

use std::sync::mpsc::{self, Receiver, Sender};

use serde::{Deserialize, Serialize};

/// Events emitted during a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    PipelineStarted {
        pipeline_name: String,
        stage_count: usize,
    },
    PipelineCompleted {
        pipeline_name: String,
        completed_stages: Vec<String>,
        duration_ms: u64,
    },
    PipelineFailed {
        pipeline_name: String,
        error: String,
    },
    StageStarted {
        index: usize,
        stage: String,
        stage_type: String,
    },
    StageCompleted {
        index: usize,
        stage: String,
        duration_ms: u64,
    },
    StageFailed {
        index: usize,
        stage: String,
        error: String,
    },
}

/// Fans events out to every subscriber.
#[derive(Debug, Default)]
pub struct EventEmitter {
    subscribers: Vec<Sender<PipelineEvent>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an event to all current subscribers.
    ///
    /// Subscribers whose receiver was dropped are removed.
    pub fn emit(&mut self, event: PipelineEvent) {
        self.subscribers.retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&mut self) -> Receiver<PipelineEvent> {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.push(sender);
        receiver
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitter_sends_and_receives() {
        let mut emitter = EventEmitter::new();
        let rx = emitter.subscribe();

        emitter.emit(PipelineEvent::PipelineStarted {
            pipeline_name: "test".into(),
            stage_count: 3,
        });

        let event = rx.try_recv().unwrap();
        match event {
            PipelineEvent::PipelineStarted {
                pipeline_name,
                stage_count,
            } => {
                assert_eq!(pipeline_name, "test");
                assert_eq!(stage_count, 3);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn multiple_subscribers_receive_same_event() {
        let mut emitter = EventEmitter::new();
        let rx1 = emitter.subscribe();
        let rx2 = emitter.subscribe();
        assert_eq!(emitter.subscriber_count(), 2);

        emitter.emit(PipelineEvent::StageStarted {
            index: 0,
            stage: "first".into(),
            stage_type: "BashCommand".into(),
        });

        assert_eq!(rx1.try_recv().unwrap(), rx2.try_recv().unwrap());
    }

    #[test]
    fn emit_with_dropped_subscriber_does_not_panic() {
        let mut emitter = EventEmitter::new();
        drop(emitter.subscribe());
        emitter.emit(PipelineEvent::PipelineFailed {
            pipeline_name: "oops".into(),
            error: "something went wrong".into(),
        });
        assert_eq!(emitter.subscriber_count(), 0);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut emitter = EventEmitter::new();
        let live = emitter.subscribe();
        drop(emitter.subscribe());
        drop(emitter.subscribe());
        assert_eq!(emitter.subscriber_count(), 3);

        for index in 0..2 {
            emitter.emit(PipelineEvent::StageStarted {
                index,
                stage: "s".into(),
                stage_type: "BashCommand".into(),
            });
        }
        assert_eq!(emitter.subscriber_count(), 1);
        assert_eq!(live.try_iter().count(), 2);
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = PipelineEvent::StageCompleted {
            index: 1,
            stage: "upper".into(),
            duration_ms: 123,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "stage_completed");
        assert_eq!(json["stage"], "upper");

        let back: PipelineEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
