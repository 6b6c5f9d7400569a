use tokio::sync::mpsc;

/// Progress notifications published while a pipeline runs.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    ChunksPlanned {
        total: usize,
        words: usize,
        estimated_tokens: usize,
    },
    ChunkStarted {
        index: usize,
        total: usize,
        attempt: u32,
    },
    ChunkSucceeded {
        index: usize,
        total: usize,
        slides: usize,
    },
    ChunkFailed {
        index: usize,
        total: usize,
        reason: String,
    },
    DeckAssembled {
        slides: usize,
        warnings: usize,
    },
    ScriptGroupsPlanned {
        groups: usize,
        slides: usize,
    },
    ScriptGroupCompleted {
        group: usize,
        total: usize,
        fallback: bool,
    },
}

impl PipelineEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ChunksPlanned { .. } => "ChunksPlanned",
            Self::ChunkStarted { .. } => "ChunkStarted",
            Self::ChunkSucceeded { .. } => "ChunkSucceeded",
            Self::ChunkFailed { .. } => "ChunkFailed",
            Self::DeckAssembled { .. } => "DeckAssembled",
            Self::ScriptGroupsPlanned { .. } => "ScriptGroupsPlanned",
            Self::ScriptGroupCompleted { .. } => "ScriptGroupCompleted",
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<PipelineEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<PipelineEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Optional sender; publishing never blocks and never fails the pipeline.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink(Option<EventSender>);

impl EventSink {
    pub(crate) fn new(sender: Option<EventSender>) -> Self {
        Self(sender)
    }

    pub(crate) fn emit(&self, event: PipelineEvent) {
        tracing::trace!(event = event.event_type(), "pipeline event");
        if let Some(sender) = &self.0 {
            // Receiver gone means nobody is watching progress.
            let _ = sender.send(event);
        }
    }
}
