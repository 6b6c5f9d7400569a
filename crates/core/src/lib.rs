pub mod assembler;
pub mod chunker;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod format;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod scripts;
pub mod store;
pub mod structure;
pub mod types;

pub use client::{ChatCompletionsClient, GenerationBackend, GenerationClient, GenerationRequest};
pub use config::{PipelineConfig, default_config_path};
pub use error::{
    ConfigError, GenerationError, GenerationErrorKind, PipelineError, StoreError, StructureError,
};
pub use events::{EventReceiver, EventSender, PipelineEvent};
pub use format::{format_deck_readable, format_scripts_readable, format_timestamp};
pub use pipeline::{DeckOutcome, Pipeline};
pub use provider::{Provider, ProviderConfig};
pub use scripts::auto_chunk_mode;
pub use store::{DeckId, DeckStore, DeckSummary, FsDeckStore, default_store_dir};
pub use types::{
    Bullet, Chunk, Deck, DeckResponse, DeckSlide, ProcessingMode, RawInput, ScriptMetadata,
    ScriptSet, ScriptUnit, SlideFragment, SlideType, Subject, Tone, VisualSuggestion,
};
