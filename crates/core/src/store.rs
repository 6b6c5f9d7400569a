//! Persistence boundary for finished decks and scripts.
//!
//! The pipeline never reads or writes the store; callers save its outputs.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    time::SystemTime,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::StoreError,
    types::{Deck, ScriptSet},
};

const DECK_FILE: &str = "deck.json";
const SCRIPTS_FILE: &str = "scripts.json";

/// Opaque identifier of a stored deck.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeckId(Uuid);

impl DeckId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeckId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for DeckId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeckSummary {
    pub id: DeckId,
    pub title: String,
    pub slides: usize,
    pub has_scripts: bool,
    pub saved_at: Option<SystemTime>,
}

#[async_trait]
pub trait DeckStore: Send + Sync {
    async fn save_deck(&self, deck: &Deck) -> Result<DeckId, StoreError>;

    async fn load_deck(&self, id: &DeckId) -> Result<Deck, StoreError>;

    /// Associate scripts with an already stored deck, replacing older ones.
    async fn save_scripts(&self, id: &DeckId, scripts: &ScriptSet) -> Result<(), StoreError>;

    async fn load_scripts(&self, id: &DeckId) -> Result<ScriptSet, StoreError>;

    /// Stored decks, most recently saved first.
    async fn list_decks(&self) -> Result<Vec<DeckSummary>, StoreError>;
}

/// One directory per deck: `<root>/<id>/{deck.json, scripts.json}`.
#[derive(Debug, Clone)]
pub struct FsDeckStore {
    root: PathBuf,
}

pub fn default_store_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("slidewright")
        .join("decks")
}

impl FsDeckStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn deck_dir(&self, id: &DeckId) -> PathBuf {
        self.root.join(id.to_string())
    }
}

impl Default for FsDeckStore {
    fn default() -> Self {
        Self::new(default_store_dir())
    }
}

async fn write_json<T: Serialize + Sync>(path: &Path, value: &T) -> Result<(), StoreError> {
    let pretty_json = serde_json::to_string_pretty(value)?;
    fs::write(path, &pretty_json).await?;
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path, id: &DeckId) -> Result<T, StoreError> {
    let json_content = fs::read_to_string(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => StoreError::NotFound { id: id.to_string() },
        _ => StoreError::IoError(e),
    })?;
    Ok(serde_json::from_str(&json_content)?)
}

#[async_trait]
impl DeckStore for FsDeckStore {
    async fn save_deck(&self, deck: &Deck) -> Result<DeckId, StoreError> {
        let id = DeckId::new();
        let dir = self.deck_dir(&id);
        fs::create_dir_all(&dir).await?;
        write_json(&dir.join(DECK_FILE), deck).await?;
        debug!(%id, path = %dir.display(), "deck saved");
        Ok(id)
    }

    async fn load_deck(&self, id: &DeckId) -> Result<Deck, StoreError> {
        read_json(&self.deck_dir(id).join(DECK_FILE), id).await
    }

    async fn save_scripts(&self, id: &DeckId, scripts: &ScriptSet) -> Result<(), StoreError> {
        let dir = self.deck_dir(id);
        if !fs::try_exists(dir.join(DECK_FILE)).await? {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        write_json(&dir.join(SCRIPTS_FILE), scripts).await
    }

    async fn load_scripts(&self, id: &DeckId) -> Result<ScriptSet, StoreError> {
        read_json(&self.deck_dir(id).join(SCRIPTS_FILE), id).await
    }

    async fn list_decks(&self) -> Result<Vec<DeckSummary>, StoreError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut decks = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<DeckId>().ok())
            else {
                continue;
            };
            let deck_path = entry.path().join(DECK_FILE);
            let deck: Deck = match read_json(&deck_path, &id).await {
                Ok(deck) => deck,
                Err(e) => {
                    warn!(%id, error = %e, "skipping unreadable deck");
                    continue;
                }
            };
            let saved_at = fs::metadata(&deck_path)
                .await
                .ok()
                .and_then(|m| m.modified().ok());

            decks.push(DeckSummary {
                id,
                slides: deck.len(),
                title: deck.title,
                has_scripts: fs::try_exists(entry.path().join(SCRIPTS_FILE))
                    .await
                    .unwrap_or(false),
                saved_at,
            });
        }

        decks.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(decks)
    }
}
