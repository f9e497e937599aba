use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::library::{Metadata, Playlist, TrackRef};

pub type MetadataMap = IndexMap<TrackRef, Metadata>;

const FAVORITES_FIELD: &str = "favoritePlaylist";
const METADATA_FIELD: &str = "metadata";
const PLAYLISTS_FIELD: &str = "playlists";

/// The single durable record, stored as one JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedDocument {
    #[serde(default)]
    pub favorite_playlist: Vec<TrackRef>,
    #[serde(default)]
    pub metadata: MetadataMap,
    /// User-defined playlists only.
    #[serde(default)]
    pub playlists: Vec<Playlist>,
    /// Fields written by other tooling, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PersistedDocument {
    /// Parses stored JSON. Anything unreadable becomes the empty document;
    /// a single mistyped field only loses that field.
    pub fn parse(raw: &str) -> Self {
        let value = match serde_json::from_str::<Value>(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "stored document is not valid JSON, starting empty");
                return Self::default();
            }
        };
        let Value::Object(mut fields) = value else {
            warn!("stored document is not a JSON object, starting empty");
            return Self::default();
        };

        Self {
            favorite_playlist: take_field(&mut fields, FAVORITES_FIELD),
            metadata: take_field(&mut fields, METADATA_FIELD),
            playlists: take_field(&mut fields, PLAYLISTS_FIELD),
            extra: fields,
        }
    }

    pub fn user_playlist(&self, name: &str) -> Option<&Playlist> {
        self.playlists.iter().find(|p| p.name == name)
    }

    pub fn user_playlist_mut(&mut self, name: &str) -> Option<&mut Playlist> {
        self.playlists.iter_mut().find(|p| p.name == name)
    }
}

fn take_field<T: DeserializeOwned + Default>(fields: &mut Map<String, Value>, name: &str) -> T {
    match fields.remove(name) {
        None | Some(Value::Null) => T::default(),
        Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
            warn!(field = name, error = %e, "ignoring malformed document field");
            T::default()
        }),
    }
}

/// Metadata changes made by one writer, replayed onto whatever map is
/// stored at write time. Entries another writer added or removed meanwhile
/// are left as they are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataEdit {
    pub upserts: MetadataMap,
    pub removals: Vec<TrackRef>,
}

impl MetadataEdit {
    pub fn upsert(track: TrackRef, metadata: Metadata) -> Self {
        let mut upserts = MetadataMap::new();
        upserts.insert(track, metadata);
        Self {
            upserts,
            removals: Vec::new(),
        }
    }

    pub fn remove(track: TrackRef) -> Self {
        Self {
            upserts: MetadataMap::new(),
            removals: vec![track],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removals.is_empty()
    }

    /// Folds a later edit into this one. For a track touched by both, the
    /// later change wins.
    pub fn then(mut self, later: MetadataEdit) -> Self {
        for track in later.removals {
            self.upserts.shift_remove(&track);
            if !self.removals.contains(&track) {
                self.removals.push(track);
            }
        }
        for (track, metadata) in later.upserts {
            self.removals.retain(|t| t != &track);
            self.upserts.insert(track, metadata);
        }
        self
    }

    /// Removals first, then upserts for tracks without a stored entry.
    pub fn apply_to(self, map: &mut MetadataMap) {
        for track in &self.removals {
            map.shift_remove(track);
        }
        for (track, metadata) in self.upserts {
            map.entry(track).or_insert(metadata);
        }
    }
}

/// A partial document. `None` fields are left as currently stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPatch {
    pub favorite_playlist: Option<Vec<TrackRef>>,
    pub metadata: Option<MetadataMap>,
    pub metadata_edit: Option<MetadataEdit>,
    pub playlists: Option<Vec<Playlist>>,
}

impl DocumentPatch {
    pub fn favorites(favorites: Vec<TrackRef>) -> Self {
        Self {
            favorite_playlist: Some(favorites),
            ..Self::default()
        }
    }

    pub fn metadata(metadata: MetadataMap) -> Self {
        Self {
            metadata: Some(metadata),
            ..Self::default()
        }
    }

    pub fn metadata_edit(edit: MetadataEdit) -> Self {
        Self {
            metadata_edit: Some(edit),
            ..Self::default()
        }
    }

    pub fn playlists(playlists: Vec<Playlist>) -> Self {
        Self {
            playlists: Some(playlists),
            ..Self::default()
        }
    }

    pub fn with_favorites(mut self, favorites: Vec<TrackRef>) -> Self {
        self.favorite_playlist = Some(favorites);
        self
    }

    pub fn with_playlists(mut self, playlists: Vec<Playlist>) -> Self {
        self.playlists = Some(playlists);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.favorite_playlist.is_none()
            && self.metadata.is_none()
            && self.metadata_edit.is_none()
            && self.playlists.is_none()
    }

    /// Tracks this patch would add to the stored metadata.
    pub fn pending_upserts(&self) -> impl Iterator<Item = &TrackRef> {
        self.metadata_edit.iter().flat_map(|edit| edit.upserts.keys())
    }

    /// Combines a pending patch with a newer one. Whole fields in `later`
    /// replace ours; metadata edits accumulate.
    pub fn then(self, later: DocumentPatch) -> Self {
        let metadata_edit = match (self.metadata_edit, later.metadata_edit) {
            (Some(earlier), Some(later)) => Some(earlier.then(later)),
            (earlier, later) => later.or(earlier),
        };
        Self {
            favorite_playlist: later.favorite_playlist.or(self.favorite_playlist),
            metadata: later.metadata.or(self.metadata),
            metadata_edit,
            playlists: later.playlists.or(self.playlists),
        }
    }

    /// Shallow field-by-field merge over `doc`.
    pub fn apply_to(self, doc: &mut PersistedDocument) {
        if let Some(favorites) = self.favorite_playlist {
            doc.favorite_playlist = favorites;
        }
        if let Some(metadata) = self.metadata {
            doc.metadata = metadata;
        }
        if let Some(edit) = self.metadata_edit {
            edit.apply_to(&mut doc.metadata);
        }
        if let Some(playlists) = self.playlists {
            doc.playlists = playlists;
        }
    }
}
