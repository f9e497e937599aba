use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// A track's identity: its source URL, compared byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackRef(String);

impl TrackRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decoded last path segment of the URL, used as the fallback title.
    /// Empty when the URL ends in `/`.
    pub fn file_name(&self) -> String {
        let segment = self.0.rsplit('/').next().unwrap_or_default();
        if segment.is_empty() {
            return String::new();
        }
        match urlencoding::decode(segment) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => self.0.clone(),
        }
    }
}

impl fmt::Display for TrackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackRef {
    fn from(url: &str) -> Self {
        Self(url.to_string())
    }
}

impl From<String> for TrackRef {
    fn from(url: String) -> Self {
        Self(url)
    }
}

impl Borrow<str> for TrackRef {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Display attributes for a track. Written once per TrackRef.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: String,
    pub artist: String,
    /// `data:<mime>;base64,...`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl Metadata {
    /// Filename title, unknown artist, no picture.
    pub fn fallback(track: &TrackRef) -> Self {
        Self {
            title: track.file_name(),
            artist: UNKNOWN_ARTIST.to_string(),
            picture: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub name: String,
    #[serde(default)]
    pub tracks: Vec<TrackRef>,
}

impl Playlist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tracks: Vec::new(),
        }
    }

    pub fn with_tracks<I, T>(name: impl Into<String>, tracks: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TrackRef>,
    {
        Self {
            name: name.into(),
            tracks: tracks.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, track: &TrackRef) -> bool {
        self.tracks.contains(track)
    }
}
