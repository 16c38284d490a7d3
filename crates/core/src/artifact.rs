//! Artifact types: raw upload bytes plus their declared kind.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::InvalidArtifact;

/// Image formats accepted for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Png,
    Jpg,
    Jpeg,
    Gif,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Png,
        ArtifactKind::Jpg,
        ArtifactKind::Jpeg,
        ArtifactKind::Gif,
    ];

    /// Normalized extension (lowercase, no leading dot).
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Png => "png",
            ArtifactKind::Jpg => "jpg",
            ArtifactKind::Jpeg => "jpeg",
            ArtifactKind::Gif => "gif",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ArtifactKind::Png => "image/png",
            ArtifactKind::Jpg | ArtifactKind::Jpeg => "image/jpeg",
            ArtifactKind::Gif => "image/gif",
        }
    }

    /// Parse a declared extension. Case-insensitive, tolerates a leading `.`.
    pub fn from_extension(ext: &str) -> Result<Self, InvalidArtifact> {
        let normalized = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(InvalidArtifact::MissingExtension);
        }
        Self::ALL
            .into_iter()
            .find(|k| k.extension() == normalized)
            .ok_or(InvalidArtifact::UnrecognizedExtension(normalized))
    }

    /// Upload allow-list check on a client-supplied filename.
    ///
    /// Only the text after the last `.` counts, so `photo.tar.gif` is a gif
    /// and `gif` (no dot at all) has no extension.
    pub fn from_filename(filename: &str) -> Result<Self, InvalidArtifact> {
        let name = filename
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or(filename);
        match name.rsplit_once('.') {
            Some((_, ext)) => Self::from_extension(ext),
            None => Err(InvalidArtifact::MissingExtension),
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ArtifactKind {
    type Err = InvalidArtifact;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s)
    }
}

/// An accepted upload. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Bytes,
    pub kind: ArtifactKind,
}

impl Artifact {
    pub fn new(bytes: impl Into<Bytes>, kind: ArtifactKind) -> Self {
        Self {
            bytes: bytes.into(),
            kind,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
