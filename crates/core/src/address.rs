//! Content addressing: deterministic job IDs derived from artifact bytes.

use sha2::{Digest, Sha256};

use crate::artifact::{Artifact, ArtifactKind};
use crate::error::InvalidArtifact;
use crate::job::JobId;

/// Derive the correlation ID for `bytes` declared with `extension`.
///
/// The ID is the SHA-256 of the full content followed by the normalized
/// extension, so identical uploads always map to the same ID regardless of
/// their original filename or upload time.
pub fn address(bytes: &[u8], extension: &str) -> Result<JobId, InvalidArtifact> {
    let kind = ArtifactKind::from_extension(extension)?;
    address_kind(bytes, kind)
}

fn address_kind(bytes: &[u8], kind: ArtifactKind) -> Result<JobId, InvalidArtifact> {
    if bytes.is_empty() {
        return Err(InvalidArtifact::Empty);
    }
    let digest = Sha256::digest(bytes);
    Ok(JobId::from_digest(&format!("{digest:x}"), kind))
}

impl Artifact {
    /// Content address of this artifact.
    pub fn address(&self) -> Result<JobId, InvalidArtifact> {
        address_kind(&self.bytes, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::collections::HashSet;

    #[test]
    fn same_bytes_same_id() {
        let a = address(b"IMG_BYTES", "jpg").unwrap();
        let b = address(b"IMG_BYTES", ".JPG").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn id_shape_is_hex_digest_plus_extension() {
        let id = address(b"IMG_BYTES", "jpg").unwrap();
        let (hex, ext) = id.as_str().split_once('.').unwrap();
        assert_eq!(ext, "jpg");
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn known_digest() {
        // sha256("abc")
        let id = address(b"abc", "png").unwrap();
        assert_eq!(
            id.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad.png"
        );
    }

    #[test]
    fn extension_is_part_of_the_id() {
        let jpg = address(b"IMG_BYTES", "jpg").unwrap();
        let png = address(b"IMG_BYTES", "png").unwrap();
        assert_ne!(jpg, png);
    }

    #[test]
    fn artifact_address_matches_free_function() {
        let artifact = Artifact::new(&b"IMG_BYTES"[..], ArtifactKind::Jpg);
        assert_eq!(artifact.address().unwrap(), address(b"IMG_BYTES", "jpg").unwrap());
    }

    #[test]
    fn rejects_empty_and_bad_extensions() {
        assert_eq!(address(b"", "jpg"), Err(InvalidArtifact::Empty));
        assert_eq!(address(b"x", ""), Err(InvalidArtifact::MissingExtension));
        assert_eq!(
            address(b"x", "exe"),
            Err(InvalidArtifact::UnrecognizedExtension("exe".into()))
        );
    }

    #[test]
    fn random_distinct_inputs_never_collide() {
        let mut rng = rand::thread_rng();
        let mut seen_inputs = HashSet::new();
        let mut seen_ids = HashSet::new();

        while seen_inputs.len() < 2_000 {
            let len = rng.gen_range(1..256);
            let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            if !seen_inputs.insert(bytes.clone()) {
                continue;
            }
            let id = address(&bytes, "png").unwrap();
            assert!(seen_ids.insert(id), "collision for distinct input");
        }
    }

    #[test]
    fn random_inputs_are_deterministic() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let len = rng.gen_range(1..512);
            let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let copy = bytes.clone();
            assert_eq!(address(&bytes, "gif").unwrap(), address(&copy, "GIF").unwrap());
        }
    }
}
