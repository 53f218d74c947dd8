//! Identity keyfile on disk: one line of padded urlsafe base64 holding
//! the 32-byte Ed25519 secret.

use std::path::Path;

use anyhow::Context;
use base64::{engine::general_purpose::URL_SAFE, Engine};

use qp_crypto::identity::IdentityKeyPair;

pub fn load_identity(path: &Path) -> anyhow::Result<IdentityKeyPair> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading identity key {}", path.display()))?;
    let bytes = URL_SAFE
        .decode(raw.trim())
        .with_context(|| format!("decoding identity key {}", path.display()))?;
    IdentityKeyPair::from_bytes(&bytes)
        .with_context(|| format!("loading identity key {}", path.display()))
}

/// Generate a fresh identity and write it to `path`. Refuses to
/// overwrite an existing keyfile.
pub fn generate_to(path: &Path) -> anyhow::Result<IdentityKeyPair> {
    if path.exists() {
        anyhow::bail!("identity key {} already exists", path.display());
    }
    let identity = IdentityKeyPair::generate();
    let encoded = URL_SAFE.encode(identity.secret_bytes());
    std::fs::write(path, format!("{encoded}\n"))
        .with_context(|| format!("writing identity key {}", path.display()))?;
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn generate_then_load_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("identity.key");
        let generated = generate_to(&path).unwrap();
        let loaded = load_identity(&path).unwrap();
        assert_eq!(loaded.public, generated.public);
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("identity.key");
        generate_to(&path).unwrap();
        assert!(generate_to(&path).is_err());
    }

    #[test]
    fn tolerates_trailing_whitespace() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("identity.key");
        let generated = generate_to(&path).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, format!("  {}\n\n", raw.trim())).unwrap();
        let loaded = load_identity(&path).unwrap();
        assert_eq!(loaded.public, generated.public);
    }
}
