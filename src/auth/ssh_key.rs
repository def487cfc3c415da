use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use russh_keys::PublicKeyBase64;
use russh_keys::key::PublicKey;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};
use crate::store::Store;

/// Parses one line in `authorized_keys` format: `<algo> <base64> [comment]`.
pub fn parse_authorized_key(text: &str) -> Result<PublicKey> {
    let mut fields = text.split_whitespace();
    let algorithm = fields
        .next()
        .ok_or_else(|| Error::InvalidKey("empty key".into()))?;
    let blob = fields
        .next()
        .ok_or_else(|| Error::InvalidKey(format!("missing key data after {algorithm}")))?;

    let key = russh_keys::parse_public_key_base64(blob)
        .map_err(|e| Error::InvalidKey(e.to_string()))?;

    if key.name() != algorithm {
        return Err(Error::InvalidKey(format!(
            "key type {} does not match declared {algorithm}",
            key.name()
        )));
    }

    Ok(key)
}

/// SHA-256 fingerprint in the `ssh-keygen -l` format.
#[must_use]
pub fn fingerprint(key: &PublicKey) -> String {
    let hash = Sha256::digest(key.public_key_bytes());
    format!("SHA256:{}", STANDARD_NO_PAD.encode(hash))
}

/// Structural key equality over the wire encoding, in constant time.
#[must_use]
pub fn keys_match(a: &PublicKey, b: &PublicKey) -> bool {
    let a = a.public_key_bytes();
    let b = b.public_key_bytes();
    a.ct_eq(&b).into()
}

/// Scans every stored key for `presented` and returns the owning account.
///
/// The scan does not stop at the first hit, so the time taken depends on the
/// number of stored keys and not on which one matched. Unparseable stored
/// keys are logged and skipped.
pub fn find_key_owner(store: &dyn Store, presented: &PublicKey) -> Result<Option<i64>> {
    let mut owner = None;

    for stored in store.all_authorized_keys()? {
        let key = match parse_authorized_key(&stored.key_text) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(account = stored.account_id, "Skipping unparseable stored key: {e}");
                continue;
            }
        };

        if keys_match(&key, presented) && owner.is_none() {
            owner = Some(stored.account_id);
        }
    }

    Ok(owner)
}
