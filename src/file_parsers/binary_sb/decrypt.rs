//! Decryption pass applied to encrypted payloads before the entry table is read

use bytes::Bytes;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};

use super::types::MagicKind;
use crate::{error::DecodeError, keys::KeyStore};

/// Label of the key used for bundle payloads
pub const KEY_LABEL: &str = "Key2";
const BLOCK_SIZE: usize = 16;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Pass the payload through untouched unless the magic marks it as encrypted
pub fn open_payload(
    payload: Bytes,
    kind: MagicKind,
    keys: &dyn KeyStore,
) -> Result<Bytes, DecodeError> {
    if !kind.is_encrypted() {
        return Ok(payload);
    }

    let key = keys
        .get_key(KEY_LABEL)
        .ok_or_else(|| DecodeError::DecryptionFailure(format!("Missing key {KEY_LABEL:?}")))?;

    let mut buffer = payload.to_vec();
    decrypt_in_place(&mut buffer, key)?;

    Ok(Bytes::from(buffer))
}

/// AES-128-CBC with the key doubling as the IV and no padding. Only whole blocks are
/// decrypted, a trailing partial block is left as-is.
pub fn decrypt_in_place(buffer: &mut [u8], key: &[u8]) -> Result<(), DecodeError> {
    let aligned = buffer.len() - buffer.len() % BLOCK_SIZE;
    if aligned == 0 {
        return Err(DecodeError::DecryptionFailure(format!(
            "Payload of {} bytes is shorter than a cipher block",
            buffer.len()
        )));
    }

    let cipher = Aes128CbcDec::new_from_slices(key, key)
        .map_err(|e| DecodeError::DecryptionFailure(format!("Invalid key: {e}")))?;

    cipher
        .decrypt_padded_mut::<NoPadding>(&mut buffer[..aligned])
        .map_err(|e| DecodeError::DecryptionFailure(format!("Cipher error: {e}")))?;

    Ok(())
}
