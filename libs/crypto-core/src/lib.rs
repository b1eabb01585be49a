//! Symmetric codec for ephemeral chat message bodies.
//!
//! Ciphertext uses the OpenSSL "salted" passphrase layout that browser
//! clients emit: `base64("Salted__" || salt || AES-256-CBC(plaintext))`,
//! with key and IV derived by `EVP_BytesToKey` (MD5, one round). The scheme
//! is unauthenticated and the key travels next to the ciphertext; it hides
//! bodies from casual inspection and nothing more.
//!
//! Decryption tries several interpretations of the key because different
//! senders have produced keys in different encodings. See [`DecodeStrategy`].

use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{rngs::OsRng, Rng, RngCore};

const SALTED_MAGIC: &[u8; 8] = b"Salted__";
const SALT_LEN: usize = 8;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const HEADER_LEN: usize = SALTED_MAGIC.len() + SALT_LEN;

/// Keys that may be hex encodings of 16 raw bytes.
const HEX_KEY_LEN: usize = 32;

const KEY_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const KEY_SEGMENT_LEN: usize = 13;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes192CbcEnc = cbc::Encryptor<aes::Aes192>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes192CbcDec = cbc::Decryptor<aes::Aes192>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encryption error")]
    Encryption,
    #[error("decryption error")]
    Decryption,
    /// The key opened the ciphertext but the plaintext is empty.
    #[error("decrypted plaintext is empty")]
    EmptyPlaintext,
    #[error("invalid key length: {0} bytes")]
    InvalidKeyLength(usize),
}

/// Key interpretations tried by [`decrypt`], in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// The key string itself is the passphrase.
    RawPassphrase,
    /// The key is hex; the decoded bytes are the AES key (zero IV).
    HexRawKey,
    /// The key is hex; the decoded bytes, read as UTF-8, are the passphrase.
    HexUtf8Passphrase,
}

/// Generate a fresh per-message key: 26 lowercase base-36 characters.
pub fn generate_key() -> String {
    let mut rng = rand::thread_rng();
    (0..KEY_SEGMENT_LEN * 2)
        .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
        .collect()
}

/// Encrypt `plaintext` with a passphrase key. A random salt makes the
/// output differ on every call.
pub fn encrypt(plaintext: &str, key: &str) -> Result<String, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let (derived_key, iv) = evp_bytes_to_key(key.as_bytes(), &salt);
    let body = cbc_encrypt::<Aes256CbcEnc>(&derived_key, &iv, plaintext.as_bytes())
        .map_err(|_| CryptoError::Encryption)?;

    let mut framed = Vec::with_capacity(HEADER_LEN + body.len());
    framed.extend_from_slice(SALTED_MAGIC);
    framed.extend_from_slice(&salt);
    framed.extend_from_slice(&body);
    Ok(STANDARD.encode(framed))
}

/// Encrypt with raw key bytes (16, 24 or 32) and a zero IV, no salt header.
///
/// This is the layout [`DecodeStrategy::HexRawKey`] reads back.
pub fn encrypt_with_raw_key(plaintext: &str, key: &[u8]) -> Result<String, CryptoError> {
    let iv = [0u8; IV_LEN];
    let body = match key.len() {
        16 => cbc_encrypt::<Aes128CbcEnc>(key, &iv, plaintext.as_bytes())?,
        24 => cbc_encrypt::<Aes192CbcEnc>(key, &iv, plaintext.as_bytes())?,
        32 => cbc_encrypt::<Aes256CbcEnc>(key, &iv, plaintext.as_bytes())?,
        n => return Err(CryptoError::InvalidKeyLength(n)),
    };
    Ok(STANDARD.encode(body))
}

/// Decrypt `ciphertext`, returning the first non-empty UTF-8 plaintext any
/// key interpretation yields.
///
/// Fails with [`CryptoError::EmptyPlaintext`] when no interpretation gives
/// text but at least one opened to an empty body, and with
/// [`CryptoError::Decryption`] otherwise.
pub fn decrypt(ciphertext: &str, key: &str) -> Result<String, CryptoError> {
    decrypt_with_strategy(ciphertext, key).map(|(plaintext, _)| plaintext)
}

/// Like [`decrypt`], also reporting which interpretation of the key worked.
pub fn decrypt_with_strategy(
    ciphertext: &str,
    key: &str,
) -> Result<(String, DecodeStrategy), CryptoError> {
    let data = STANDARD
        .decode(ciphertext.trim())
        .map_err(|_| CryptoError::Decryption)?;

    let mut opened_empty = false;

    if let Some(plaintext) = accept(open_salted(&data, key.as_bytes()), &mut opened_empty) {
        return Ok((plaintext, DecodeStrategy::RawPassphrase));
    }

    // The hex fallbacks only apply to 32-character keys.
    let hex_bytes = (key.len() == HEX_KEY_LEN)
        .then(|| hex::decode(key).ok())
        .flatten();

    if let Some(bytes) = hex_bytes {
        if let Some(plaintext) = accept(open_raw(&data, &bytes), &mut opened_empty) {
            return Ok((plaintext, DecodeStrategy::HexRawKey));
        }
        if let Ok(passphrase) = String::from_utf8(bytes) {
            let opened = open_salted(&data, passphrase.as_bytes());
            if let Some(plaintext) = accept(opened, &mut opened_empty) {
                return Ok((plaintext, DecodeStrategy::HexUtf8Passphrase));
            }
        }
    }

    if opened_empty {
        Err(CryptoError::EmptyPlaintext)
    } else {
        Err(CryptoError::Decryption)
    }
}

// An empty plaintext moves on to the next strategy but is remembered.
fn accept(opened: Option<String>, opened_empty: &mut bool) -> Option<String> {
    match opened {
        Some(text) if text.is_empty() => {
            *opened_empty = true;
            None
        }
        other => other,
    }
}

fn open_salted(data: &[u8], passphrase: &[u8]) -> Option<String> {
    if data.len() <= HEADER_LEN || !data.starts_with(SALTED_MAGIC) {
        return None;
    }
    let salt = &data[SALTED_MAGIC.len()..HEADER_LEN];
    let (key, iv) = evp_bytes_to_key(passphrase, salt);
    let plaintext = cbc_decrypt::<Aes256CbcDec>(&key, &iv, &data[HEADER_LEN..])?;
    String::from_utf8(plaintext).ok()
}

fn open_raw(data: &[u8], key: &[u8]) -> Option<String> {
    let body = if data.starts_with(SALTED_MAGIC) && data.len() > HEADER_LEN {
        &data[HEADER_LEN..]
    } else {
        data
    };
    let iv = [0u8; IV_LEN];
    let plaintext = match key.len() {
        16 => cbc_decrypt::<Aes128CbcDec>(key, &iv, body),
        24 => cbc_decrypt::<Aes192CbcDec>(key, &iv, body),
        32 => cbc_decrypt::<Aes256CbcDec>(key, &iv, body),
        _ => None,
    }?;
    String::from_utf8(plaintext).ok()
}

fn cbc_encrypt<C>(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>
where
    C: KeyIvInit + BlockEncryptMut,
{
    let cipher =
        C::new_from_slices(key, iv).map_err(|_| CryptoError::InvalidKeyLength(key.len()))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], body: &[u8]) -> Option<Vec<u8>>
where
    C: KeyIvInit + BlockDecryptMut,
{
    if body.is_empty() || body.len() % IV_LEN != 0 {
        return None;
    }
    let cipher = C::new_from_slices(key, iv).ok()?;
    cipher.decrypt_padded_vec_mut::<Pkcs7>(body).ok()
}

/// OpenSSL `EVP_BytesToKey` with MD5 and a single iteration.
fn evp_bytes_to_key(passphrase: &[u8], salt: &[u8]) -> ([u8; KEY_LEN], [u8; IV_LEN]) {
    let mut derived = Vec::with_capacity(KEY_LEN + IV_LEN + 16);
    let mut block: Vec<u8> = Vec::new();

    while derived.len() < KEY_LEN + IV_LEN {
        let mut input = Vec::with_capacity(block.len() + passphrase.len() + salt.len());
        input.extend_from_slice(&block);
        input.extend_from_slice(passphrase);
        input.extend_from_slice(salt);
        block = md5::compute(&input).0.to_vec();
        derived.extend_from_slice(&block);
    }

    let mut key = [0u8; KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    key.copy_from_slice(&derived[..KEY_LEN]);
    iv.copy_from_slice(&derived[KEY_LEN..KEY_LEN + IV_LEN]);
    (key, iv)
}
