//! Purpose-scoped authenticated encryption for envelopes crossing the relay.
//!
//! Every envelope is `ChaCha20-Poly1305` with the purpose bound into the AAD, so
//! an envelope sealed for `login` fails authentication when opened as
//! `response`. Expiry is not enforced here: it is a payload field checked by
//! whoever opens the envelope.
//!
//! Wire format (base64url, unpadded): `version (1) || nonce (12) || ciphertext`.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use crate::error::Error;

pub const PURPOSE_LOGIN: &str = "login";
pub const PURPOSE_REFRESH: &str = "refresh";
pub const PURPOSE_RESPONSE: &str = "response";

const ENVELOPE_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Clone)]
pub struct EnvelopeProtector {
    cipher: ChaCha20Poly1305,
}

impl fmt::Debug for EnvelopeProtector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeProtector").finish_non_exhaustive()
    }
}

impl EnvelopeProtector {
    /// Build a protector from a raw 32-byte master key.
    #[must_use]
    pub fn from_key(key: [u8; KEY_LEN]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(&key.into()),
        }
    }

    /// Build a protector from a base64url (unpadded) encoded 32-byte key.
    ///
    /// # Errors
    /// Returns an error if the key is not valid base64url or not 32 bytes long.
    pub fn from_base64(key: &SecretString) -> Result<Self> {
        let bytes = Base64UrlUnpadded::decode_vec(key.expose_secret().trim())
            .map_err(|e| anyhow::anyhow!("protection key is not base64url: {e}"))?;
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("protection key must be {KEY_LEN} bytes"))
            .context("Invalid protection key")?;
        Ok(Self::from_key(key))
    }

    /// Generate a protector with a random key. Envelopes do not survive a restart.
    #[must_use]
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self::from_key(key)
    }

    /// Seal `plaintext` for `purpose`.
    ///
    /// # Errors
    /// Returns [`Error::MalformedEnvelope`] if the cipher rejects the input.
    #[allow(deprecated)]
    pub fn protect(&self, purpose: &str, plaintext: &[u8]) -> Result<String, Error> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let aad = construct_aad(purpose);
        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| Error::MalformedEnvelope)?;

        let mut sealed = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        sealed.push(ENVELOPE_VERSION);
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(Base64UrlUnpadded::encode_string(&sealed))
    }

    /// Open an envelope sealed for `purpose`.
    ///
    /// # Errors
    /// Returns [`Error::MalformedEnvelope`] for bad encoding, unknown versions,
    /// truncated input, tampering, or a purpose mismatch.
    #[allow(deprecated)]
    pub fn unprotect(&self, purpose: &str, envelope: &str) -> Result<Vec<u8>, Error> {
        let sealed =
            Base64UrlUnpadded::decode_vec(envelope.trim()).map_err(|_| Error::MalformedEnvelope)?;

        let Some((&version, rest)) = sealed.split_first() else {
            return Err(Error::MalformedEnvelope);
        };
        if version != ENVELOPE_VERSION || rest.len() < NONCE_LEN {
            return Err(Error::MalformedEnvelope);
        }

        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let aad = construct_aad(purpose);
        self.cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| Error::MalformedEnvelope)
    }
}

fn construct_aad(purpose: &str) -> Vec<u8> {
    // AAD = "signin-relay:v1|purpose"
    format!("signin-relay:v{ENVELOPE_VERSION}|{purpose}").into_bytes()
}
