//! AES-256-GCM transport encryption with the ISO 18013-5 counter IV scheme.
//!
//! Each direction derives its own key, and the IV is an 8-byte role
//! identifier followed by a big-endian message counter starting at 1. The
//! counter state lives in a per-session [SessionCipher] so concurrent
//! sessions cannot disturb each other's IV sequences.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};

use crate::definitions::session::SessionKey;

const READER_IDENTIFIER: [u8; 8] = [0, 0, 0, 0, 0, 0, 0, 0];
const DEVICE_IDENTIFIER: [u8; 8] = [0, 0, 0, 0, 0, 0, 0, 1];

/// Failures are deliberately opaque: AEAD errors carry no detail by design,
/// and distinguishing them would invite padding-oracle style misuse.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to encrypt message")]
    Encryption,
    #[error("failed to decrypt message")]
    Decryption,
    #[error("message counter exhausted")]
    CounterExhausted,
}

/// Counter state for one session. Encrypting or decrypting a message burns
/// one counter value; an exhausted counter ends the session rather than
/// wrapping, since IV reuse under the same key breaks GCM.
#[derive(Debug)]
pub struct SessionCipher {
    message_counter: u32,
}

impl Default for SessionCipher {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCipher {
    pub fn new() -> SessionCipher {
        SessionCipher { message_counter: 1 }
    }

    /// Rewinds the counter to the start of the sequence. Only valid together
    /// with a key change, or when replaying a peer's sequence from the top.
    pub fn reset_message_counter(&mut self) {
        self.message_counter = 1;
    }

    pub fn encrypt(
        &mut self,
        session_key: &SessionKey,
        plaintext: &[u8],
        reader: bool,
    ) -> Result<Vec<u8>, Error> {
        let iv = self.next_iv(reader)?;
        let cipher =
            Aes256Gcm::new_from_slice(session_key.as_ref()).map_err(|_| Error::Encryption)?;
        cipher
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|_| Error::Encryption)
    }

    pub fn decrypt(
        &mut self,
        session_key: &SessionKey,
        ciphertext: &[u8],
        reader: bool,
    ) -> Result<Vec<u8>, Error> {
        let iv = self.next_iv(reader)?;
        let cipher =
            Aes256Gcm::new_from_slice(session_key.as_ref()).map_err(|_| Error::Decryption)?;
        cipher
            .decrypt(Nonce::from_slice(&iv), ciphertext)
            .map_err(|_| Error::Decryption)
    }

    fn next_iv(&mut self, reader: bool) -> Result<[u8; 12], Error> {
        let counter = self.message_counter;
        self.message_counter = counter.checked_add(1).ok_or(Error::CounterExhausted)?;
        let identifier = if reader {
            READER_IDENTIFIER
        } else {
            DEVICE_IDENTIFIER
        };
        let mut iv = [0u8; 12];
        iv[..8].copy_from_slice(&identifier);
        iv[8..].copy_from_slice(&counter.to_be_bytes());
        Ok(iv)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::definitions::session::{
        create_p256_ephemeral_keys, derive_session_key, get_shared_secret, Handover,
        SessionTranscript,
    };
    use crate::definitions::engagement::{
        BleRetrievalOptions, BleUuid, DeviceEngagement, DeviceRetrievalMethod, ReaderEngagement,
        Security, CIPHER_SUITE_IDENTIFIER,
    };
    use crate::definitions::helpers::{NonEmptyVec, Tag24};
    use crate::definitions::session::SessionKey;
    use uuid::Uuid;

    fn session_key() -> SessionKey {
        let (reader_secret, reader_public) = create_p256_ephemeral_keys().unwrap();
        let (_, device_public) = create_p256_ephemeral_keys().unwrap();
        let reader_engagement = ReaderEngagement {
            version: "1.0".to_string(),
            security: Security(
                CIPHER_SUITE_IDENTIFIER,
                Tag24::new(reader_public).unwrap(),
            ),
            device_retrieval_methods: NonEmptyVec::new(DeviceRetrievalMethod {
                transport_type: DeviceRetrievalMethod::BLE,
                version: DeviceRetrievalMethod::VERSION,
                ble_options: BleRetrievalOptions {
                    peripheral_server_mode_supported: false,
                    central_client_mode_supported: true,
                    server2client_uuid: Some(BleUuid::from(Uuid::new_v4())),
                    client2server_uuid: None,
                },
            }),
        };
        let transcript = Tag24::new(SessionTranscript(
            Tag24::new(DeviceEngagement::new(Tag24::new(device_public.clone()).unwrap())).unwrap(),
            Tag24::new(reader_engagement).unwrap(),
            Handover::Qr,
        ))
        .unwrap();
        let shared =
            get_shared_secret(device_public, &reader_secret.to_nonzero_scalar()).unwrap();
        derive_session_key(&shared, &transcript, true).unwrap()
    }

    #[test]
    fn counter_sequence_roundtrips() {
        let key = session_key();
        let mut sender = SessionCipher::new();
        let plaintexts: Vec<Vec<u8>> = (0u8..5).map(|i| vec![i; 16]).collect();
        let ciphertexts: Vec<Vec<u8>> = plaintexts
            .iter()
            .map(|p| sender.encrypt(&key, p, true).unwrap())
            .collect();

        let mut receiver = SessionCipher::new();
        for (ciphertext, plaintext) in ciphertexts.iter().zip(&plaintexts) {
            let decrypted = receiver.decrypt(&key, ciphertext, true).unwrap();
            assert_eq!(&decrypted, plaintext);
        }
    }

    #[test]
    fn each_message_uses_a_fresh_iv() {
        let key = session_key();
        let mut cipher = SessionCipher::new();
        let a = cipher.encrypt(&key, b"same plaintext", true).unwrap();
        let b = cipher.encrypt(&key, b"same plaintext", true).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn directions_do_not_cross_decrypt() {
        let key = session_key();
        let ciphertext = SessionCipher::new().encrypt(&key, b"hello", true).unwrap();
        assert!(SessionCipher::new().decrypt(&key, &ciphertext, false).is_err());
        assert!(SessionCipher::new().decrypt(&key, &ciphertext, true).is_ok());
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let key = session_key();
        let mut ciphertext = SessionCipher::new().encrypt(&key, b"hello", false).unwrap();
        ciphertext[0] ^= 0x01;
        assert!(SessionCipher::new().decrypt(&key, &ciphertext, false).is_err());
    }

    #[test]
    fn counter_mismatch_fails_decryption() {
        let key = session_key();
        let mut sender = SessionCipher::new();
        let _ = sender.encrypt(&key, b"first", true).unwrap();
        let second = sender.encrypt(&key, b"second", true).unwrap();
        // receiver still expects counter 1
        assert!(SessionCipher::new().decrypt(&key, &second, true).is_err());
        let mut receiver = SessionCipher::new();
        receiver.reset_message_counter();
        let _ = receiver.next_iv(true).unwrap();
        assert_eq!(receiver.decrypt(&key, &second, true).unwrap(), b"second");
    }
}
