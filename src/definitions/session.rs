//! Session establishment: ephemeral P-256 keys, ECDH, and HKDF key
//! derivation bound to the session transcript.
//!
//! Both sides hash the tag-24 encoding of the [SessionTranscript] into the
//! HKDF salt, so any disagreement about the engagement bytes produces
//! different session keys and the first decryption fails.

use ciborium::Value;
use coset::{AsCborValue, CborSerializable, CoseError};
use elliptic_curve::sec1::FromEncodedPoint;
use hkdf::Hkdf;
use p256::ecdh::{diffie_hellman, SharedSecret};
use p256::{NonZeroScalar, PublicKey, SecretKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cbor::CborError;
use crate::definitions::cose_key::{self, CoseKey};
use crate::definitions::engagement::{DeviceEngagement, ReaderEngagement};
use crate::definitions::helpers::Tag24;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("the other party's public key is not a valid P-256 point")]
    InvalidPublicKey,
    #[error("invalid COSE key: {0}")]
    CoseKey(#[from] cose_key::Error),
    #[error("session key derivation failed")]
    KeyDerivation,
    #[error(transparent)]
    Cbor(#[from] CborError),
}

/// How the engagement reached the other party. Only QR handover is
/// supported, which ISO 18013-5 encodes as CBOR null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handover {
    Qr,
}

/// The three engagement artifacts a session's keys are bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTranscript(
    pub Tag24<DeviceEngagement>,
    pub Tag24<ReaderEngagement>,
    pub Handover,
);

impl CborSerializable for SessionTranscript {}
impl AsCborValue for SessionTranscript {
    fn from_cbor_value(value: Value) -> coset::Result<Self> {
        let Value::Array(mut array) = value else {
            return Err(CoseError::DecodeFailed(ciborium::de::Error::Semantic(
                None,
                "session transcript is not an array".to_string(),
            )));
        };
        if array.len() != 3 {
            return Err(CoseError::DecodeFailed(ciborium::de::Error::Semantic(
                None,
                "session transcript is not a 3-element array".to_string(),
            )));
        }
        let handover = array.pop();
        let reader_engagement = array.pop();
        let device_engagement = array.pop();
        if handover != Some(Value::Null) {
            return Err(CoseError::DecodeFailed(ciborium::de::Error::Semantic(
                None,
                "only QR handover is supported".to_string(),
            )));
        }
        let device_engagement = device_engagement
            .map(Tag24::from_cbor_value)
            .transpose()?
            .ok_or(CoseError::ExtraneousData)?;
        let reader_engagement = reader_engagement
            .map(Tag24::from_cbor_value)
            .transpose()?
            .ok_or(CoseError::ExtraneousData)?;
        Ok(SessionTranscript(
            device_engagement,
            reader_engagement,
            Handover::Qr,
        ))
    }

    fn to_cbor_value(self) -> coset::Result<Value> {
        Ok(Value::Array(vec![
            self.0.to_cbor_value()?,
            self.1.to_cbor_value()?,
            Value::Null,
        ]))
    }
}

/// A derived AES-256 session key. Zeroed on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; 32]);

impl AsRef<[u8]> for SessionKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Generates the holder's ephemeral session key pair.
pub fn create_p256_ephemeral_keys() -> Result<(SecretKey, CoseKey), Error> {
    let secret = SecretKey::random(&mut OsRng);
    let public = CoseKey::from(&secret.public_key());
    Ok((secret, public))
}

/// ECDH over the other party's engagement key and our ephemeral scalar.
pub fn get_shared_secret(
    their_key: CoseKey,
    our_scalar: &NonZeroScalar,
) -> Result<SharedSecret, Error> {
    let point = p256::EncodedPoint::try_from(their_key)?;
    let public: PublicKey =
        Option::from(PublicKey::from_encoded_point(&point)).ok_or(Error::InvalidPublicKey)?;
    Ok(diffie_hellman(our_scalar, public.as_affine()))
}

/// HKDF-SHA-256 over the shared secret, salted with the digest of the
/// tag-24 encoded session transcript. `reader` selects the SKReader or
/// SKDevice info string.
pub fn derive_session_key(
    shared_secret: &SharedSecret,
    session_transcript: &Tag24<SessionTranscript>,
    reader: bool,
) -> Result<SessionKey, Error> {
    let salt = Sha256::digest(session_transcript.to_tagged_vec()?);
    let hkdf = Hkdf::<Sha256>::new(
        Some(salt.as_ref()),
        shared_secret.raw_secret_bytes().as_slice(),
    );
    let mut okm = [0u8; 32];
    let info = if reader { "SKReader" } else { "SKDevice" };
    hkdf.expand(info.as_bytes(), &mut okm)
        .map_err(|_| Error::KeyDerivation)?;
    Ok(SessionKey(okm))
}
