//! The holder side of a QR-initiated proximity presentation.
//!
//! [ProximityService] drives one session end to end: parse the scanned
//! engagement, connect over BLE, answer with a device engagement, wait for
//! the reader's encrypted request, and derive the session keys that protect
//! the rest of the exchange.

use std::time::Duration;

use p256::SecretKey;
use tokio::time::timeout;

use crate::definitions::device_request::{self, DeviceRequest, EncryptedDeviceRequest};
use crate::definitions::engagement::{self, DeviceEngagement, EngagementUri, ReaderEngagement};
use crate::definitions::helpers::{tag24, Tag24};
use crate::definitions::session::{
    self, create_p256_ephemeral_keys, derive_session_key, get_shared_secret, Handover, SessionKey,
    SessionTranscript,
};
use crate::transport::ble::{self, BleCentral, MessageAssembler, START_SESSION_MARKER};
use crate::transport::encryption::{self, SessionCipher};

/// How long to wait for the reader's request after publishing the device
/// engagement.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("engagement error: {0}")]
    Engagement(#[from] engagement::Error),
    #[error("transport error: {0}")]
    Transport(#[from] ble::Error),
    #[error("session establishment error: {0}")]
    Session(#[from] session::Error),
    #[error("encryption error: {0}")]
    Encryption(#[from] encryption::Error),
    #[error("device request error: {0}")]
    Request(#[from] device_request::Error),
    #[error(transparent)]
    Tag24(#[from] tag24::Error),
}

/// Drives proximity sessions over a platform BLE central.
pub struct ProximityService<C: BleCentral> {
    ble: C,
    request_timeout: Duration,
}

impl<C: BleCentral> ProximityService<C> {
    pub fn new(ble: C) -> ProximityService<C> {
        Self::with_timeout(ble, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(ble: C, request_timeout: Duration) -> ProximityService<C> {
        ProximityService {
            ble,
            request_timeout,
        }
    }

    /// Releases the BLE central, e.g. to disconnect after a timed-out or
    /// completed session. Connection teardown is the caller's decision.
    pub fn into_inner(self) -> C {
        self.ble
    }

    /// Runs the engagement phase of a session against the reader described
    /// by a scanned `mdoc://` uri.
    ///
    /// Returns `Ok(None)` if the reader sends no request within the
    /// configured timeout. The BLE connection is left open in that case so
    /// the caller decides between retrying and tearing down.
    pub async fn handle_reader_engagement(
        &mut self,
        uri: &EngagementUri,
    ) -> Result<Option<EstablishedSession>, Error> {
        let reader_engagement = ReaderEngagement::from_engagement_uri(uri)?;
        // Resolve the uuid before touching the radio so a non-actionable
        // engagement fails without a connection attempt.
        let service_uuid = reader_engagement.as_ref().service_uuid()?;
        tracing::debug!(%service_uuid, "connecting to reader");
        self.ble.init(service_uuid).await?;
        self.ble.write_state(START_SESSION_MARKER).await?;

        let (e_device_key, e_device_public) = create_p256_ephemeral_keys()?;
        let device_engagement =
            Tag24::new(DeviceEngagement::new(Tag24::new(e_device_public)?))?;

        // Subscribe before publishing the engagement, otherwise the reader's
        // request can race the subscription and be lost.
        self.ble.subscribe().await?;
        self.send(&device_engagement.inner_bytes).await?;
        tracing::debug!("device engagement published, awaiting request");

        let encrypted_request = match timeout(self.request_timeout, self.receive()).await {
            Ok(message) => message?,
            Err(_) => {
                tracing::warn!(
                    timeout = ?self.request_timeout,
                    "reader sent no request, leaving the connection to the caller"
                );
                return Ok(None);
            }
        };

        let session_transcript = Tag24::new(SessionTranscript(
            device_engagement,
            reader_engagement.clone(),
            Handover::Qr,
        ))?;
        let reader_key = reader_engagement.as_ref().security.key_bytes().as_ref();
        let shared_secret =
            get_shared_secret(reader_key.clone(), &e_device_key.to_nonzero_scalar())?;
        let sk_reader = derive_session_key(&shared_secret, &session_transcript, true)?;
        let sk_device = derive_session_key(&shared_secret, &session_transcript, false)?;

        let mut cipher = SessionCipher::new();
        let plaintext = cipher.decrypt(&sk_reader, &encrypted_request, true)?;
        // The device's IV sequence starts at 1 as well; the identifier octets
        // keep it disjoint from the reader's.
        cipher.reset_message_counter();
        let request = DeviceRequest::from_cbor(&plaintext)?;
        tracing::debug!(
            doc_requests = request.doc_requests.len(),
            "session established"
        );

        Ok(Some(EstablishedSession {
            request: EncryptedDeviceRequest {
                request,
                encrypted_bytes: encrypted_request,
            },
            session_transcript,
            e_device_key,
            sk_device,
            cipher,
        }))
    }

    /// Chunks and writes one message to the reader.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), Error> {
        for chunk in ble::chunk_bytes(data, self.ble.mtu())? {
            self.ble.write_chunk(&chunk).await?;
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<Vec<u8>, Error> {
        let mut assembler = MessageAssembler::new();
        loop {
            let chunk = self.ble.next_notification().await?;
            if let Some(message) = assembler.absorb(&chunk)? {
                return Ok(message);
            }
        }
    }
}

/// A session that has received and decrypted the reader's request.
///
/// Holds everything the response phase needs: the transcript the keys are
/// bound to, the holder's ephemeral key for device authentication, and the
/// cipher state for the device-to-reader direction.
pub struct EstablishedSession {
    request: EncryptedDeviceRequest,
    session_transcript: Tag24<SessionTranscript>,
    e_device_key: SecretKey,
    sk_device: SessionKey,
    cipher: SessionCipher,
}

impl EstablishedSession {
    pub fn request(&self) -> &DeviceRequest {
        &self.request.request
    }

    pub fn request_bytes(&self) -> &[u8] {
        &self.request.encrypted_bytes
    }

    pub fn session_transcript(&self) -> &Tag24<SessionTranscript> {
        &self.session_transcript
    }

    pub fn e_device_key(&self) -> &SecretKey {
        &self.e_device_key
    }

    /// Encrypts one device-to-reader message, advancing the IV counter.
    pub fn encrypt_response(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, encryption::Error> {
        self.cipher.encrypt(&self.sk_device, plaintext, false)
    }
}
