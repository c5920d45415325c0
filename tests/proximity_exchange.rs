//! A full proximity exchange against an in-memory reader: engagement over a
//! simulated QR code, BLE framing over channels, and both directions of the
//! encrypted session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use coset::CborSerializable;
use tokio::sync::mpsc;
use uuid::Uuid;

use mdoc_proximity::definitions::device_request::create_pid_device_request;
use mdoc_proximity::definitions::engagement::{
    BleRetrievalOptions, BleUuid, DeviceEngagement, DeviceRetrievalMethod, EngagementUri,
    ReaderEngagement, Security, CIPHER_SUITE_IDENTIFIER,
};
use mdoc_proximity::definitions::helpers::{NonEmptyVec, Tag24};
use mdoc_proximity::definitions::session::{
    create_p256_ephemeral_keys, derive_session_key, get_shared_secret, Handover, SessionTranscript,
};
use mdoc_proximity::presentation::ProximityService;
use mdoc_proximity::transport::ble::{self, BleCentral};
use mdoc_proximity::transport::{MessageAssembler, SessionCipher};

const MTU: usize = 23;

struct MockBle {
    to_reader: mpsc::UnboundedSender<Vec<u8>>,
    from_reader: mpsc::UnboundedReceiver<Vec<u8>>,
    connected: Arc<AtomicBool>,
    subscribed: bool,
}

#[async_trait]
impl BleCentral for MockBle {
    fn mtu(&self) -> usize {
        MTU
    }

    async fn init(&mut self, _service_uuid: Uuid) -> Result<(), ble::Error> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn write_state(&mut self, _marker: u8) -> Result<(), ble::Error> {
        Ok(())
    }

    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), ble::Error> {
        self.to_reader
            .send(chunk.to_vec())
            .map_err(|_| ble::Error::Transport(anyhow!("reader hung up")))
    }

    async fn subscribe(&mut self) -> Result<(), ble::Error> {
        self.subscribed = true;
        Ok(())
    }

    async fn next_notification(&mut self) -> Result<Vec<u8>, ble::Error> {
        assert!(self.subscribed, "notification received before subscribing");
        self.from_reader
            .recv()
            .await
            .ok_or_else(|| ble::Error::Transport(anyhow!("reader hung up")))
    }
}

struct Harness {
    ble: MockBle,
    reader_chunks: mpsc::UnboundedReceiver<Vec<u8>>,
    notifications: mpsc::UnboundedSender<Vec<u8>>,
    connected: Arc<AtomicBool>,
}

fn harness() -> Harness {
    let (to_reader, reader_chunks) = mpsc::unbounded_channel();
    let (notifications, from_reader) = mpsc::unbounded_channel();
    let connected = Arc::new(AtomicBool::new(false));
    Harness {
        ble: MockBle {
            to_reader,
            from_reader,
            connected: Arc::clone(&connected),
            subscribed: false,
        },
        reader_chunks,
        notifications,
        connected,
    }
}

fn reader_engagement(key: &mdoc_proximity::definitions::CoseKey) -> ReaderEngagement {
    ReaderEngagement {
        version: "1.0".to_string(),
        security: Security(CIPHER_SUITE_IDENTIFIER, Tag24::new(key.clone()).unwrap()),
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
    }
}

fn engagement_uri(engagement: &ReaderEngagement) -> EngagementUri {
    let bytes = engagement.clone().to_vec().unwrap();
    let uri = format!(
        "mdoc://{}",
        base64::encode_config(bytes, base64::URL_SAFE_NO_PAD)
    );
    EngagementUri::from_string(&uri).unwrap()
}

async fn assemble(chunks: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<u8> {
    let mut assembler = MessageAssembler::new();
    loop {
        let chunk = chunks.recv().await.expect("device hung up");
        if let Some(message) = assembler.absorb(&chunk).unwrap() {
            return message;
        }
    }
}

#[tokio::test]
async fn full_exchange() {
    let mut harness = harness();
    let (reader_secret, reader_public) = create_p256_ephemeral_keys().unwrap();
    let engagement = reader_engagement(&reader_public);
    let uri = engagement_uri(&engagement);
    let reader_engagement_bytes =
        ReaderEngagement::from_engagement_uri(&uri).unwrap();

    let notifications = harness.notifications.clone();
    let mut reader_chunks = harness.reader_chunks;
    let reader = tokio::spawn(async move {
        // receive the device engagement and bind the transcript to its bytes
        let engagement_bytes = assemble(&mut reader_chunks).await;
        let device_engagement =
            Tag24::<DeviceEngagement>::from_bytes(engagement_bytes).unwrap();
        let device_key = device_engagement.as_ref().security.key_bytes().as_ref().clone();
        let transcript = Tag24::new(SessionTranscript(
            device_engagement,
            reader_engagement_bytes,
            Handover::Qr,
        ))
        .unwrap();

        let shared =
            get_shared_secret(device_key, &reader_secret.to_nonzero_scalar()).unwrap();
        let sk_reader = derive_session_key(&shared, &transcript, true).unwrap();
        let sk_device = derive_session_key(&shared, &transcript, false).unwrap();

        let request = create_pid_device_request().unwrap().to_cbor().unwrap();
        let encrypted = SessionCipher::new()
            .encrypt(&sk_reader, &request, true)
            .unwrap();
        for chunk in ble::chunk_bytes(&encrypted, MTU).unwrap() {
            notifications.send(chunk).unwrap();
        }

        // receive and decrypt the device's response
        let response = assemble(&mut reader_chunks).await;
        SessionCipher::new()
            .decrypt(&sk_device, &response, false)
            .unwrap()
    });

    let mut service = ProximityService::new(harness.ble);
    let mut session = service
        .handle_reader_engagement(&uri)
        .await
        .unwrap()
        .expect("expected a request before the timeout");

    assert!(harness.connected.load(Ordering::SeqCst));
    let request = session.request();
    assert_eq!(request.version, "1.0");
    let items = request.doc_requests[0].items_request.as_ref();
    assert_eq!(items.doc_type.as_ref(), "eu.europa.ec.eudi.pid.1");

    let response = b"device response plaintext".to_vec();
    let encrypted = session.encrypt_response(&response).unwrap();
    service.send(&encrypted).await.unwrap();
    drop(service);

    let decrypted = reader.await.unwrap();
    assert_eq!(decrypted, response);
}

#[tokio::test]
async fn silent_reader_times_out_softly() {
    let harness = harness();
    // keep the notification sender alive so the device just waits
    let _notifications = harness.notifications;
    let (_, reader_public) = create_p256_ephemeral_keys().unwrap();
    let uri = engagement_uri(&reader_engagement(&reader_public));

    let mut service =
        ProximityService::with_timeout(harness.ble, Duration::from_millis(50));
    let session = service.handle_reader_engagement(&uri).await.unwrap();
    assert!(session.is_none());

    // the connection is left to the caller
    let ble = service.into_inner();
    assert!(ble.connected.load(Ordering::SeqCst));
}

#[tokio::test]
async fn peripheral_only_engagement_fails_before_connecting() {
    let harness = harness();
    let (_, reader_public) = create_p256_ephemeral_keys().unwrap();
    let mut engagement = reader_engagement(&reader_public);
    engagement.device_retrieval_methods[0]
        .ble_options
        .central_client_mode_supported = false;
    engagement.device_retrieval_methods[0]
        .ble_options
        .peripheral_server_mode_supported = true;
    let uri = engagement_uri(&engagement);

    let mut service = ProximityService::new(harness.ble);
    assert!(service.handle_reader_engagement(&uri).await.is_err());
    assert!(!harness.connected.load(Ordering::SeqCst));
}
