//! Integration tests against the public `mesh` API: two independent
//! [`HashDb`] instances synced over an in-process transport, driven only
//! through `run_initiator`/`run_responder`/`request_key` (the crate's
//! private wire/session internals are not visible here).

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use fingerprint::{Fingerprint, Kind};
use hashdb::HashDb;
use mesh::{request_key, run_initiator, run_responder, MeshConfig, MeshTransport, NeighborId, PeerViolations};

struct PairedTransport {
    outbox: Mutex<VecDeque<Vec<u8>>>,
    inbox: Mutex<VecDeque<Vec<u8>>>,
}

struct Endpoint {
    shared: std::sync::Arc<PairedTransport>,
    send_to_outbox: bool,
}

fn paired() -> (Endpoint, Endpoint) {
    let shared = std::sync::Arc::new(PairedTransport {
        outbox: Mutex::new(VecDeque::new()),
        inbox: Mutex::new(VecDeque::new()),
    });
    (
        Endpoint { shared: shared.clone(), send_to_outbox: true },
        Endpoint { shared, send_to_outbox: false },
    )
}

#[async_trait]
impl MeshTransport for Endpoint {
    async fn send(&mut self, frame: &[u8]) -> mesh::Result<()> {
        let queue = if self.send_to_outbox { &self.shared.outbox } else { &self.shared.inbox };
        queue.lock().unwrap().push_back(frame.to_vec());
        Ok(())
    }

    async fn recv(&mut self) -> mesh::Result<Option<Vec<u8>>> {
        let queue = if self.send_to_outbox { &self.shared.inbox } else { &self.shared.outbox };
        for _ in 0..200 {
            if let Some(frame) = queue.lock().unwrap().pop_front() {
                return Ok(Some(frame));
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        Ok(None)
    }
}

#[tokio::test]
async fn two_hashdbs_converge_over_a_full_sync_session() {
    let responder_db = HashDb::open_in_memory().await.unwrap();
    let initiator_db = HashDb::open_in_memory().await.unwrap();

    for i in 0..3u64 {
        let fp = Fingerprint::from_parts(Kind::Sha256Prefix, vec![i as u8; 32]);
        let key = hashdb::fingerprint_key(&format!("track-{i}.mp3"), 1000);
        responder_db.store_fingerprint(&key, &fp, 1000, 0).await.unwrap();
    }

    let (mut initiator_t, mut responder_t) = paired();
    let config = MeshConfig::default();

    let responder_task = tokio::spawn(async move {
        run_responder(
            &mut responder_t,
            &NeighborId::from("initiator"),
            &responder_db,
            &MeshConfig::default(),
            &PeerViolations::new(),
            &cancel::Token::new(),
        )
        .await
    });

    let report = run_initiator(
        &mut initiator_t,
        &NeighborId::from("responder"),
        &initiator_db,
        &config,
        &PeerViolations::new(),
        &cancel::Token::new(),
    )
    .await
    .unwrap();
    responder_task.await.unwrap().unwrap();

    assert_eq!(report.entries_received, 3);
    for i in 0..3u64 {
        let key = hashdb::fingerprint_key(&format!("track-{i}.mp3"), 1000);
        assert!(initiator_db.lookup_fingerprint(&key).await.unwrap().is_some());
    }
    assert_eq!(initiator_db.peer_last_seq_seen("responder").await.unwrap(), 3);
}

#[tokio::test]
async fn request_key_round_trips_a_known_entry_and_returns_none_for_an_unknown_one() {
    let db = HashDb::open_in_memory().await.unwrap();
    let fp = Fingerprint::from_parts(Kind::Sha256Prefix, vec![9u8; 32]);
    let key = hashdb::fingerprint_key("known.mp3", 2048);
    db.store_fingerprint(&key, &fp, 2048, 0).await.unwrap();

    let (mut client_t, mut server_t) = paired();
    let config = MeshConfig::default();
    let lookup_key = key.clone();

    let server = tokio::spawn(async move {
        let request = match server_t.recv().await.unwrap() {
            Some(bytes) => mesh::Message::decode(&bytes).unwrap(),
            None => panic!("no request"),
        };
        let mesh::Message::ReqKey { key } = request else { panic!("expected ReqKey") };
        assert_eq!(key, lookup_key);
        let looked_up = db.lookup_fingerprint(&key).await.unwrap();
        let response = mesh::Message::RespKey {
            key,
            fingerprint: looked_up.as_ref().map(|e| e.fingerprint.clone()),
            size: looked_up.as_ref().map(|e| e.size),
        };
        server_t.send(&response.encode().unwrap()).await.unwrap();

        let request = match server_t.recv().await.unwrap() {
            Some(bytes) => mesh::Message::decode(&bytes).unwrap(),
            None => panic!("no second request"),
        };
        let mesh::Message::ReqKey { key } = request else { panic!("expected ReqKey") };
        let response = mesh::Message::RespKey { key, fingerprint: None, size: None };
        server_t.send(&response.encode().unwrap()).await.unwrap();
    });

    let found = request_key(&mut client_t, &key, &config).await.unwrap();
    let entry = found.expect("known key should resolve");
    assert_eq!(entry.fingerprint, fp);
    assert_eq!(entry.size, 2048);

    let missing = request_key(&mut client_t, "ghost.mp3:1", &config).await.unwrap();
    assert!(missing.is_none());

    server.await.unwrap();
}
