use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use fingerprint::{CodecMeta, Fingerprint};
use hashdb::HashDb;
use tracing::{debug, instrument};

use crate::client::{PeerId, TransferClient};
use crate::error::Error;
use crate::probe::{probe_peer, ProbeSuccess};

/// One fingerprint group: the peers that returned this fingerprint, ordered
/// fastest-first.
#[derive(Clone, Debug)]
pub struct Group {
    pub fingerprint: Fingerprint,
    pub sources: Vec<(PeerId, Duration)>,
    /// Codec hints from whichever probe in this group first reported them.
    pub codec_meta: Option<CodecMeta>,
}

impl Group {
    fn median_latency(&self) -> Duration {
        let mut sorted: Vec<Duration> = self.sources.iter().map(|(_, d)| *d).collect();
        sorted.sort();
        sorted[sorted.len() / 2]
    }
}

/// The full result of a [`verify`] call.
#[derive(Clone, Debug, Default)]
pub struct Report {
    pub groups: Vec<Group>,
    pub failures: Vec<(PeerId, Error)>,
}

impl Report {
    /// The group with the most sources, ties broken by lowest median probe
    /// latency (spec section 4.2).
    pub fn best_group(&self) -> Option<&Group> {
        self.groups.iter().max_by(|a, b| {
            a.sources
                .len()
                .cmp(&b.sources.len())
                .then_with(|| b.median_latency().cmp(&a.median_latency()))
        })
    }
}

/// Drives bounded-prefix probes against `candidates` concurrently and groups
/// them by resulting fingerprint (spec section 4.2). Each probe is isolated:
/// one candidate's failure or timeout never aborts the others.
///
/// Before probing, peers already known (via `hash_db`) to hold the
/// fingerprint that `(filename, size)` maps to are short-circuited: their
/// fingerprint is taken from the store rather than probed fresh. Every other
/// candidate is probed regardless.
#[instrument(skip(client, hash_db, cancel), fields(filename, size, candidates = candidates.len()))]
pub async fn verify(
    client: Arc<dyn TransferClient>,
    hash_db: &HashDb,
    filename: &str,
    size: u64,
    candidates: Vec<PeerId>,
    probe_timeout: Duration,
    cancel: Arc<cancel::Token>,
) -> Report {
    let key = hashdb::fingerprint_key(filename, size);
    let known_entry = hash_db.lookup_fingerprint(&key).await.ok().flatten();

    let known_peers: BTreeSet<PeerId> = match &known_entry {
        Some(entry) => hash_db
            .inventory_by_fingerprint(entry.fingerprint.kind(), entry.fingerprint.bytes())
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|row| PeerId::from(row.peer_id))
            .collect(),
        None => BTreeSet::new(),
    };

    let mut groups: Vec<Group> = Vec::new();
    let mut join_set = tokio::task::JoinSet::new();
    for peer in candidates {
        if known_peers.contains(&peer) {
            if let Some(entry) = &known_entry {
                debug!(peer = %peer, "short-circuiting probe via HashDB");
                insert(&mut groups, entry.fingerprint.clone(), peer, Duration::ZERO, None);
                continue;
            }
        }

        let client = Arc::clone(&client);
        let filename = filename.to_string();
        let cancel = Arc::clone(&cancel);
        join_set.spawn(async move {
            let result = probe_peer(client.as_ref(), &peer, &filename, size, probe_timeout, &cancel).await;
            (peer, result)
        });
    }

    let mut failures = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        let (peer, result) = joined.expect("probe task must not panic");
        match result {
            Ok(success) => insert(&mut groups, success.fingerprint, peer, success.duration, success.codec_meta),
            Err(e) => failures.push((peer, e)),
        }
    }
    for group in &mut groups {
        group.sources.sort_by_key(|(_, d)| *d);
    }

    Report { groups, failures }
}

fn insert(
    groups: &mut Vec<Group>,
    fingerprint: Fingerprint,
    peer: PeerId,
    duration: Duration,
    codec_meta: Option<CodecMeta>,
) {
    if let Some(group) = groups.iter_mut().find(|g| g.fingerprint == fingerprint) {
        group.sources.push((peer, duration));
        if group.codec_meta.is_none() {
            group.codec_meta = codec_meta;
        }
    } else {
        groups.push(Group {
            fingerprint,
            sources: vec![(peer, duration)],
            codec_meta,
        });
    }
}
