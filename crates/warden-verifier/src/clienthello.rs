//! # ClientHello Inspector
//!
//! Passive inspection of incoming TLS ClientHello messages. The inspector
//! never alters a handshake; it records what each client offered, derives a
//! deterministic JA4-style fingerprint and a FIPS-capability verdict, and
//! keeps a bounded ring of recent observations with aggregate counts.
//!
//! Fingerprint shape:
//!
//! ```text
//! t{version}_{cipher_count}_{alpn_or_00}_{hex6(sha256(sorted cipher ids))}
//! ```
//!
//! where `version` is the highest supported TLS version (`13`, `12`, ...),
//! `cipher_count` is zero-padded to two digits, `alpn_or_00` is the first
//! ALPN entry or `00`, and the trailing hash covers the sorted cipher ids
//! rendered as concatenated 4-digit hex, so the fingerprint is independent
//! of offer order.

use std::collections::VecDeque;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default ring-buffer capacity.
pub const DEFAULT_CAPACITY: usize = 1000;

// Cipher suite ids (IANA registry) the heuristic cares about.

/// AES-GCM suites: TLS 1.3 and the ECDHE/RSA TLS 1.2 families.
const AES_GCM_SUITES: &[u16] = &[
    0x1301, 0x1302, // TLS_AES_128/256_GCM
    0xC02B, 0xC02C, 0xC02F, 0xC030, // ECDHE_(ECDSA|RSA)_AES_(128|256)_GCM
    0x009C, 0x009D, // RSA_AES_(128|256)_GCM
];

/// ChaCha20-Poly1305 suites.
const CHACHA20_SUITES: &[u16] = &[0x1303, 0xCCA8, 0xCCA9, 0xCCAA];

/// Legacy suites that disqualify a client outright: RC4, 3DES, DES-CBC.
const BANNED_SUITES: &[u16] = &[
    0x0004, 0x0005, 0xC007, 0xC011, // RC4
    0x000A, 0xC008, 0xC012, // 3DES
    0x0009, 0x0015, // DES-CBC
];

/// IANA registry names for the suites the fleet actually encounters.
/// Unlisted ids render as raw hex.
pub fn cipher_suite_name(id: u16) -> Option<&'static str> {
    let name = match id {
        0x1301 => "TLS_AES_128_GCM_SHA256",
        0x1302 => "TLS_AES_256_GCM_SHA384",
        0x1303 => "TLS_CHACHA20_POLY1305_SHA256",
        0x1304 => "TLS_AES_128_CCM_SHA256",
        0x009C => "TLS_RSA_WITH_AES_128_GCM_SHA256",
        0x009D => "TLS_RSA_WITH_AES_256_GCM_SHA384",
        0xC02B => "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
        0xC02C => "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
        0xC02F => "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
        0xC030 => "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
        0xCCA8 => "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
        0xCCA9 => "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
        0xCCAA => "TLS_DHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
        0xC009 => "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA",
        0xC00A => "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA",
        0xC013 => "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
        0xC014 => "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
        0x002F => "TLS_RSA_WITH_AES_128_CBC_SHA",
        0x0035 => "TLS_RSA_WITH_AES_256_CBC_SHA",
        0x000A => "TLS_RSA_WITH_3DES_EDE_CBC_SHA",
        0xC008 => "TLS_ECDHE_ECDSA_WITH_3DES_EDE_CBC_SHA",
        0xC012 => "TLS_ECDHE_RSA_WITH_3DES_EDE_CBC_SHA",
        0x0004 => "TLS_RSA_WITH_RC4_128_MD5",
        0x0005 => "TLS_RSA_WITH_RC4_128_SHA",
        0xC007 => "TLS_ECDHE_ECDSA_WITH_RC4_128_SHA",
        0xC011 => "TLS_ECDHE_RSA_WITH_RC4_128_SHA",
        0x0009 => "TLS_RSA_WITH_DES_CBC_SHA",
        0x0015 => "TLS_DHE_RSA_WITH_DES_CBC_SHA",
        _ => return None,
    };
    Some(name)
}

/// Render a suite id for humans: registry name, or raw hex for the rest.
pub fn describe_cipher_suite(id: u16) -> String {
    match cipher_suite_name(id) {
        Some(name) => name.to_string(),
        None => format!("0x{id:04x}"),
    }
}

/// What the TLS stack hands the inspector for one ClientHello. The
/// callback that builds this must not block the handshake.
#[derive(Debug, Clone)]
pub struct ObservedHello {
    pub remote_addr: SocketAddr,
    pub server_name: Option<String>,
    pub cipher_suites: Vec<u16>,
    pub supported_versions: Vec<u16>,
    pub alpn: Vec<String>,
}

/// One recorded observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientHelloRecord {
    pub remote_addr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    pub cipher_suites: Vec<u16>,
    /// Registry names for `cipher_suites`, same order; raw hex for ids the
    /// registry does not cover.
    pub cipher_names: Vec<String>,
    /// Highest supported TLS version, wire encoding (e.g. `0x0304`).
    pub supported_version: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpn: Option<String>,
    pub fingerprint: String,
    /// `None` when the offer is indeterminate.
    pub fips_capable: Option<bool>,
    pub reason: String,
    pub observed_at: DateTime<Utc>,
}

/// Aggregate counts over the current ring contents plus the lifetime total.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HelloAggregates {
    /// Observations since process start (not bounded by the ring).
    pub total_observed: u64,
    /// Observations currently retained in the ring.
    pub retained: usize,
    pub fips_capable: usize,
    pub not_capable: usize,
    pub indeterminate: usize,
}

/// Bounded recorder of ClientHello observations. FIFO eviction once the
/// ring is full. The mutex is held only for queue mutation, never across
/// I/O.
#[derive(Debug)]
pub struct HelloInspector {
    ring: Mutex<RingState>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct RingState {
    records: VecDeque<ClientHelloRecord>,
    total_observed: u64,
}

impl HelloInspector {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(RingState::default()),
            capacity: capacity.max(1),
        }
    }

    /// Record one observed hello, returning the stored record.
    pub fn record(&self, hello: ObservedHello) -> ClientHelloRecord {
        let supported_version = hello.supported_versions.iter().copied().max().unwrap_or(0);
        let (fips_capable, reason) = fips_capability(&hello.cipher_suites);
        let record = ClientHelloRecord {
            remote_addr: hello.remote_addr.to_string(),
            sni: hello.server_name,
            fingerprint: fingerprint(
                supported_version,
                &hello.cipher_suites,
                hello.alpn.first().map(String::as_str),
            ),
            cipher_names: hello
                .cipher_suites
                .iter()
                .map(|id| describe_cipher_suite(*id))
                .collect(),
            cipher_suites: hello.cipher_suites,
            supported_version,
            alpn: hello.alpn.into_iter().next(),
            fips_capable,
            reason,
            observed_at: Utc::now(),
        };

        let mut ring = self.ring.lock();
        ring.total_observed += 1;
        if ring.records.len() == self.capacity {
            ring.records.pop_front();
        }
        ring.records.push_back(record.clone());
        record
    }

    /// Most recent observations, newest last, up to `limit`.
    pub fn recent(&self, limit: usize) -> Vec<ClientHelloRecord> {
        let ring = self.ring.lock();
        let skip = ring.records.len().saturating_sub(limit);
        ring.records.iter().skip(skip).cloned().collect()
    }

    /// Aggregate counts over the retained ring plus the lifetime total.
    pub fn aggregates(&self) -> HelloAggregates {
        let ring = self.ring.lock();
        let mut agg = HelloAggregates {
            total_observed: ring.total_observed,
            retained: ring.records.len(),
            ..Default::default()
        };
        for record in &ring.records {
            match record.fips_capable {
                Some(true) => agg.fips_capable += 1,
                Some(false) => agg.not_capable += 1,
                None => agg.indeterminate += 1,
            }
        }
        agg
    }
}

impl Default for HelloInspector {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic JA4-style fingerprint over one hello.
pub fn fingerprint(version: u16, cipher_suites: &[u16], alpn: Option<&str>) -> String {
    let version_label = match version {
        0x0304 => "13",
        0x0303 => "12",
        0x0302 => "11",
        0x0301 => "10",
        _ => "00",
    };

    let mut sorted = cipher_suites.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let mut concat = String::with_capacity(sorted.len() * 4);
    for id in &sorted {
        concat.push_str(&format!("{id:04x}"));
    }
    let digest = Sha256::digest(concat.as_bytes());
    let hash6 = &hex::encode(digest)[..6];

    format!(
        "t{version_label}_{:02}_{}_{hash6}",
        cipher_suites.len(),
        alpn.filter(|a| !a.is_empty()).unwrap_or("00"),
    )
}

/// FIPS-capability heuristic over the offered cipher suites.
///
/// Rules, in order: any banned legacy suite disqualifies; AES-GCM without
/// ChaCha20 qualifies; offering ChaCha20 disqualifies (the client prefers a
/// non-approved AEAD); no AES-GCM at all disqualifies.
pub fn fips_capability(cipher_suites: &[u16]) -> (Option<bool>, String) {
    let has = |set: &[u16]| cipher_suites.iter().any(|id| set.contains(id));

    let banned: Vec<String> = cipher_suites
        .iter()
        .filter(|id| BANNED_SUITES.contains(id))
        .map(|id| describe_cipher_suite(*id))
        .collect();
    if !banned.is_empty() {
        return (
            Some(false),
            format!("legacy cipher suites offered: {}", banned.join(", ")),
        );
    }

    let has_chacha = has(CHACHA20_SUITES);
    let has_aes_gcm = has(AES_GCM_SUITES);

    if !has_chacha && has_aes_gcm {
        (Some(true), "No ChaCha20; AES-GCM offered".into())
    } else if has_chacha {
        (Some(false), "ChaCha20-Poly1305 offered".into())
    } else if !has_aes_gcm {
        (Some(false), "no AES-GCM suite offered".into())
    } else {
        (None, "indeterminate cipher offer".into())
    }
}
