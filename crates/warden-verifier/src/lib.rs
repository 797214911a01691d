//! # warden-verifier — Network Verification
//!
//! The parts of a compliance report that an agent cannot self-attest: what
//! the network edge is actually configured to do, and what TLS clients
//! actually offer on the wire.
//!
//! Two independent probes plus one collector:
//!
//! - [`remote`]: a caching client for a Cloudflare-style configuration API
//!   (`{success, errors, result}` envelopes) that turns zone TLS settings
//!   and certificate state into compliance items.
//! - [`clienthello`]: a passive inspector fed with observed TLS ClientHello
//!   summaries. It fingerprints each hello and derives a FIPS-capability
//!   verdict from the offered cipher suites, keeping a bounded ring of
//!   recent observations.
//! - [`posture`]: the in-memory device-posture collector fed by endpoint
//!   agents over the posture API.
//!
//! Probe failures degrade to `unknown` compliance items; they never fail
//! the caller.

pub mod clienthello;
pub mod posture;
pub mod remote;

pub use clienthello::{
    cipher_suite_name, describe_cipher_suite, ClientHelloRecord, HelloAggregates,
    HelloInspector, ObservedHello,
};
pub use posture::PostureCollector;
pub use remote::{EdgeApiClient, EdgeApiConfig};
