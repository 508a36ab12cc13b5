//! HMAC-SHA256 signing of individual samples
//!
//! The tag is computed over `"{id}:{kind}:{value}"` where a counter delta is
//! written as a plain integer and a gauge value with zero fractional digits
//! (`42.7` signs as `43`). Agent and server share this module so both sides
//! always agree on the canonical form.

use std::fmt;

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{MetricSample, MetricValue};

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies samples with a shared secret
///
/// Holds the MAC already keyed; every tag starts from a clone of it. HMAC
/// accepts keys of any length (long keys are hashed first), so building the
/// keyed state cannot fail.
#[derive(Clone)]
pub struct Signer {
    keyed: HmacSha256,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").field("key", &"<redacted>").finish()
    }
}

impl Signer {
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        let keyed = <HmacSha256 as KeyInit>::new_from_slice(key.as_ref())
            .unwrap_or_else(|_| unreachable!("HMAC takes keys of any length"));

        Self { keyed }
    }

    /// Lowercase hex HMAC tag of `sample`
    pub fn sign(&self, sample: &MetricSample) -> String {
        hex::encode(self.mac(sample).finalize().into_bytes())
    }

    /// Constant-time comparison of `tag` against the expected tag
    ///
    /// Malformed hex simply does not match.
    pub fn verify(&self, sample: &MetricSample, tag: &str) -> bool {
        let Ok(tag) = hex::decode(tag) else {
            return false;
        };

        self.mac(sample).verify_slice(&tag).is_ok()
    }

    fn mac(&self, sample: &MetricSample) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(canonical(sample).as_bytes());
        mac
    }
}

/// String the tag is computed over
pub fn canonical(sample: &MetricSample) -> String {
    match sample.value {
        MetricValue::Counter(delta) => format!("{}:counter:{}", sample.id, delta),
        MetricValue::Gauge(value) => format!("{}:gauge:{:.0}", sample.id, value),
    }
}

pub fn sign(sample: &MetricSample, key: &[u8]) -> String {
    Signer::new(key).sign(sample)
}

pub fn verify(sample: &MetricSample, tag: &str, key: &[u8]) -> bool {
    Signer::new(key).verify(sample, tag)
}
