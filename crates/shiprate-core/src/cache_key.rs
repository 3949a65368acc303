use std::fmt::{Display, Formatter};
use std::hash::Hasher;

use serde::Serialize;
use siphasher::sip128::{Hasher128, SipHasher13};

use crate::{CarrierSelector, ShipmentRequest};

/// Fixed key so digests are stable across processes and restarts.
const CACHE_KEY_SEED: [u8; 16] = [0; 16];

/// 128-bit digest of the cache-relevant shape of a rate request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheKeyInput<'a> {
    carrier: &'static str,
    shipper_zip: &'a str,
    recipient_zip: &'a str,
    packages: Vec<PackageShape>,
}

#[derive(Serialize)]
struct PackageShape {
    weight: f64,
    dimensions: [f64; 3],
}

/// Derives the cache key from carrier selector, both zip codes and the
/// ordered package weights and dimensions. Names, streets and declared
/// values do not participate.
pub fn cache_key_for(selector: CarrierSelector, shipment: &ShipmentRequest) -> CacheKey {
    let input = CacheKeyInput {
        carrier: selector.as_str(),
        shipper_zip: shipment.shipper().address().zip_code(),
        recipient_zip: shipment.recipient().address().zip_code(),
        packages: shipment
            .packages()
            .iter()
            .map(|package| {
                let dimensions = package.dimensions();
                PackageShape {
                    weight: package.weight(),
                    dimensions: [dimensions.length(), dimensions.width(), dimensions.height()],
                }
            })
            .collect(),
    };

    // Validated shipments only hold finite numbers, which always serialize.
    let canonical = serde_json::to_vec(&input).unwrap_or_default();

    let mut hasher = SipHasher13::new_with_key(&CACHE_KEY_SEED);
    hasher.write(&canonical);
    CacheKey(hex::encode(hasher.finish128().as_bytes()))
}
