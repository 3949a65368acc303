//! Deterministic synthetic rate estimator.
//!
//! Prices are derived from two inputs only: total package weight (base price)
//! and the numeric gap between the origin and destination zip codes (distance
//! proxy). Each carrier brand gets three tiers with increasing distance
//! factors and a flat per-tier surcharge. The surcharge steps are far above
//! cent rounding, so cost is strictly increasing with tier at any distance.

use std::sync::Arc;

use crate::{
    add_business_days, format_date, round_cents, CarrierId, CarrierSelector, Clock, RateQuote,
    ShipmentRequest,
};

const BASE_PRICE: f64 = 10.0;
const PRICE_PER_LB: f64 = 0.5;
const ZIP_DISTANCE_SCALE: f64 = 1000.0;

struct MockTier {
    id: &'static str,
    service_code: &'static str,
    service_name: &'static str,
    distance_factor: f64,
    surcharge: f64,
    transit_time: &'static str,
    business_days: u32,
}

const UPS_TIERS: [MockTier; 3] = [
    MockTier {
        id: "ups_ground",
        service_code: "03",
        service_name: "UPS Ground",
        distance_factor: 0.1,
        surcharge: 0.0,
        transit_time: "3-5 business days",
        business_days: 4,
    },
    MockTier {
        id: "ups_3day",
        service_code: "12",
        service_name: "UPS 3 Day Select",
        distance_factor: 0.2,
        surcharge: 2.0,
        transit_time: "3 business days",
        business_days: 3,
    },
    MockTier {
        id: "ups_2day",
        service_code: "02",
        service_name: "UPS 2nd Day Air",
        distance_factor: 0.3,
        surcharge: 4.0,
        transit_time: "2 business days",
        business_days: 2,
    },
];

const FEDEX_TIERS: [MockTier; 3] = [
    MockTier {
        id: "fedex_ground",
        service_code: "FEDEX_GROUND",
        service_name: "FedEx Ground",
        distance_factor: 0.09,
        surcharge: 0.0,
        transit_time: "3-5 business days",
        business_days: 4,
    },
    MockTier {
        id: "fedex_express",
        service_code: "FEDEX_EXPRESS_SAVER",
        service_name: "FedEx Express Saver",
        distance_factor: 0.25,
        surcharge: 2.0,
        transit_time: "3 business days",
        business_days: 3,
    },
    MockTier {
        id: "fedex_2day",
        service_code: "FEDEX_2_DAY",
        service_name: "FedEx 2Day",
        distance_factor: 0.35,
        surcharge: 4.0,
        transit_time: "2 business days",
        business_days: 2,
    },
];

/// Offline quote estimator; no network access and no randomness.
#[derive(Clone)]
pub struct MockRateGenerator {
    clock: Arc<dyn Clock>,
}

impl MockRateGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Quotes for every carrier in `selector`, sorted by ascending cost.
    pub fn generate(&self, selector: CarrierSelector, shipment: &ShipmentRequest) -> Vec<RateQuote> {
        let mut quotes: Vec<RateQuote> = selector
            .carriers()
            .iter()
            .flat_map(|carrier| self.quotes_for(*carrier, shipment))
            .collect();
        RateQuote::sort_by_cost(&mut quotes);
        quotes
    }

    /// The three tiers of one carrier, economy first.
    pub fn quotes_for(&self, carrier: CarrierId, shipment: &ShipmentRequest) -> Vec<RateQuote> {
        let tiers = match carrier {
            CarrierId::Ups => &UPS_TIERS,
            CarrierId::Fedex => &FEDEX_TIERS,
        };
        let base = base_price(shipment);
        let distance = zip_distance(shipment);
        let today = self.clock.now().date();

        tiers
            .iter()
            .map(|tier| RateQuote {
                id: tier.id.to_owned(),
                carrier: carrier.display_name().to_owned(),
                service_code: tier.service_code.to_owned(),
                service_name: tier.service_name.to_owned(),
                cost: round_cents(base + distance * tier.distance_factor + tier.surcharge),
                currency: String::from("USD"),
                transit_time: tier.transit_time.to_owned(),
                delivery_date: None,
                estimated_delivery: Some(format_date(add_business_days(
                    today,
                    tier.business_days,
                ))),
            })
            .collect()
    }
}

/// `10 + 0.5 * total weight`.
pub fn base_price(shipment: &ShipmentRequest) -> f64 {
    BASE_PRICE + shipment.total_weight() * PRICE_PER_LB
}

/// Absolute difference of the zip codes' digit values, scaled down by 1000.
pub fn zip_distance(shipment: &ShipmentRequest) -> f64 {
    let origin = shipment.shipper().address().zip_numeric();
    let destination = shipment.recipient().address().zip_numeric();
    origin.abs_diff(destination) as f64 / ZIP_DISTANCE_SCALE
}
