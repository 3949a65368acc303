mod rate;
mod shipment;
mod timestamp;

pub use rate::{round_cents, RateQuote, UNAVAILABLE};
pub use shipment::{
    Address, Dimensions, Package, Party, ShipmentRequest, DEFAULT_COUNTRY, DEFAULT_PACKAGING_TYPE,
    MAX_PACKAGE_DIMENSION_IN, MAX_PACKAGE_WEIGHT_LB,
};
pub use timestamp::{add_business_days, format_date, UtcDateTime};
