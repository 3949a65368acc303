use serde::{Deserialize, Serialize};

use crate::ValidationError;

pub const MAX_PACKAGE_WEIGHT_LB: f64 = 150.0;
pub const MAX_PACKAGE_DIMENSION_IN: f64 = 108.0;
pub const DEFAULT_PACKAGING_TYPE: &str = "02";
pub const DEFAULT_COUNTRY: &str = "US";

/// Postal address with a validated US-style zip code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "AddressInput")]
pub struct Address {
    street: String,
    city: String,
    state: String,
    zip_code: String,
    country: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressInput {
    street: String,
    city: String,
    state: String,
    zip_code: String,
    #[serde(default)]
    country: Option<String>,
}

impl TryFrom<AddressInput> for Address {
    type Error = ValidationError;

    fn try_from(input: AddressInput) -> Result<Self, Self::Error> {
        Self::new(
            input.street,
            input.city,
            input.state,
            input.zip_code,
            input.country.unwrap_or_else(|| DEFAULT_COUNTRY.to_owned()),
        )
    }
}

impl Address {
    pub fn new(
        street: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        zip_code: impl Into<String>,
        country: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let street = non_empty(street.into(), "street")?;
        let city = non_empty(city.into(), "city")?;

        let state = state.into();
        if state.chars().count() != 2 {
            return Err(ValidationError::InvalidState { value: state });
        }

        let zip_code = zip_code.into();
        if !is_valid_zip(&zip_code) {
            return Err(ValidationError::InvalidZipCode { value: zip_code });
        }

        let country = country.into();
        if country.chars().count() != 2 {
            return Err(ValidationError::InvalidCountry { value: country });
        }

        Ok(Self {
            street,
            city,
            state,
            zip_code,
            country,
        })
    }

    pub fn street(&self) -> &str {
        &self.street
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn zip_code(&self) -> &str {
        &self.zip_code
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    /// Numeric value of the zip code's digits (`12345-6789` reads as `123456789`).
    pub fn zip_numeric(&self) -> u64 {
        self.zip_code
            .chars()
            .filter_map(|ch| ch.to_digit(10))
            .fold(0_u64, |acc, digit| acc * 10 + u64::from(digit))
    }
}

/// Shipper or recipient of a shipment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "PartyInput")]
pub struct Party {
    name: String,
    address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    account_number: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartyInput {
    name: String,
    address: Address,
    #[serde(default)]
    account_number: Option<String>,
}

impl TryFrom<PartyInput> for Party {
    type Error = ValidationError;

    fn try_from(input: PartyInput) -> Result<Self, Self::Error> {
        Self::new(input.name, input.address, input.account_number)
    }
}

impl Party {
    pub fn new(
        name: impl Into<String>,
        address: Address,
        account_number: Option<String>,
    ) -> Result<Self, ValidationError> {
        let name = non_empty(name.into(), "name")?;
        let account_number = account_number.filter(|value| !value.trim().is_empty());
        Ok(Self {
            name,
            address,
            account_number,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn account_number(&self) -> Option<&str> {
        self.account_number.as_deref()
    }
}

/// Package dimensions in inches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DimensionsInput")]
pub struct Dimensions {
    length: f64,
    width: f64,
    height: f64,
}

#[derive(Deserialize)]
struct DimensionsInput {
    length: f64,
    width: f64,
    height: f64,
}

impl TryFrom<DimensionsInput> for Dimensions {
    type Error = ValidationError;

    fn try_from(input: DimensionsInput) -> Result<Self, Self::Error> {
        Self::new(input.length, input.width, input.height)
    }
}

impl Dimensions {
    pub fn new(length: f64, width: f64, height: f64) -> Result<Self, ValidationError> {
        Ok(Self {
            length: dimension(length, "length")?,
            width: dimension(width, "width")?,
            height: dimension(height, "height")?,
        })
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }
}

/// One parcel of a shipment. Weight is in pounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "PackageInput")]
pub struct Package {
    weight: f64,
    dimensions: Dimensions,
    packaging_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    declared_value: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageInput {
    weight: f64,
    dimensions: Dimensions,
    #[serde(default)]
    packaging_type: Option<String>,
    #[serde(default)]
    declared_value: Option<f64>,
}

impl TryFrom<PackageInput> for Package {
    type Error = ValidationError;

    fn try_from(input: PackageInput) -> Result<Self, Self::Error> {
        let mut package = Self::new(input.weight, input.dimensions)?;
        if let Some(packaging_type) = input.packaging_type {
            package = package.with_packaging_type(packaging_type);
        }
        if let Some(declared_value) = input.declared_value {
            package = package.with_declared_value(declared_value)?;
        }
        Ok(package)
    }
}

impl Package {
    pub fn new(weight: f64, dimensions: Dimensions) -> Result<Self, ValidationError> {
        if !weight.is_finite() {
            return Err(ValidationError::NonFiniteValue { field: "weight" });
        }
        if weight <= 0.0 || weight > MAX_PACKAGE_WEIGHT_LB {
            return Err(ValidationError::WeightOutOfRange { value: weight });
        }

        Ok(Self {
            weight,
            dimensions,
            packaging_type: DEFAULT_PACKAGING_TYPE.to_owned(),
            declared_value: None,
        })
    }

    /// Blank codes fall back to customer-supplied packaging (`02`).
    pub fn with_packaging_type(mut self, packaging_type: impl Into<String>) -> Self {
        let packaging_type = packaging_type.into();
        if !packaging_type.trim().is_empty() {
            self.packaging_type = packaging_type;
        }
        self
    }

    pub fn with_declared_value(mut self, declared_value: f64) -> Result<Self, ValidationError> {
        if !declared_value.is_finite() {
            return Err(ValidationError::NonFiniteValue {
                field: "declaredValue",
            });
        }
        if declared_value < 0.0 {
            return Err(ValidationError::NegativeDeclaredValue {
                value: declared_value,
            });
        }
        self.declared_value = Some(declared_value);
        Ok(self)
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn dimensions(&self) -> &Dimensions {
        &self.dimensions
    }

    pub fn packaging_type(&self) -> &str {
        &self.packaging_type
    }

    pub fn declared_value(&self) -> Option<f64> {
        self.declared_value
    }
}

/// A validated shipment: who ships, who receives, and what.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ShipmentInput")]
pub struct ShipmentRequest {
    shipper: Party,
    recipient: Party,
    packages: Vec<Package>,
}

#[derive(Deserialize)]
struct ShipmentInput {
    shipper: Party,
    recipient: Party,
    packages: Vec<Package>,
}

impl TryFrom<ShipmentInput> for ShipmentRequest {
    type Error = ValidationError;

    fn try_from(input: ShipmentInput) -> Result<Self, Self::Error> {
        Self::new(input.shipper, input.recipient, input.packages)
    }
}

impl ShipmentRequest {
    pub fn new(
        shipper: Party,
        recipient: Party,
        packages: Vec<Package>,
    ) -> Result<Self, ValidationError> {
        if packages.is_empty() {
            return Err(ValidationError::EmptyPackages);
        }

        Ok(Self {
            shipper,
            recipient,
            packages,
        })
    }

    pub fn shipper(&self) -> &Party {
        &self.shipper
    }

    pub fn recipient(&self) -> &Party {
        &self.recipient
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn total_weight(&self) -> f64 {
        self.packages.iter().map(Package::weight).sum()
    }
}

fn non_empty(value: String, field: &'static str) -> Result<String, ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    Ok(value)
}

fn dimension(value: f64, field: &'static str) -> Result<f64, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value <= 0.0 || value > MAX_PACKAGE_DIMENSION_IN {
        return Err(ValidationError::DimensionOutOfRange { field, value });
    }
    Ok(value)
}

fn is_valid_zip(value: &str) -> bool {
    let bytes = value.as_bytes();
    let all_digits = |slice: &[u8]| slice.iter().all(u8::is_ascii_digit);
    match bytes.len() {
        5 => all_digits(bytes),
        10 => all_digits(&bytes[..5]) && bytes[5] == b'-' && all_digits(&bytes[6..]),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(zip: &str) -> Result<Address, ValidationError> {
        Address::new("1 Main St", "Springfield", "IL", zip, "US")
    }

    #[test]
    fn accepts_five_and_nine_digit_zips() {
        assert!(address("90210").is_ok());
        assert!(address("90210-1234").is_ok());
    }

    #[test]
    fn rejects_malformed_zips() {
        for zip in ["9021", "902100", "90210-12", "9021O", "90210 1234", ""] {
            let err = address(zip).expect_err("must fail");
            assert!(matches!(err, ValidationError::InvalidZipCode { .. }), "{zip}");
        }
    }

    #[test]
    fn zip_numeric_ignores_the_hyphen() {
        assert_eq!(address("12345-6789").expect("valid").zip_numeric(), 123_456_789);
        assert_eq!(address("01234").expect("valid").zip_numeric(), 1_234);
    }

    #[test]
    fn package_bounds_are_enforced() {
        let dims = Dimensions::new(10.0, 10.0, 10.0).expect("valid dims");
        assert!(Package::new(150.0, dims).is_ok());
        assert!(matches!(
            Package::new(0.0, dims),
            Err(ValidationError::WeightOutOfRange { .. })
        ));
        assert!(matches!(
            Package::new(150.5, dims),
            Err(ValidationError::WeightOutOfRange { .. })
        ));
        assert!(matches!(
            Dimensions::new(10.0, 108.1, 10.0),
            Err(ValidationError::DimensionOutOfRange { field: "width", .. })
        ));
        assert!(matches!(
            Dimensions::new(f64::NAN, 1.0, 1.0),
            Err(ValidationError::NonFiniteValue { field: "length" })
        ));
    }

    #[test]
    fn json_defaults_country_and_packaging() {
        let shipment: ShipmentRequest = serde_json::from_str(
            r#"{
                "shipper": {"name": "Ann", "address": {"street": "1 A St", "city": "Beverly Hills", "state": "CA", "zipCode": "90210"}},
                "recipient": {"name": "Bob", "address": {"street": "2 B Ave", "city": "New York", "state": "NY", "zipCode": "10001", "country": "US"}},
                "packages": [{"weight": 5, "dimensions": {"length": 10, "width": 8, "height": 6}}]
            }"#,
        )
        .expect("valid shipment");

        assert_eq!(shipment.shipper().address().country(), "US");
        assert_eq!(shipment.packages()[0].packaging_type(), "02");
        assert_eq!(shipment.shipper().account_number(), None);
    }

    #[test]
    fn json_with_no_packages_is_rejected() {
        let err = serde_json::from_str::<ShipmentRequest>(
            r#"{
                "shipper": {"name": "Ann", "address": {"street": "1 A St", "city": "LA", "state": "CA", "zipCode": "90210"}},
                "recipient": {"name": "Bob", "address": {"street": "2 B Ave", "city": "NYC", "state": "NY", "zipCode": "10001"}},
                "packages": []
            }"#,
        )
        .expect_err("must fail");
        assert!(err.to_string().contains("at least one package"));
    }
}
