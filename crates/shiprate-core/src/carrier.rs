use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Carrier brands with a live rate API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarrierId {
    Ups,
    Fedex,
}

impl CarrierId {
    pub const ALL: [Self; 2] = [Self::Ups, Self::Fedex];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ups => "ups",
            Self::Fedex => "fedex",
        }
    }

    /// Brand name as it appears on quotes and in error messages.
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Ups => "UPS",
            Self::Fedex => "FedEx",
        }
    }
}

impl Display for CarrierId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Which carriers a rate request should fan out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarrierSelector {
    Ups,
    Fedex,
    All,
}

impl CarrierSelector {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ups => "ups",
            Self::Fedex => "fedex",
            Self::All => "all",
        }
    }

    /// Active carriers in fan-out order.
    pub const fn carriers(self) -> &'static [CarrierId] {
        match self {
            Self::Ups => &[CarrierId::Ups],
            Self::Fedex => &[CarrierId::Fedex],
            Self::All => &CarrierId::ALL,
        }
    }

    pub fn includes(self, carrier: CarrierId) -> bool {
        self.carriers().contains(&carrier)
    }
}

impl Display for CarrierSelector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CarrierSelector {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ups" => Ok(Self::Ups),
            "fedex" => Ok(Self::Fedex),
            "all" => Ok(Self::All),
            _ => Err(ValidationError::InvalidCarrier {
                value: value.to_owned(),
            }),
        }
    }
}

impl From<CarrierId> for CarrierSelector {
    fn from(value: CarrierId) -> Self {
        match value {
            CarrierId::Ups => Self::Ups,
            CarrierId::Fedex => Self::Fedex,
        }
    }
}
