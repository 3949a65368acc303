use serde::{Deserialize, Serialize};

/// Sentinel for quote fields a carrier did not report.
pub const UNAVAILABLE: &str = "N/A";

/// A priced shipping service option, normalized across carriers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateQuote {
    pub id: String,
    /// Brand name, `UPS` or `FedEx`.
    pub carrier: String,
    pub service_code: String,
    pub service_name: String,
    pub cost: f64,
    pub currency: String,
    pub transit_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<String>,
}

impl RateQuote {
    /// Stable-sorts quotes by ascending cost; equal costs keep their order.
    pub fn sort_by_cost(quotes: &mut [RateQuote]) {
        quotes.sort_by(|left, right| left.cost.total_cmp(&right.cost));
    }
}

/// Rounds a currency amount to cents.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(id: &str, cost: f64) -> RateQuote {
        RateQuote {
            id: id.to_owned(),
            carrier: "UPS".to_owned(),
            service_code: "03".to_owned(),
            service_name: "UPS Ground".to_owned(),
            cost,
            currency: "USD".to_owned(),
            transit_time: UNAVAILABLE.to_owned(),
            delivery_date: None,
            estimated_delivery: None,
        }
    }

    #[test]
    fn sort_keeps_arrival_order_for_equal_costs() {
        let mut quotes = vec![quote("a", 20.0), quote("b", 10.0), quote("c", 10.0)];
        RateQuote::sort_by_cost(&mut quotes);
        let ids: Vec<&str> = quotes.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn serializes_with_camel_case_and_omits_missing_dates() {
        let json = serde_json::to_value(quote("ups_03", 12.5)).expect("serialize");
        assert_eq!(json["serviceCode"], "03");
        assert_eq!(json["transitTime"], "N/A");
        assert!(json.get("deliveryDate").is_none());
    }

    #[test]
    fn rounds_to_cents() {
        assert_eq!(round_cents(20.5209), 20.52);
        assert_eq!(round_cents(19.718_81), 19.72);
    }
}
