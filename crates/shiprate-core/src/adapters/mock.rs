use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::carrier_adapter::{CarrierAdapter, CarrierError, RateBatch};
use crate::{CarrierId, MockRateGenerator, ShipmentRequest};

/// Offline stand-in for one carrier brand, backed by [`MockRateGenerator`].
pub struct MockCarrierAdapter {
    carrier: CarrierId,
    generator: MockRateGenerator,
    rate_calls: AtomicUsize,
}

impl MockCarrierAdapter {
    pub fn new(carrier: CarrierId, generator: MockRateGenerator) -> Self {
        Self {
            carrier,
            generator,
            rate_calls: AtomicUsize::new(0),
        }
    }

    /// Number of `rates` calls served so far.
    pub fn rate_calls(&self) -> usize {
        self.rate_calls.load(Ordering::SeqCst)
    }
}

impl CarrierAdapter for MockCarrierAdapter {
    fn carrier(&self) -> CarrierId {
        self.carrier
    }

    fn authenticate<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<String, CarrierError>> + Send + 'a>> {
        Box::pin(async move { Ok(format!("mock-{}", self.carrier.as_str())) })
    }

    fn rates<'a>(
        &'a self,
        shipment: &'a ShipmentRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RateBatch, CarrierError>> + Send + 'a>> {
        Box::pin(async move {
            self.rate_calls.fetch_add(1, Ordering::SeqCst);
            let quotes = self.generator.quotes_for(self.carrier, shipment);
            Ok(RateBatch::new(self.carrier, quotes))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{Address, Dimensions, FixedClock, Package, Party, UtcDateTime};

    #[tokio::test]
    async fn mock_adapter_serves_generator_tiers_and_always_connects() {
        let clock = Arc::new(FixedClock::new(
            UtcDateTime::parse("2024-03-04T10:00:00Z").expect("valid"),
        ));
        let adapter = MockCarrierAdapter::new(CarrierId::Fedex, MockRateGenerator::new(clock));
        let party = |zip: &str| {
            Party::new(
                "Ann",
                Address::new("1 Main St", "Town", "CA", zip, "US").expect("address"),
                None,
            )
            .expect("party")
        };
        let shipment = ShipmentRequest::new(
            party("90210"),
            party("10001"),
            vec![Package::new(5.0, Dimensions::new(1.0, 1.0, 1.0).expect("dims")).expect("pkg")],
        )
        .expect("shipment");

        let batch = adapter.rates(&shipment).await.expect("rates");

        assert_eq!(batch.quotes.len(), 3);
        assert!(batch.quotes.iter().all(|quote| quote.carrier == "FedEx"));
        assert!(batch.raw_response.is_none());
        assert_eq!(adapter.rate_calls(), 1);
        assert!(adapter.test_connection().await);
    }
}
