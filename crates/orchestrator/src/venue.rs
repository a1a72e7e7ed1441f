use chrono::{DateTime, Utc};
use smm_core::{BrokerClient, ExecutionMode, FillEvent};
use smm_execution::PaperBroker;
use std::sync::Arc;

/// Where orders go: a live broker adapter supplied by the host, or the
/// in-process paper broker.
///
/// Paper fills are simulated by the trader itself on each tick, so the paper
/// variant keeps its concrete type instead of hiding behind the trait.
#[derive(Clone)]
pub enum ExecutionVenue {
    /// Live trading through the host's adapter
    Live(Arc<dyn BrokerClient>),
    /// Simulated fills, no orders leave the process
    Paper(Arc<PaperBroker>),
}

impl ExecutionVenue {
    #[must_use]
    pub fn paper() -> Self {
        Self::Paper(Arc::new(PaperBroker::new()))
    }

    #[must_use]
    pub const fn mode(&self) -> ExecutionMode {
        match self {
            Self::Live(_) => ExecutionMode::Live,
            Self::Paper(_) => ExecutionMode::Paper,
        }
    }

    /// The broker as the execution engine sees it.
    #[must_use]
    pub fn client(&self) -> Arc<dyn BrokerClient> {
        match self {
            Self::Live(client) => Arc::clone(client),
            Self::Paper(broker) => Arc::clone(broker) as Arc<dyn BrokerClient>,
        }
    }

    /// Simulated fills at `price`; live fills arrive from the broker instead.
    #[must_use]
    pub fn simulate_fills(&self, price: f64, timestamp: DateTime<Utc>) -> Vec<FillEvent> {
        match self {
            Self::Live(_) => Vec::new(),
            Self::Paper(broker) => broker.drain_fills(price, timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smm_core::{OrderRequest, Side};

    fn request() -> OrderRequest {
        OrderRequest {
            account_id: "A".to_string(),
            symbol: "NQH5".to_string(),
            side: Side::Buy,
            qty: 1,
            client_order_id: "A-000000000001".to_string(),
            target_ticks: 16,
            stop_ticks: 8,
        }
    }

    #[tokio::test]
    async fn test_paper_venue_fills_on_demand() {
        let venue = ExecutionVenue::paper();
        assert_eq!(venue.mode(), ExecutionMode::Paper);

        let client = venue.client();
        client.submit_order(&request()).await.unwrap();
        assert_eq!(client.list_orders().await.unwrap().len(), 1);

        let fills = venue.simulate_fills(20_000.0, Utc::now());
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].client_order_id, "A-000000000001");
        assert!(client.list_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_live_venue_never_simulates() {
        let venue = ExecutionVenue::Live(Arc::new(PaperBroker::new()));
        assert_eq!(venue.mode(), ExecutionMode::Live);
        let client = venue.client();
        client.submit_order(&request()).await.unwrap();
        assert!(venue.simulate_fills(20_000.0, Utc::now()).is_empty());
        assert_eq!(client.list_orders().await.unwrap().len(), 1);
    }
}
