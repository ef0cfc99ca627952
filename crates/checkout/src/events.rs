//! Order completion events published to the message bus.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::model::OrderResult;

/// Events emitted once an order is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Payment taken and shipment created.
    OrderPlaced(OrderPlacedData),
}

impl OrderEvent {
    pub fn order_placed(order: OrderResult) -> Self {
        OrderEvent::OrderPlaced(OrderPlacedData {
            order,
            placed_at: Utc::now(),
        })
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
        }
    }

    /// Message key; events of one order land on the same partition.
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::OrderPlaced(data) => data.order.order_id,
        }
    }
}

/// Data for OrderPlaced event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order: OrderResult,
    pub placed_at: DateTime<Utc>,
}
