use serde::{Deserialize, Serialize};

/// Acknowledgement of an accepted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceipt {
    /// Brokerage order id.
    pub order_id: String,
}

impl OrderReceipt {
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
        }
    }
}

/// Outcome of a close-all-positions request.
///
/// Both counters are zero when there was nothing left to close, which is the
/// normal result of repeating the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseOutAck {
    /// Pending orders (typically protective legs) that were cancelled.
    pub cancelled_orders: usize,
    /// Open positions flattened with an opposite market order.
    pub closed_positions: usize,
}

impl CloseOutAck {
    pub fn is_empty(&self) -> bool {
        self.cancelled_orders == 0 && self.closed_positions == 0
    }
}
