use serde::{Deserialize, Serialize};

use shopfloor_core::{DomainError, DomainResult, ProductId, WarehouseId};

/// Stock ledger key: one row per (product, warehouse).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
}

impl StockKey {
    pub fn new(product_id: ProductId, warehouse_id: WarehouseId) -> Self {
        Self {
            product_id,
            warehouse_id,
        }
    }
}

/// Quantity-on-hand and quantity-available of one product at one warehouse.
///
/// Rows are created lazily on first receipt and never deleted, only zeroed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    /// On-hand quantity. Never negative.
    pub quantity: i64,
    /// On-hand minus reserved.
    pub available_qty: i64,
}

impl StockLevel {
    /// Zero row for a key that has never received stock.
    pub fn empty(key: StockKey) -> Self {
        Self {
            product_id: key.product_id,
            warehouse_id: key.warehouse_id,
            quantity: 0,
            available_qty: 0,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.warehouse_id)
    }

    /// Whether `required` units can be issued without driving on-hand negative.
    pub fn covers(&self, required: i64) -> bool {
        self.quantity >= required
    }

    /// Remove `qty` units from on-hand and available.
    ///
    /// Callers check `covers` first so they can report the shortfall with context; this
    /// guard only protects the non-negative invariant.
    pub fn issue(&mut self, qty: i64) -> DomainResult<()> {
        if qty <= 0 {
            return Err(DomainError::validation("issued quantity must be positive"));
        }
        if !self.covers(qty) {
            return Err(DomainError::invariant("stock cannot go negative"));
        }
        self.quantity -= qty;
        self.available_qty -= qty;
        Ok(())
    }

    /// Add `qty` units to on-hand and available.
    pub fn receive(&mut self, qty: i64) -> DomainResult<()> {
        if qty <= 0 {
            return Err(DomainError::validation("received quantity must be positive"));
        }
        self.quantity = self
            .quantity
            .checked_add(qty)
            .ok_or_else(|| DomainError::validation("stock quantity overflow"))?;
        self.available_qty = self
            .available_qty
            .checked_add(qty)
            .ok_or_else(|| DomainError::validation("stock quantity overflow"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn level(quantity: i64) -> StockLevel {
        StockLevel {
            quantity,
            available_qty: quantity,
            ..StockLevel::empty(StockKey::new(ProductId::new(), WarehouseId::new()))
        }
    }

    #[test]
    fn issue_decrements_on_hand_and_available() {
        let mut s = level(500);
        s.issue(105).unwrap();
        assert_eq!(s.quantity, 395);
        assert_eq!(s.available_qty, 395);
    }

    #[test]
    fn issue_beyond_on_hand_is_rejected_without_mutation() {
        let mut s = level(10);
        let err = s.issue(11).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(s.quantity, 10);
    }

    #[test]
    fn non_positive_movements_are_rejected() {
        let mut s = level(10);
        assert!(s.issue(0).is_err());
        assert!(s.receive(-1).is_err());
    }

    #[test]
    fn receive_into_empty_row() {
        let mut s = StockLevel::empty(StockKey::new(ProductId::new(), WarehouseId::new()));
        s.receive(50).unwrap();
        assert_eq!((s.quantity, s.available_qty), (50, 50));
    }

    proptest! {
        /// Property: any sequence of movements that is accepted leaves on-hand non-negative
        /// and equal to the sum of accepted deltas.
        #[test]
        fn accepted_movements_never_drive_stock_negative(
            moves in prop::collection::vec((any::<bool>(), 1i64..1_000i64), 0..50)
        ) {
            let mut s = level(0);
            let mut expected = 0i64;
            for (is_receipt, qty) in moves {
                let result = if is_receipt { s.receive(qty) } else { s.issue(qty) };
                if result.is_ok() {
                    expected += if is_receipt { qty } else { -qty };
                }
                prop_assert!(s.quantity >= 0);
            }
            prop_assert_eq!(s.quantity, expected);
        }
    }
}
