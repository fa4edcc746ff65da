use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use shopfloor_core::{BomId, DomainError, DomainResult, ProductId};

/// One material line: consumption per finished unit plus a waste allowance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomLine {
    pub material_id: ProductId,
    /// Quantity of material per finished unit (exact decimal).
    pub quantity: Decimal,
    /// Extra consumption allowance, 0–100.
    pub waste_pct: Decimal,
}

impl BomLine {
    /// Material units to issue for `produced` finished units.
    pub fn required_for(&self, produced: i64) -> DomainResult<i64> {
        required_quantity(self.quantity, self.waste_pct, produced)
    }
}

/// A versioned recipe for one finished product. Lines keep their recipe order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillOfMaterials {
    pub id: BomId,
    pub product_id: ProductId,
    pub version: String,
    pub active: bool,
    pub lines: Vec<BomLine>,
}

/// Result of selecting the active recipe among all versions of a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveBom {
    None,
    One(BillOfMaterials),
    Ambiguous(usize),
}

impl ActiveBom {
    /// Pick the active version from `boms`; more than one active version is ambiguous.
    pub fn select(boms: impl IntoIterator<Item = BillOfMaterials>) -> Self {
        let mut active: Vec<BillOfMaterials> = boms.into_iter().filter(|b| b.active).collect();
        match active.len() {
            0 => ActiveBom::None,
            1 => ActiveBom::One(active.remove(0)),
            n => ActiveBom::Ambiguous(n),
        }
    }

    /// The single usable recipe, or the reason production cannot proceed.
    ///
    /// An active recipe without lines is treated like a missing one.
    pub fn require(self, product_id: ProductId) -> DomainResult<BillOfMaterials> {
        match self {
            ActiveBom::One(bom) if !bom.lines.is_empty() => Ok(bom),
            ActiveBom::One(_) | ActiveBom::None => Err(DomainError::NoActiveBom { product_id }),
            ActiveBom::Ambiguous(count) => Err(DomainError::AmbiguousActiveBom { product_id, count }),
        }
    }
}

/// `ceil(per_unit * produced * (1 + waste_pct / 100))`.
///
/// Rounds up so material is never under-issued relative to the waste allowance.
pub fn required_quantity(per_unit: Decimal, waste_pct: Decimal, produced: i64) -> DomainResult<i64> {
    if per_unit.is_sign_negative() && !per_unit.is_zero() {
        return Err(DomainError::validation("BOM quantity cannot be negative"));
    }
    if waste_pct < Decimal::ZERO || waste_pct > Decimal::ONE_HUNDRED {
        return Err(DomainError::validation("waste percentage must be between 0 and 100"));
    }
    if produced < 0 {
        return Err(DomainError::validation("produced quantity cannot be negative"));
    }

    let overflow = || DomainError::validation("material requirement overflows");
    let factor = Decimal::ONE
        .checked_add(waste_pct.checked_div(Decimal::ONE_HUNDRED).ok_or_else(overflow)?)
        .ok_or_else(overflow)?;
    let exact = per_unit
        .checked_mul(Decimal::from(produced))
        .and_then(|v| v.checked_mul(factor))
        .ok_or_else(overflow)?;

    exact.ceil().to_i64().ok_or_else(overflow)
}

/// Material need for a quantity of finished goods, one entry per recipe line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRequirement {
    pub material_id: ProductId,
    pub per_unit_qty: Decimal,
    pub waste_pct: Decimal,
    pub required_qty: i64,
}

/// Scale every line of `bom` to `produced` finished units.
pub fn requirements_for(bom: &BillOfMaterials, produced: i64) -> DomainResult<Vec<MaterialRequirement>> {
    bom.lines
        .iter()
        .map(|line| {
            Ok(MaterialRequirement {
                material_id: line.material_id,
                per_unit_qty: line.quantity,
                waste_pct: line.waste_pct,
                required_qty: line.required_for(produced)?,
            })
        })
        .collect()
}
