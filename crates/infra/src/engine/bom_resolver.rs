use shopfloor_core::{DomainError, ProductId};
use shopfloor_inventory::Product;
use shopfloor_production::{ActiveBom, BillOfMaterials, BomLine};

use crate::store::ErpTransaction;

use super::EngineResult;

/// The active recipe of a product with the material record behind each line.
#[derive(Debug, Clone)]
pub struct ResolvedBom {
    pub bom: BillOfMaterials,
    /// Parallel to `bom.lines`.
    pub materials: Vec<Product>,
}

impl ResolvedBom {
    pub fn lines(&self) -> impl Iterator<Item = (&BomLine, &Product)> {
        self.bom.lines.iter().zip(self.materials.iter())
    }
}

/// Load the single active BOM for `product_id` together with its materials.
///
/// Fails with `NoActiveBom` (none, or no lines), `AmbiguousActiveBom`, or `NotFound`
/// when a line references a material that does not exist.
pub async fn resolve_active_bom(
    tx: &mut dyn ErpTransaction,
    product_id: ProductId,
) -> EngineResult<ResolvedBom> {
    let bom = ActiveBom::select(tx.boms_for_product(product_id).await?).require(product_id)?;

    let mut materials = Vec::with_capacity(bom.lines.len());
    for line in &bom.lines {
        let material = tx
            .product(line.material_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("material {}", line.material_id)))?;
        materials.push(material);
    }

    Ok(ResolvedBom { bom, materials })
}
