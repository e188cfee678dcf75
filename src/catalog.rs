use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::model::{ItemId, UserId};

/// How a pending booking on this item gets confirmed. The two paths are
/// mutually exclusive per item: payment-driven confirmation or a manual
/// owner accept/decline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalMode {
    /// Confirmed by the payment processor callback.
    Automatic,
    /// Confirmed or declined by the owner, independent of payment.
    Manual,
}

/// What the item catalog tells us about an item. The catalog itself
/// (CRUD, categorization, search) lives outside this subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemMeta {
    pub owner_id: UserId,
    pub daily_rate: Decimal,
    /// ISO 4217 code passed through to the payment processor.
    pub currency: String,
    pub active: bool,
    pub approval: ApprovalMode,
}

/// Boundary with the item catalog collaborator.
#[async_trait]
pub trait ItemCatalog: Send + Sync {
    /// `None` when the item does not exist.
    async fn get_item(&self, id: ItemId) -> Option<ItemMeta>;
}

/// In-memory catalog for tests and embedded deployments.
pub struct StaticCatalog {
    items: DashMap<ItemId, ItemMeta>,
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
        }
    }

    pub fn insert(&self, id: ItemId, meta: ItemMeta) {
        self.items.insert(id, meta);
    }

    pub fn set_active(&self, id: ItemId, active: bool) {
        if let Some(mut meta) = self.items.get_mut(&id) {
            meta.active = active;
        }
    }
}

#[async_trait]
impl ItemCatalog for StaticCatalog {
    async fn get_item(&self, id: ItemId) -> Option<ItemMeta> {
        self.items.get(&id).map(|e| e.value().clone())
    }
}
