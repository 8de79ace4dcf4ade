use crate::types::{Item, ItemId};

/// Read-only access to the item catalog.
///
/// The catalog lives outside the scheduling core (listing management, search,
/// images and so on are someone else's problem); the core only needs point
/// reads.
#[async_trait::async_trait]
pub trait ItemStore: Send + Sync {
    /// Fetch an item by id. `Ok(None)` means the item does not exist.
    async fn get(&self, item_id: ItemId) -> anyhow::Result<Option<Item>>;
}
