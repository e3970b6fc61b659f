/// Scenario node identifier.
pub type NodeId = String;

/// Scenario edge identifier.
pub type EdgeId = String;

/// Choice identifier, unique within its owning node.
pub type ChoiceId = String;

/// Asset identifier, globally unique within an asset store.
pub type AssetId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a fresh time-ordered identifier.
pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
