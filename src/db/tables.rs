use redb::TableDefinition;

/// Deletion requests table: request id (UUID string) -> DeletionRequestRecord (serialized)
pub const DELETION_REQUESTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("deletion_requests");

/// Pending index: user_id -> id of that user's pending request
/// An entry exists only while the request is pending
pub const PENDING_BY_USER: TableDefinition<&str, &str> = TableDefinition::new("pending_by_user");
