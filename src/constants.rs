/// Grace period between a deletion request and the account becoming
/// eligible for erasure. Fixed for every request.
pub const GRACE_PERIOD_DAYS: i64 = 3;

/// Maximum accepted user ID length (after trimming)
pub const MAX_USER_ID_LEN: usize = 255;

/// Actions accepted by the deletion endpoint
pub const ACTION_REQUEST_DELETION: &str = "request_deletion";
pub const ACTION_CANCEL_DELETION: &str = "cancel_deletion";
pub const ACTION_GET_STATUS: &str = "get_status";

// =============================================================================
// Error Messages
// =============================================================================

/// Error message for a missing or blank user ID
pub const ERR_MISSING_USER_ID: &str = "user_id is required";

/// Error message for an unparseable request body
pub const ERR_MALFORMED_BODY: &str = "Request body must be a JSON object with action and user_id";

/// Error message for an unknown action
pub const ERR_INVALID_ACTION: &str =
    "Invalid action. Must be one of: request_deletion, cancel_deletion, get_status";

/// Error message when a user already has a pending request
pub const ERR_ALREADY_PENDING: &str = "A deletion request is already pending for this account";

/// Error message when there is nothing to cancel
pub const ERR_NO_PENDING_REQUEST: &str = "No pending deletion request found";

// =============================================================================
// Success Messages
// =============================================================================

pub const MSG_DELETION_SCHEDULED: &str =
    "Account deletion scheduled. You can cancel within the grace period.";

pub const MSG_DELETION_CANCELLED: &str = "Account deletion request cancelled";
