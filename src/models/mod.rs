pub mod deletion_request;

pub use deletion_request::{
    scheduled_deletion_time, storage_time, DeletionRequest, DeletionRequestRecord,
    DeletionStatus, StatusCounts,
};
