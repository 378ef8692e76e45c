pub mod admin;
pub mod deletion;
pub mod health;

pub use admin::{admin_stats, complete_due};
pub use deletion::handle_deletion_action;
pub use health::health_check;
