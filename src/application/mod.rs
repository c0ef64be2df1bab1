pub mod dispatch;
pub mod errors;
pub mod scheduler;
