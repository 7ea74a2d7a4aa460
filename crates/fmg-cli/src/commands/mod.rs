//! Command implementations for fmgctl

pub mod call;
pub mod ops;
pub mod status;
pub mod wait_task;

pub use call::call;
pub use ops::ops;
pub use status::status;
pub use wait_task::wait_task;
