//! Types shared between the vmrig library and its front ends.

pub mod errors;

pub use errors::{AbortReason, VmrigError, VmrigResult};
