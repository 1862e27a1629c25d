//! Platform detection. Re-exports [`pdk_core::execution::Platform`] so
//! every crate shares a single tag rather than each defining its own.

pub use pdk_core::execution::Platform;
