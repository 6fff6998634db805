//! pipestep-core — native values, typed-value conversion, the token codec and
//! the per-call environment. All other pipestep crates depend on this one.

pub mod codec;
pub mod config;
pub mod convert;
pub mod environment;
pub mod value;

pub use codec::{CodecError, Token};
pub use convert::{ConversionError, TypedValue, ValueKind};
pub use environment::Environment;
pub use value::NativeValue;
