//! The semantic instruction set and its byte encoding.

mod encode;
pub mod opcodes;
mod types;

pub use self::encode::*;
pub use self::types::*;
