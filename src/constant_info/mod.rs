mod parser;
mod pool;
mod types;

pub use self::parser::*;
pub use self::pool::*;
pub use self::types::*;
