pub use self::errors::{WeftError, WeftResult};
pub use self::interning::Symbol;

pub mod errors;
pub mod interning;
