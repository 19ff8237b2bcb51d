//! Shared value types used across the analyzer: the instruction set tag,
//! the register-type tag, and the crate's single public error type.

mod error;
mod reg_type;

pub use error::AnalysisError;
pub use reg_type::{Isa, RegisterType};
