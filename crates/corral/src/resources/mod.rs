pub mod amount;
pub mod parser;
pub mod set;
pub mod value;

use thiserror::Error;

pub use amount::{ResourceAmount, ResourceFractions, ResourceUnits};
pub use set::{DEFAULT_ROLE, Reservation, Resource, ResourceSet};
pub use value::{RangeSet, ResourceValue};

/// A namespace used for fair-share accounting and access control.
pub type Role = String;

/// Identity of an authenticated caller or reservation holder.
pub type Principal = String;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Subtracting a quantity that is not contained in the minuend.
    /// This is a logic-error class; validated external input never triggers it.
    #[error("quantity underflow on `{name}`: cannot subtract {subtrahend} from {minuend}")]
    QuantityUnderflow {
        name: String,
        minuend: String,
        subtrahend: String,
    },
    /// Two resources in the same bucket carry different value kinds.
    #[error("resource `{name}` mixes value kinds {left} and {right}")]
    KindMismatch {
        name: String,
        left: &'static str,
        right: &'static str,
    },
}
