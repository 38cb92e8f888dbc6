//! Primitives shared by every crate in the escrow payment gateway workspace.
mod minor_units;

pub mod helpers;
pub mod op;
mod secret;

pub use minor_units::{MinorUnits, MinorUnitsConversionError, DEFAULT_CURRENCY, MAX_AMOUNT};
pub use secret::Secret;
