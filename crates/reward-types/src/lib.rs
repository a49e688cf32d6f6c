#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

//! Shared type definitions for the reward-accounting core: addresses,
//! fixed-point amounts, cryptographic key/signature wrappers, and the
//! domain entities described by the reward program's data model.

pub mod address;
pub mod amount;
pub mod constants;
pub mod crypto;
pub mod domain;
pub mod epoch;
pub mod error;

pub use address::*;
pub use amount::*;
pub use constants::*;
pub use crypto::*;
pub use domain::*;
pub use epoch::*;
pub use error::*;
