//! Shared foundational types used across the tempo verification engine.
//!
//! This crate provides 4-state logic values, packed logic vectors used to
//! carry signal values between the simulation host and the bus engines, and
//! the symbol layout rules that turn a data word into bytes and back.

#![warn(missing_docs)]

pub mod logic;
pub mod logic_vec;
pub mod symbols;

pub use logic::Logic;
pub use logic_vec::LogicVec;
pub use symbols::{SymbolError, SymbolLayout};
