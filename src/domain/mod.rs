//! Domain layer: value objects, aggregates, and the form contract.

pub mod form;
pub mod foundation;
pub mod session;
