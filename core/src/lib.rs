pub mod actions;
pub mod error;
pub mod pending;
pub mod records;
pub mod validate;
