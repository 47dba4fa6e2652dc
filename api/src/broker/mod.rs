pub mod executor;
pub mod pending;
pub mod records;

#[cfg(test)]
pub(crate) mod testing;
