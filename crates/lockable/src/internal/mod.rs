#[macro_use]
pub(crate) mod common;

pub(crate) mod admission;
pub(crate) mod allocator;
pub(crate) mod config;
pub(crate) mod expand;
pub(crate) mod index;
pub(crate) mod pool;
pub(crate) mod predicate;
pub(crate) mod requirement;
pub(crate) mod resource;

#[cfg(test)]
mod tests;
