//! Command line support for the reify binary.

pub mod args;
pub mod driver;

#[cfg(test)]
#[path = "../tests/args_tests.rs"]
mod args_tests;
