//! Host helpers.

pub mod process;
