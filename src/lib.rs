pub mod cas;
pub mod commands;
pub mod cursor;
pub mod error;
pub mod file_parsers;
pub mod hasher;
pub mod keys;
pub mod source;
pub mod superbundle_fs;
#[cfg(any(test, feature = "synthetic"))]
pub mod synthetic;
