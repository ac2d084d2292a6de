//! Output formats.

pub mod obj;
