//! Report export formats

pub mod csv;
pub mod json;
