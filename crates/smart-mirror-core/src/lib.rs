pub mod compression;
pub mod config;
pub mod packages;
pub mod parse;
pub mod popcon;

pub use parse::ParseError;
