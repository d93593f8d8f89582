pub mod document;
pub mod enhancement;
