pub mod field;
pub mod grid;
