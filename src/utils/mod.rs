pub mod compare;
pub mod matrix;
