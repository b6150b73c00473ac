pub mod spectrum;
pub mod synthetic;
