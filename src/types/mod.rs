pub mod ids;
pub mod quote;
pub mod timestamp;
