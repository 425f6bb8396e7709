pub mod clock;
pub mod helper;
