pub mod common;
pub mod instrument;
pub mod report;
pub mod run;
pub mod verify;
