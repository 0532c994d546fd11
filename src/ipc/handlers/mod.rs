pub mod attendance;
pub mod core;
pub mod import;
pub mod setup;
pub mod students;
