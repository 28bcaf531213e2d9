pub mod constants;
pub mod logger;
pub mod providers;
