pub mod auth;
pub mod config;
pub mod credits;
pub mod mpesa;
pub mod phone;
pub mod providers;
pub mod types;

pub use credits::{check_affordable, Affordability, Credits, RateTable};
pub use types::Channel;
