pub mod alerts;
pub mod errors;
pub mod ports;
pub mod repositories;
pub mod signals;
pub mod types;
