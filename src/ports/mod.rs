//! Port traits for the detector's external collaborators.

pub mod config_port;
pub mod detection_port;
pub mod stock_port;
