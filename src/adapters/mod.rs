//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod csv_detection_writer;
pub mod file_config_adapter;
pub mod graph_config_adapter;
