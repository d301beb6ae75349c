pub mod calibration;
pub mod config;
pub mod elo;
pub mod error;
pub mod features;
pub mod form;
pub mod h2h;
pub mod matches;
pub mod model;
pub mod predict;
pub mod simulate;
pub mod snapshot;
pub mod source;
pub mod table;
