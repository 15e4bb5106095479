//! Classroom seating solver.
//!
//! Places students in a fixed grid of seats under hard placement rules
//! (who may not sit together, front/back row, door/window columns) and
//! explains how a chart meets each rule.
//!
//! The pipeline for one request is
//! [`validator`] → [`model`] → [`solver`] → [`explain`], wired together in
//! [`service`]. Every stage is a pure function of its inputs.

pub mod config;
pub mod data;
pub mod error;
pub mod explain;
pub mod model;
pub mod server;
pub mod service;
pub mod solver;
pub mod validator;

pub use error::{Result, SeatingError};
