//! Route Handlers

pub mod stations;
