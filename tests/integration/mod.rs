//! Integration test modules for Ripieno

pub mod engine;
pub mod mixing;
pub mod processing;
pub mod realtime;
