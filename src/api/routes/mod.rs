//! Route handlers

pub mod dump;
pub mod health;
pub mod update;
pub mod value;
