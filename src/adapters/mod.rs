// Adapters layer: concrete configuration stores and credential sources.

pub mod memory;
pub mod rest;
pub mod token;
