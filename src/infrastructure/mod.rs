//! Adapters for the application ports
pub mod memory;
pub mod notify;
pub mod paystack;
pub mod postgres;
