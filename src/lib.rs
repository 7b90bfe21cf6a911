//! Tools for talking to Thermia Genesis heat pumps over Modbus TCP.

pub mod codec;
pub mod commands;
pub mod connection;
pub mod modbus;
pub mod output;
pub mod planner;
pub mod registers;
pub mod session;
pub mod store;
pub mod transport;
