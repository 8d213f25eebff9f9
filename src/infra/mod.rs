//! Process-wide infrastructure: sink database pool and message bus client

pub mod bus;
pub mod db;
