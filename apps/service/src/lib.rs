//! srvwatch: watches game servers over A2S and reports status changes to chat subscribers.

pub mod commands;
pub mod config;
pub mod monitoring;
pub mod notify;
pub mod orchestrator;
pub mod registry;
pub mod storage;
pub mod transport;

#[cfg(test)]
mod test_support;
