pub mod analyzer;
pub mod cli;
pub mod config;
pub mod error;
pub mod filters;
pub mod multicast;
pub mod network;
pub mod pcap;
pub mod setup_logger;
