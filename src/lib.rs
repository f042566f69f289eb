pub mod cli;
pub mod commands;
pub mod common;
pub mod dedup;
pub mod gateway;
pub mod ratelimit;
pub mod store;
pub mod worker;
