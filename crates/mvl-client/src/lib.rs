pub mod config;
pub mod matchmaking;
pub mod network;
pub mod replay_store;
pub mod results_client;
pub mod session;
