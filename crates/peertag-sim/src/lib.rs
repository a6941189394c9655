pub mod bot;
pub mod config;
pub mod peer_loop;
pub mod sim;
pub mod transport;
