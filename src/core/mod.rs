pub mod config;
pub mod conversation;
pub mod extract;
pub mod models;
pub mod turn;
