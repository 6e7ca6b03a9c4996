pub mod audit;
pub mod backend;
pub mod client;
pub mod config;
pub mod db;
pub mod hash;
pub mod http;
pub mod mailer;
pub mod model;
pub mod store;
pub mod tally;
