pub mod achievements;
pub mod aggregate;
pub mod balance;
pub mod config;
pub mod db;
pub mod error;
pub mod level;
pub mod models;
pub mod service;
pub mod streak;
