pub mod db;
pub mod error;
pub mod history;
pub mod models;
pub mod selector;
pub mod service;
pub mod weights;
