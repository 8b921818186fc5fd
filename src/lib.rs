// src/lib.rs

//! jobfeed: jobs.ge vacancy crawler and Telegram notification dispatcher.

pub mod dates;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod transport;
pub mod utils;
