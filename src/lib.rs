#![forbid(unsafe_code)]

pub mod capture;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod discover;
pub mod driver;
pub mod error;
pub mod formats;
pub mod logging;
pub mod pdf;
pub mod process;
pub mod records;
pub mod run;
pub mod session;
pub mod site;
