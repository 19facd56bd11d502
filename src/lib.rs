pub mod app;
pub mod backend;
pub mod card;
pub mod controller;
pub mod crypto;
pub mod dialog;
pub mod filter;
pub mod grid;
pub mod header;
pub mod logging;
pub mod models;
pub mod notify;
pub mod storage;
pub mod ui;
pub mod wire;
