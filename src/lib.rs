// Library for tests and the viewer binary to access modules

pub mod aggregator;
pub mod broadcaster;
pub mod client;
pub mod config;
pub mod display;
pub mod models;
pub mod routes;
pub mod source;
