//! # nearspot API
//!
//! HTTP front end for the nearspot query flows (actix-web).
//!
//! - `GET /` - service name and version
//! - `GET /nearest?lat=&lon=` - nearest points of interest with a map viewport
//! - `GET /suggest?q=` - address suggestions for free text

pub mod rest;

pub use rest::RestApi;
