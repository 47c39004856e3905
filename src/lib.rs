//! Raster export synchronization
//!
//! This library submits long-running raster export jobs to a remote
//! compute service, waits for all of them to finish, then downloads the
//! exported files from remote storage into a local archive organized by
//! season and year, removing each remote copy once it is safely on disk.

pub mod app_state;
pub mod config;
pub mod models;
pub mod runtime;
pub mod services;
