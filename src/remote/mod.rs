// ABOUTME: Remote dataset adapter module
// ABOUTME: Pulls datasets for an integration from an HTTP endpoint

pub mod client;
pub mod models;

pub use client::RemoteDatasetClient;
pub use models::DatasetBatch;
