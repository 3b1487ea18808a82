pub mod auth;
pub mod client;
pub mod query;

pub use auth::TokenProvider;
pub use client::{EbayClient, FetchStats};
