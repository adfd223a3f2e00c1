pub mod blog_client;
pub mod client;
pub mod types;

pub use blog_client::BlogClient;
pub use client::{Network, SiteClient};
