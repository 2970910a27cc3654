pub mod client;
pub mod source;

pub use client::GitHubClient;
pub use source::GitHubWorkSource;
