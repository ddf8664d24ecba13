//! reqwest-backed implementation of [`crate::transport::Transport`].

pub mod body;
pub mod client;

pub use body::count_body_bytes;
pub use client::HttpTransport;
