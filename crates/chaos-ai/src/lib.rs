pub mod client;

pub use client::HttpAiClient;
