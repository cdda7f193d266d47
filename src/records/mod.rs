pub mod client;

pub use client::{AirtableClient, AirtableSettings};
