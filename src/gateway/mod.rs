// src/gateway/mod.rs

pub mod dispatcher;
pub mod metadata;
pub mod models;

pub use dispatcher::{Gateway, ToolMethod};
pub use metadata::{FunctionDoc, MetadataRegistry};
