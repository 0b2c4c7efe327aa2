//! GitLab REST API boundary: wire types, typed errors, and the source/target traits

pub mod client;
pub mod error;
mod impl_source;
mod impl_target;
pub mod models;
pub mod traits;

pub use client::GitlabClient;
pub use error::GitlabError;
pub use traits::{Actor, SourceApi, TargetApi};

#[cfg(test)]
pub(crate) mod mock;
