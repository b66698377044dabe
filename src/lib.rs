//! Client-side data synchronization for an HMIS REST API.
//!
//! - [`api`] sends authenticated requests and maps failures to [`api::ClientError`]
//! - [`cache`] and [`query`] keep fetched resources fresh and de-duplicated
//! - [`mutation`] runs writes and invalidates what they touched
//! - [`hmis`] declares one query or mutation per backend resource

pub mod api;
pub mod auth;
pub mod cache;
pub mod hmis;
pub mod mutation;
pub mod query;

pub use api::{ApiClient, ClientError};
pub use auth::{AuthContext, Session};
pub use cache::{CacheKey, KeyFilter, QueryClient};
pub use hmis::HmisClient;
pub use mutation::{Mutation, MutationDescriptor, MutationState};
pub use query::{Query, QueryDescriptor, QueryState};
