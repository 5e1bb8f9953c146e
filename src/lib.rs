//! # Caravel - a resilient request-execution engine
//!
//! Caravel is the core of a multi-protocol client networking stack, built on
//! top of `reqwest`. One engine composes response caching, retries with
//! backoff, circuit breaking, interceptor middleware, authentication with
//! refresh, and an offline queue with background synchronization, behind a
//! uniform [`Endpoint`] abstraction that REST, GraphQL, SSE, WebSocket, and
//! gRPC frontends all share.
//!
//! ## Quick Start
//!
//! ```no_run
//! use caravel::{Endpoint, Engine, RetryPolicy, BackoffStrategy};
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize)]
//! struct CreateUser {
//!     name: String,
//! }
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), caravel::Error> {
//!     let engine = Engine::builder()
//!         .timeout(Duration::from_secs(30))
//!         .retry_policy(RetryPolicy::new(3).with_strategy(BackoffStrategy::Exponential {
//!             base: Duration::from_millis(100),
//!             multiplier: 2.0,
//!         }))
//!         .build()?;
//!
//!     // GET with decode
//!     let endpoint = Endpoint::get("https://api.example.com", "/users/123")?;
//!     let user = engine.execute::<User>(&endpoint).await?;
//!     println!("User: {}", user.data.name);
//!     println!("Request took {:?}", user.metadata.latency);
//!
//!     // POST with a structured body
//!     let body = caravel::RequestBody::structured(&CreateUser {
//!         name: "Alice".to_string(),
//!     })?;
//!     let endpoint = Endpoint::post("https://api.example.com", "/users")?.with_body(body);
//!     let created = engine.execute::<User>(&endpoint).await?;
//!     println!("Created user with ID: {}", created.data.id);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **One pipeline for every call** - interceptors, auth, cache, retries,
//!   and breaker gating compose in a fixed, predictable order
//! - **Multi-tier caching** - in-memory LRU with TTL, a crash-safe disk tier,
//!   and a hybrid that promotes disk hits back into memory
//! - **Classified errors** - transport and HTTP failures map to a closed
//!   taxonomy with retry/connectivity/auth predicates
//! - **Flexible retry logic** - immediate, constant, exponential, or custom
//!   backoff with full, equal, or decorrelated jitter; `Retry-After` aware
//! - **Circuit breaking** - a three-state breaker keeps a failing host from
//!   being hammered while it recovers
//! - **Auth with refresh** - bearer, API-key, basic, and OAuth2 schemes with
//!   single-flight token refresh and a one-shot 401 retry
//! - **Offline-first** - body-carrying requests that fail on connectivity
//!   queue durably and replay when reachability returns
//! - **Streaming** - a pull-based chunk stream for SSE-style consumers that
//!   closes its transport on drop
//!
//! ## Caching
//!
//! Attach any [`cache::Cache`] tier to the engine; GET/HEAD responses are
//! stored and served until their TTL lapses:
//!
//! ```no_run
//! use caravel::cache::{DiskCache, HybridCache, MemoryCache};
//! use caravel::Engine;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), caravel::Error> {
//! let cache = HybridCache::new(
//!     MemoryCache::new(4 * 1024 * 1024),
//!     DiskCache::open("/var/cache/app/http", 64 * 1024 * 1024).await?,
//! );
//! let engine = Engine::builder().cache(Arc::new(cache)).build()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Offline queue and sync
//!
//! With a queue attached, mutating requests that fail while offline are
//! captured and replayed when connectivity returns:
//!
//! ```no_run
//! use caravel::queue::OfflineQueue;
//! use caravel::reachability::{Reachability, Status};
//! use caravel::sync::SyncManager;
//! use caravel::Engine;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), caravel::Error> {
//! let queue = Arc::new(OfflineQueue::open("/var/lib/app/queue.json", 100).await?);
//! let engine = Arc::new(Engine::builder().offline_queue(queue.clone()).build()?);
//! let reachability = Arc::new(Reachability::new());
//!
//! let sync = SyncManager::new(engine, queue, reachability.clone());
//! sync.start();
//!
//! // Platform integration feeds status changes:
//! reachability.set_status(Status::ViaWifi);
//! # Ok(())
//! # }
//! ```

pub mod auth;
mod body;
pub mod breaker;
pub mod cache;
mod context;
mod endpoint;
mod engine;
mod error;
mod interceptor;
mod metrics;
pub mod queue;
pub mod rate_limit;
pub mod reachability;
mod response;
mod retry;
mod streaming;
pub mod sync;

pub use body::{Codec, EncodedBody, JsonCodec, Part, RequestBody};
pub use context::{RequestContext, NO_REQUEUE_TAG};
pub use endpoint::{method_has_body, method_is_cacheable, CachePolicy, Endpoint, WireRequest};
pub use engine::{Engine, EngineBuilder, ProgressFn};
pub use error::{Error, Result};
pub use interceptor::Interceptor;
pub use metrics::{Metrics, MetricsSnapshot};
pub use response::{RawResponse, Response, ResponseMetadata};
pub use retry::{BackoffStrategy, Jitter, RetryPolicy};
pub use streaming::ByteStream;
