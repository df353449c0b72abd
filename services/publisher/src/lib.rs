//! Publish Service
//!
//! Local utility that serves a "current video" page and, on operator demand,
//! publishes a local video to an S3-compatible bucket (Cloudflare R2, MinIO),
//! fetches it back through its public URL and then points clients at it.
//!
//! ## Publish cycle
//!
//! ```text
//!  operator Enter
//!        │
//!        ▼
//! ┌──────────────┐   PUT    ┌──────────────┐
//! │ Publisher    │─────────▶│ Object Store │
//! └──────────────┘          └──────────────┘
//!        │ GET <public url>        │
//!        ▼                         ▼
//! ┌──────────────┐          ┌──────────────┐
//! │ Verifier     │─────────▶│ Public URL   │
//! └──────────────┘          └──────────────┘
//!        │ swap
//!        ▼
//! ┌──────────────┐  read    ┌──────────────┐
//! │ Video State  │◀─────────│ HTTP Server  │
//! └──────────────┘          └──────────────┘
//! ```
//!
//! The verifier's `close_response_body` switch selects between releasing
//! each verification response and retaining it, which reproduces connection
//! pool exhaustion over repeated cycles.

pub mod config;
pub mod controller;
pub mod object_store;
pub mod publisher;
pub mod server;
pub mod state;
pub mod verifier;

pub use config::{Config, ConfigError};
pub use controller::{run_controller, ControllerExit};
pub use object_store::{ObjectStore, S3ObjectStore, UploadedObject};
pub use publisher::{PublishError, Published, Publisher};
pub use server::{create_router, AppState};
pub use state::{VideoPointer, VideoState};
pub use verifier::Verifier;
