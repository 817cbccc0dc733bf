//! # Sketchroom
//!
//! Collaborative drawing hub: many clients share one canvas over WebSockets,
//! strokes are relayed live between them, and canvas snapshots can be sent to
//! an external classifier whose answer is broadcast to everyone.
//!
//! ## Features
//!
//! - **Live relay**: drawing segments reach every other client in order
//! - **Ownership**: a stroke can only be extended by the client that started it
//! - **Backpressure**: slow clients lose drawing deltas, never analysis results
//! - **Asynchronous analysis**: submissions are acknowledged immediately and
//!   the classification is pushed over the realtime channel
//!
//! ## Modules
//!
//! - [`session`]: Registry of connected clients
//! - [`bus`]: Per-subscriber publish/subscribe with delivery classes
//! - [`relay`]: Stroke ownership, point logs and drawing events
//! - [`analysis`]: Classifier calls with timeout and result fan-out
//! - [`websocket`]: Connection gateway and wire format
//! - [`api`]: REST API server with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sketchroom::{serve, AppState, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!
//!     // Uses the mock classifier unless an endpoint is configured
//!     let state = AppState::new(&config)?;
//!
//!     serve(state, &config.server).await?;
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod api;
pub mod bus;
pub mod config;
pub mod relay;
pub mod session;
pub mod websocket;

// Re-export top-level types for convenience
pub use analysis::{
    AnalysisCoordinator, AnalysisResult, AnalysisStatus, Classification, Classifier,
    ClassifierError, CoordinatorConfig, HttpClassifier, ImageSnapshot, MockClassifier, RequestId,
    SnapshotError,
};

pub use api::{build_router, serve, ApiError, AppState};

pub use bus::{BusConfig, BusEvent, BusStats, Delivery, EventBus, Subscription};

pub use config::{
    CanvasConfig, ClassifierConfig, Config, ConfigError, HubSettings, LoggingConfig, ServerConfig,
};

pub use relay::{
    ClearOutcome, DrawingEvent, Point, RelayConfig, RelayError, SegmentMode, Stroke, StrokeId,
    StrokeRelay,
};

pub use session::{ClientId, ClientInfo, SessionError, SessionRegistry};

pub use websocket::{websocket_handler, ClientMessage, ServerMessage};
