//! The boundary between deciding *what* should exist and making it exist.
//!
//! Provisioning logic describes each object it needs as a [Declaration]. An
//! [Engine] realizes declarations and reports their [Outputs]. A [Stack]
//! sits in between: it hands declarations to the engine in dependency order,
//! exposes every object's outputs as a [DeferredOutputs] that later
//! declarations can build on, and collects failures into a [Settlement].
//!
//! [MemoryEngine] realizes nothing and records everything, which makes it
//! suitable for planning runs and for tests:
//!
//! ```rust
//! use tether_engine::{Declaration, MemoryEngine, ResourceKind, Stack};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = MemoryEngine::default();
//! let stack = Stack::new(engine.clone());
//!
//! stack.declare(Declaration::new(ResourceKind::DopplerProject, "doppler-project-svc"));
//! stack.settle().await;
//!
//! assert_eq!(engine.names(), vec!["doppler-project-svc".to_string()]);
//! # }
//! ```

mod error;
pub use error::*;

mod declaration;
pub use declaration::*;

mod engine;
pub use engine::*;

mod memory;
pub use memory::*;

mod stack;
pub use stack::*;
