//! Handler contracts consumed by the engine
//!
//! ## Key Components
//!
//! - [`FileHandler`] - Business logic invoked once per claimed file
//! - [`PostProcessor`] - Side effects after a file has been routed
//! - [`HandlerRegistry`] - Name-based lookup used by the host configuration
//! - [`ProcessingFile`] - The claimed file passed to handlers
//!
//! ## Example
//!
//! ```rust,ignore
//! use filedrop::handlers::HandlerRegistry;
//!
//! let registry = HandlerRegistry::with_defaults();
//! let handler = registry.handler("non_empty")?;
//! let ok = handler.handle_file(&file).await?;
//! ```

mod default;
mod registry;
mod traits;
pub(crate) mod types;

pub use default::{
    AcceptHandler, LogPostProcessor, NonEmptyHandler, NoopPostProcessor, RejectHandler,
};
pub use registry::{HandlerRegistry, RegistryError};
pub use traits::{FileHandler, HandlerError, PostProcessor};
pub use types::ProcessingFile;
