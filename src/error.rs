// src/error.rs
//! Error handling for the whole crate.
//!
//! - **Taxonomy**: construction-time failures (shape creation, malformed geometry,
//!   capacity limits) and simulation failures are fatal and propagate with `?`.
//!   Stale body handles never produce an `Error`; those calls return `None`/`false`.
//! - **Features**: context chaining, custom messages, transparent std errors, `is_*` helpers, `Result` alias.

use thiserror::Error;

/// Main error type. Send + Sync + 'static so it can cross the physics thread boundary.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O errors (thread spawning, crash log).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The physics library refused to build a collision shape.
    #[error("{operation}: shape creation failed: {reason}")]
    ShapeCreation {
        operation: &'static str,
        reason: String,
    },

    /// Source geometry violates the caller contract (index count, index range, NaN vertices).
    #[error("{operation}: malformed geometry: {reason}")]
    MalformedGeometry {
        operation: &'static str,
        reason: String,
    },

    /// A hard cap fixed at world-init time would be exceeded.
    #[error("{resource} limit of {limit} reached")]
    CapacityExceeded {
        resource: &'static str,
        limit: usize,
    },

    /// `PhysicsWorld::update` was handed a negative or non-finite delta.
    #[error("invalid physics delta: {0} ms")]
    InvalidDelta(f32),

    /// The simulation state is no longer trustworthy (NaN / infinite body state).
    #[error("physics step failed after {substeps} sub-steps of a {delta_ms} ms update: {reason}")]
    Simulation {
        reason: String,
        delta_ms: f32,
        substeps: u32,
    },

    /// The intra-step worker pool could not be built.
    #[error("physics worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// The physics thread unwound instead of returning.
    #[error("physics thread panicked")]
    PhysicsThreadPanicked,

    /// Simple custom message.
    #[error("{0}")]
    Custom(String),

    /// Context chaining.
    #[error("{message}: {source}")]
    WithContext {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a custom error message.
    #[inline]
    pub fn custom<S: Into<String>>(msg: S) -> Self {
        Self::Custom(msg.into())
    }

    /// Add context to any error (chainable, like `.context()` in anyhow).
    #[inline]
    pub fn context<C: Into<String>>(self, context: C) -> Self {
        Self::WithContext {
            message: context.into(),
            source: Box::new(self),
        }
    }

    #[inline]
    pub fn malformed<S: Into<String>>(operation: &'static str, reason: S) -> Self {
        Self::MalformedGeometry {
            operation,
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn shape<S: Into<String>>(operation: &'static str, reason: S) -> Self {
        Self::ShapeCreation {
            operation,
            reason: reason.into(),
        }
    }

    /// The innermost error, skipping any `WithContext` layers.
    pub fn root(&self) -> &Error {
        match self {
            Error::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    // === kind checks ===
    #[inline]
    pub fn is_io(&self) -> bool {
        matches!(self.root(), Error::Io(_))
    }

    #[inline]
    pub fn is_geometry(&self) -> bool {
        matches!(
            self.root(),
            Error::MalformedGeometry { .. } | Error::ShapeCreation { .. }
        )
    }

    #[inline]
    pub fn is_capacity(&self) -> bool {
        matches!(self.root(), Error::CapacityExceeded { .. })
    }

    #[inline]
    pub fn is_simulation(&self) -> bool {
        matches!(self.root(), Error::Simulation { .. })
    }

    /// Fatal errors have no recovery path; the process reports them and exits.
    /// Any error returned by a step stops the physics thread, so only a
    /// refused insert (the world is left unchanged) is recoverable.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        !matches!(self.root(), Error::CapacityExceeded { .. })
    }
}

/// Convenient `Result` alias, use `crate::Result<T>` everywhere.
pub type Result<T> = std::result::Result<T, Error>;
