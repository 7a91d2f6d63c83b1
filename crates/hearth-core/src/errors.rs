//! Component and lifecycle error types
//!
//! Registry misuse (duplicate attachment, missing lookup) is a programmer or
//! configuration error and is classified as fatal. Phase hook failures carry
//! the failing component so the node can report what broke before shutting
//! down.

use thiserror::Error;

use crate::lifecycle::Phase;

/// Errors raised by component registries and component hooks
#[derive(Debug, Error)]
pub enum ComponentError {
    /// The component type is already attached to this host
    #[error("{owner} component {component} repeated")]
    Duplicate {
        /// Label of the host owning the registry
        owner: String,
        /// Type name of the component
        component: &'static str,
    },

    /// The component type was never attached to this host
    #[error("{owner} component {component} not found")]
    NotFound {
        /// Label of the host owning the registry
        owner: String,
        /// Type name of the component
        component: &'static str,
    },

    /// A component hook reported a failure
    #[error("component {component} failed: {message}")]
    Failed {
        /// Type name of the component
        component: &'static str,
        /// Human-readable failure description
        message: String,
        /// Optional underlying cause
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ComponentError {
    /// Create a duplicate attachment error
    pub fn duplicate(owner: impl Into<String>, component: &'static str) -> Self {
        Self::Duplicate {
            owner: owner.into(),
            component,
        }
    }

    /// Create a missing component error
    pub fn not_found(owner: impl Into<String>, component: &'static str) -> Self {
        Self::NotFound {
            owner: owner.into(),
            component,
        }
    }

    /// Create a hook failure for component `C`
    pub fn failed<C: ?Sized>(message: impl Into<String>) -> Self {
        Self::Failed {
            component: std::any::type_name::<C>(),
            message: message.into(),
            source: None,
        }
    }

    /// Attach an underlying cause to a hook failure
    pub fn with_cause(self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        match self {
            Self::Failed {
                component, message, ..
            } => Self::Failed {
                component,
                message,
                source: Some(Box::new(cause)),
            },
            other => other,
        }
    }

    /// Registry misuse terminates the node; hook failures are judged by phase
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Duplicate { .. } | Self::NotFound { .. })
    }
}

/// Errors raised while fanning a phase out across a host's components
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A component failed during the phase; the rest of the fan-out was skipped
    #[error("{phase} aborted on {owner} at {component}: {source}")]
    PhaseFailed {
        /// Phase being fanned out
        phase: Phase,
        /// Label of the host owning the registry
        owner: String,
        /// Type name of the failing component
        component: &'static str,
        /// Error reported by the component
        #[source]
        source: ComponentError,
    },
}

impl LifecycleError {
    /// Phase that failed
    pub fn phase(&self) -> Phase {
        match self {
            Self::PhaseFailed { phase, .. } => *phase,
        }
    }

    /// Type name of the component that failed
    pub fn component(&self) -> &'static str {
        match self {
            Self::PhaseFailed { component, .. } => component,
        }
    }

    /// Whether the component error behind the failure is fatal
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::PhaseFailed { source, .. } => source.is_fatal(),
        }
    }

    /// Error reported by the failing component
    pub fn into_source(self) -> ComponentError {
        match self {
            Self::PhaseFailed { source, .. } => source,
        }
    }
}
