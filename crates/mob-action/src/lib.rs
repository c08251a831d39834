//! Action engine for MOB.
//!
//! Resolves symbolic action names against the JSON action registry, binds
//! them to registered handlers and runs them under a per-action timeout.

pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod handler;
pub mod lifecycle;
pub mod registry;
pub mod store;
pub mod types;

pub use dispatcher::Dispatcher;
pub use error::{
    ConfigError, DispatchError, ExecutionError, FailureKind, HandlerError, ResolutionError,
};
pub use executor::ExecutionAdapter;
pub use handler::{
    ActionHandler, BlockingHandler, HandlerArgs, HandlerKind, Registration, ResolvedHandler,
};
pub use lifecycle::{DispatchState, DispatchTrace, InvalidTransition};
pub use registry::{HandlerRegistry, Resolver, StaticResolver};
pub use store::{ConfigSnapshot, ConfigStore, SourceMarker};
pub use types::{
    ActionDescriptor, DispatchRequest, ExecutionOutcome, OutcomeStatus, OutputMode, Parameters,
};
