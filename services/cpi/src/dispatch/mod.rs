//! Action registry and dispatch.
//!
//! The registry is a fixed table from method name to handler, built once
//! at startup. Dispatch resolves the handler, decodes the arguments, runs
//! the action exactly once, and hands back its result or error untouched.

mod args;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub use args::{ArgumentDecodeError, FromArgs};

use crate::error::{CpiError, ErrorKind};

/// Errors from dispatching a request.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unsupported action '{0}'")]
    UnsupportedAction(String),

    #[error("decoding arguments for '{method}': {source}")]
    ArgumentDecode {
        method: String,
        #[source]
        source: ArgumentDecodeError,
    },

    #[error(transparent)]
    Action(#[from] CpiError),

    #[error("encoding result of '{method}': {source}")]
    ResultEncode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::UnsupportedAction(_) | DispatchError::ArgumentDecode { .. } => {
                ErrorKind::NotSupported
            }
            DispatchError::Action(e) => e.kind(),
            DispatchError::ResultEncode { .. } => ErrorKind::Generic,
        }
    }
}

/// A lifecycle verb with typed arguments and result.
#[async_trait]
pub trait Action: Send + Sync + 'static {
    type Args: FromArgs + Send;
    type Output: Serialize + Send;

    async fn run(&self, args: Self::Args) -> Result<Self::Output, CpiError>;
}

/// Type-erased action.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Number of arguments the handler accepts.
    fn arity(&self) -> usize;

    async fn handle(&self, method: &str, args: Vec<Value>) -> Result<Value, DispatchError>;
}

struct TypedHandler<A>(A);

#[async_trait]
impl<A: Action> Handler for TypedHandler<A> {
    fn arity(&self) -> usize {
        A::Args::ARITY
    }

    async fn handle(&self, method: &str, args: Vec<Value>) -> Result<Value, DispatchError> {
        let args = A::Args::from_args(args).map_err(|source| DispatchError::ArgumentDecode {
            method: method.to_string(),
            source,
        })?;

        let output = self.0.run(args).await?;

        serde_json::to_value(output).map_err(|source| DispatchError::ResultEncode {
            method: method.to_string(),
            source,
        })
    }
}

/// Fixed method name to handler table.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<&'static str, Box<dyn Handler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `action` under `method`, replacing any earlier handler.
    pub fn register<A: Action>(&mut self, method: &'static str, action: A) {
        self.handlers.insert(method, Box::new(TypedHandler(action)));
    }

    /// Builder-style [`Dispatcher::register`].
    pub fn with<A: Action>(mut self, method: &'static str, action: A) -> Self {
        self.register(method, action);
        self
    }

    pub fn resolve(&self, method: &str) -> Result<&dyn Handler, DispatchError> {
        self.handlers
            .get(method)
            .map(|handler| handler.as_ref())
            .ok_or_else(|| DispatchError::UnsupportedAction(method.to_string()))
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<&'static str> {
        let mut methods: Vec<_> = self.handlers.keys().copied().collect();
        methods.sort_unstable();
        methods
    }

    pub async fn dispatch(&self, method: &str, args: Vec<Value>) -> Result<Value, DispatchError> {
        let handler = self.resolve(method)?;
        debug!(
            method = method,
            arity = handler.arity(),
            args = args.len(),
            "Dispatching action"
        );
        handler.handle(method, args).await
    }
}
