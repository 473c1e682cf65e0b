//! Method registry
//!
//! Maps method names to handlers. The registry is shared by the processors of every
//! connection that serves it, and bindings can change while traffic flows: re-binding a
//! name replaces the previous handler for all subsequent calls.
//!
//! Names beginning with `rpc.` are reserved for protocol extensions. Every registration
//! entry point goes through [`validate_method_name`] and rejects them with
//! [`Error::ReservedMethod`]; lookups under the prefix always miss.
//!
//! # Example
//!
//! ```rust
//! use jduo_core::{Registry, Response};
//!
//! let registry = Registry::new();
//! registry.bind("ping", |_params| Response::ok("\"pong\"")).unwrap();
//! assert!(registry.has_method("ping"));
//! assert!(registry.bind("rpc.discover", |_params| Response::ok("{}")).is_err());
//! ```

use crate::error::{Error, Result};
use crate::handler::{CallbackHandler, Handler, Responder, SyncHandler, NOTIFY_ACK};
use crate::types::Response;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Method-name prefix reserved by JSON-RPC 2.0
pub const RESERVED_PREFIX: &str = "rpc.";

/// Reject names under the reserved prefix
pub fn validate_method_name(name: &str) -> Result<()> {
    if name.starts_with(RESERVED_PREFIX) {
        return Err(Error::ReservedMethod(name.to_string()));
    }
    Ok(())
}

/// Shared table of bound methods
///
/// Cloning a registry yields another handle to the same table.
#[derive(Clone, Default)]
pub struct Registry {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn Handler>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler under `name`, replacing any previous binding
    pub fn register(&self, name: impl Into<String>, handler: Box<dyn Handler>) -> Result<()> {
        let name = name.into();
        validate_method_name(&name)?;

        let replaced = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), Arc::from(handler))
            .is_some();
        tracing::debug!(method = %name, replaced, "Method bound");
        Ok(())
    }

    /// Bind a synchronous handler
    pub fn bind<F>(&self, name: impl Into<String>, func: F) -> Result<()>
    where
        F: Fn(&str) -> Response + Send + Sync + 'static,
    {
        self.register(name, Box::new(SyncHandler::new(func)))
    }

    /// Bind a handler that completes through its [`Responder`]
    pub fn bind_async<F>(&self, name: impl Into<String>, func: F) -> Result<()>
    where
        F: Fn(String, Responder) + Send + Sync + 'static,
    {
        self.register(name, Box::new(CallbackHandler::new(func)))
    }

    /// Bind a fire-and-forget handler
    ///
    /// The caller always receives the acknowledgement `"OK"`.
    pub fn notify<F>(&self, name: impl Into<String>, func: F) -> Result<()>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.bind(name, move |params| {
            func(params);
            Response::ok(NOTIFY_ACK)
        })
    }

    /// Remove a binding, returning whether one existed
    pub fn unbind(&self, name: &str) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    /// Look up the handler bound under `name`
    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        if validate_method_name(name).is_err() {
            return None;
        }
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Names of all bound methods, sorted
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("methods", &self.methods())
            .finish()
    }
}
