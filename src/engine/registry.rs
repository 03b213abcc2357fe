// src/engine/registry.rs
//! Engine registration, selection and per-request binding.

use std::sync::Arc;

use super::{Engine, EngineDescriptor, EngineError, EngineFactory};
use crate::parser::{ChunkResult, StreamOutcome};
use crate::protocol::{CompletionRequest, Message, RequestContext};

/// How the selector walks the registry.
///
/// All three strategies traverse the same priority-sorted list and stop at
/// the first engine that accepts the context. `FirstMatch` names the intent
/// of "take whoever claims it first" and `Fallback` is reserved for
/// retry-on-failure semantics; today both behave exactly like `Priority`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionStrategy {
    #[default]
    Priority,
    FirstMatch,
    Fallback,
}

struct RegisteredEngine {
    descriptor: EngineDescriptor,
    factory: EngineFactory,
    /// Registration sequence number; selection order is by priority, but the
    /// last-resort fallback goes to the engine registered first.
    order: usize,
}

/// Holds every registered engine, sorted by descending priority (stable on
/// ties: earlier registration wins). Registration happens once at startup;
/// afterwards the registry is shared read-only across streams.
pub struct EngineRegistry {
    entries: Vec<RegisteredEngine>,
    strategy: SelectionStrategy,
    default_engine: Option<String>,
}

impl EngineRegistry {
    pub fn new(strategy: SelectionStrategy) -> Self {
        Self {
            entries: Vec::new(),
            strategy,
            default_engine: None,
        }
    }

    /// Register an engine. The sorted position is fixed at registration
    /// time; ties keep registration order.
    pub fn register(&mut self, descriptor: EngineDescriptor, factory: EngineFactory) {
        let order = self.entries.len();
        let pos = self
            .entries
            .iter()
            .position(|e| e.descriptor.priority < descriptor.priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(
            pos,
            RegisteredEngine {
                descriptor,
                factory,
                order,
            },
        );
    }

    /// Name the engine used when no `can_handle` predicate accepts.
    pub fn set_default_engine(&mut self, name: impl Into<String>) {
        self.default_engine = Some(name.into());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered engine names in selection order.
    pub fn engine_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|e| e.descriptor.name.as_str())
            .collect()
    }

    /// Pick an engine for the request and hand back a fresh instance.
    pub fn select(&self, ctx: &RequestContext) -> Result<Box<dyn Engine>, EngineError> {
        if self.entries.is_empty() {
            return Err(EngineError::EmptyRegistry);
        }

        // Priority, FirstMatch and Fallback share one traversal today; the
        // enum keeps the caller's intent explicit (see strategy docs).
        let _ = self.strategy;
        for entry in &self.entries {
            if entry.descriptor.accepts(ctx) {
                tracing::debug!(engine = %entry.descriptor.name, "engine selected");
                return Ok((entry.factory)());
            }
        }

        if let Some(name) = &self.default_engine {
            if let Some(entry) = self.entries.iter().find(|e| &e.descriptor.name == name) {
                tracing::debug!(engine = %name, "no engine accepted, using configured default");
                return Ok((entry.factory)());
            }
            tracing::warn!(engine = %name, "configured default engine is not registered");
        }

        let first = self
            .entries
            .iter()
            .min_by_key(|e| e.order)
            .ok_or(EngineError::EmptyRegistry)?;
        tracing::warn!(
            engine = %first.descriptor.name,
            "no engine accepted the request, degrading to first registered"
        );
        Ok((first.factory)())
    }
}

/// Binds one engine to one request. Once bound, every delegated call goes to
/// the same instance until `reset` starts the next request. Delegate calls
/// arriving before an explicit `bind` select implicitly.
pub struct EngineSelector {
    registry: Arc<EngineRegistry>,
    bound: Option<Box<dyn Engine>>,
}

impl EngineSelector {
    pub fn new(registry: Arc<EngineRegistry>) -> Self {
        Self {
            registry,
            bound: None,
        }
    }

    pub fn bind(&mut self, ctx: &RequestContext) -> Result<&mut dyn Engine, EngineError> {
        if self.bound.is_none() {
            self.bound = Some(self.registry.select(ctx)?);
        }
        Ok(self.bound.as_mut().unwrap().as_mut())
    }

    pub fn bound_engine_name(&self) -> Option<&'static str> {
        self.bound.as_ref().map(|e| e.name())
    }

    /// Drop the binding so the next call selects anew.
    pub fn reset(&mut self) {
        self.bound = None;
    }

    pub fn prepare_prompt(&mut self, ctx: &RequestContext) -> Result<String, EngineError> {
        let engine = self.bind(ctx)?;
        Ok(engine.prepare_prompt(ctx))
    }

    pub fn build_request(&mut self, ctx: &RequestContext) -> Result<CompletionRequest, EngineError> {
        let engine = self.bind(ctx)?;
        Ok(engine.build_request(ctx))
    }

    pub fn process_chunk(
        &mut self,
        ctx: &RequestContext,
        fragment: &str,
    ) -> Result<ChunkResult, EngineError> {
        let engine = self.bind(ctx)?;
        Ok(engine.process_chunk(fragment))
    }

    pub fn finalize(
        &mut self,
        ctx: &RequestContext,
        finish_reason: Option<String>,
    ) -> Result<StreamOutcome, EngineError> {
        let engine = self.bind(ctx)?;
        Ok(engine.finalize(finish_reason))
    }

    pub fn rebuild_history(
        &mut self,
        ctx: &RequestContext,
        outcome: &StreamOutcome,
    ) -> Result<Vec<Message>, EngineError> {
        let engine = self.bind(ctx)?;
        Ok(engine.rebuild_history(outcome))
    }
}
