//! Well-known injectables
//!
//! Values every scope can hand to a fixture constructor without the
//! fixture being registered: the diagnostic sink and a context accessor.

use std::sync::{Arc, Weak};

use super::{ErasedFixture, Fixture, FixtureInstance, FixtureKey, FixtureScope};
use crate::bus::{DiagnosticSink, MessageBus};
use crate::models::EntityRef;

/// Read-only view of where a fixture lives in the run
#[derive(Clone, Debug)]
pub struct ContextAccessor {
    scope: FixtureScope,
    assembly: EntityRef,
    collection: Option<EntityRef>,
    class: Option<EntityRef>,
    bus: Weak<MessageBus>,
}

impl ContextAccessor {
    pub fn for_assembly(assembly: EntityRef, bus: Weak<MessageBus>) -> Self {
        Self {
            scope: FixtureScope::Assembly,
            assembly,
            collection: None,
            class: None,
            bus,
        }
    }

    pub fn for_collection(&self, collection: EntityRef) -> Self {
        Self {
            scope: FixtureScope::Collection,
            collection: Some(collection),
            class: None,
            ..self.clone()
        }
    }

    pub fn for_class(&self, class: EntityRef) -> Self {
        Self {
            scope: FixtureScope::Class,
            class: Some(class),
            ..self.clone()
        }
    }

    pub fn scope(&self) -> FixtureScope {
        self.scope
    }

    pub fn assembly(&self) -> &EntityRef {
        &self.assembly
    }

    pub fn collection(&self) -> Option<&EntityRef> {
        self.collection.as_ref()
    }

    pub fn class(&self) -> Option<&EntityRef> {
        self.class.as_ref()
    }

    /// False once the run is stopping or the bus is gone
    pub fn keep_running(&self) -> bool {
        self.bus.upgrade().is_some_and(|bus| bus.keep_running())
    }
}

impl Fixture for ContextAccessor {}

/// The injectable values of one scope
#[derive(Clone)]
pub struct Injectables {
    diagnostics: FixtureInstance,
    context: FixtureInstance,
}

impl Injectables {
    pub fn new(diagnostics: DiagnosticSink, context: ContextAccessor) -> Self {
        Self {
            diagnostics: FixtureInstance::new(
                FixtureKey::of::<DiagnosticSink>(),
                ErasedFixture::new(diagnostics),
            ),
            context: FixtureInstance::new(
                FixtureKey::of::<ContextAccessor>(),
                ErasedFixture::new(context),
            ),
        }
    }

    /// Injectables for a nested scope: same diagnostics, narrower context
    pub fn nested(&self, context: ContextAccessor) -> Self {
        Self {
            diagnostics: self.diagnostics.clone(),
            context: FixtureInstance::new(
                FixtureKey::of::<ContextAccessor>(),
                ErasedFixture::new(context),
            ),
        }
    }

    pub fn lookup(&self, key: &FixtureKey) -> Option<FixtureInstance> {
        [&self.diagnostics, &self.context]
            .into_iter()
            .find(|i| i.key() == key)
            .cloned()
    }

    pub fn diagnostics(&self) -> Arc<DiagnosticSink> {
        self.diagnostics
            .downcast::<DiagnosticSink>()
            .unwrap_or_else(|| Arc::new(DiagnosticSink::disabled()))
    }

    pub fn context(&self) -> Option<Arc<ContextAccessor>> {
        self.context.downcast::<ContextAccessor>()
    }
}
