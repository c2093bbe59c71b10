//! Test catalogs
//!
//! Sources of `TestAssembly` plus `TestCase` descriptors for the host
//! binary. Library users usually build these in code instead.

mod script;

pub use script::{
    CaseScript, ClassScript, CollectionScript, DefinitionScript, FixtureScript, MethodScript,
    Outcome, ScriptedCatalog, ScriptedFixture,
};
