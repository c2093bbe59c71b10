//! Test entity descriptors
//!
//! The catalog handed to the scheduler: assemblies, collections, classes,
//! methods and cases. Identity belongs to the discovery side; the scheduler
//! only reads these.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::executor::{
    TestCaseOrderer, TestClassOrderer, TestCollectionOrderer, TestContext, TestMethodOrderer,
};
use crate::fixture::{FixtureDescriptor, GenericFixtureDescriptor};

/// Level of an entity in the fixed run hierarchy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityLevel {
    Assembly,
    Collection,
    Class,
    Method,
    Case,
    Test,
}

impl EntityLevel {
    pub fn name(&self) -> &'static str {
        match self {
            EntityLevel::Assembly => "Assembly",
            EntityLevel::Collection => "Collection",
            EntityLevel::Class => "Class",
            EntityLevel::Method => "Method",
            EntityLevel::Case => "Case",
            EntityLevel::Test => "Test",
        }
    }
}

impl fmt::Display for EntityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Self-describing reference to an entity, carried on every message
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub level: EntityLevel,
    pub unique_id: String,
    pub display_name: String,
    /// Unique IDs of the ancestors, outermost first
    pub ancestry: Vec<String>,
}

impl EntityRef {
    pub fn new(
        level: EntityLevel,
        unique_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            level,
            unique_id: unique_id.into(),
            display_name: display_name.into(),
            ancestry: Vec::new(),
        }
    }

    pub fn with_ancestry(mut self, ancestry: Vec<String>) -> Self {
        self.ancestry = ancestry;
        self
    }

    /// Key used by the bus ledger to track Starting/Finished pairs
    pub fn ledger_key(&self) -> (EntityLevel, String) {
        (self.level, self.unique_id.clone())
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.level, self.display_name)
    }
}

/// Multi-valued trait map (`Category=Integration`, `Owner=alice`, ...)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Traits(BTreeMap<String, BTreeSet<String>>);

impl Traits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.entry(name.into()).or_default().insert(value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str, value: &str) -> bool {
        self.0.get(name).map(|v| v.contains(value)).unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.0.iter()
    }
}

/// Optional source location hint from discovery
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub file: String,
    pub line: Option<u32>,
}

/// Collection definition: shared fixtures and policies for a named collection
#[derive(Clone)]
pub struct CollectionDefinition {
    pub name: String,
    pub fixtures: Vec<FixtureDescriptor>,
    pub generic_fixtures: Vec<GenericFixtureDescriptor>,
    /// Run this collection after the parallel batch, on its own
    pub disable_parallelization: bool,
    pub method_orderer: Option<Arc<dyn TestMethodOrderer>>,
    pub case_orderer: Option<Arc<dyn TestCaseOrderer>>,
    pub class_orderer: Option<Arc<dyn TestClassOrderer>>,
}

impl CollectionDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fixtures: Vec::new(),
            generic_fixtures: Vec::new(),
            disable_parallelization: false,
            method_orderer: None,
            case_orderer: None,
            class_orderer: None,
        }
    }

    pub fn fixture(mut self, fixture: FixtureDescriptor) -> Self {
        self.fixtures.push(fixture);
        self
    }

    pub fn generic_fixture(mut self, fixture: GenericFixtureDescriptor) -> Self {
        self.generic_fixtures.push(fixture);
        self
    }

    pub fn disable_parallelization(mut self) -> Self {
        self.disable_parallelization = true;
        self
    }

    pub fn method_orderer(mut self, orderer: Arc<dyn TestMethodOrderer>) -> Self {
        self.method_orderer = Some(orderer);
        self
    }

    pub fn case_orderer(mut self, orderer: Arc<dyn TestCaseOrderer>) -> Self {
        self.case_orderer = Some(orderer);
        self
    }

    pub fn class_orderer(mut self, orderer: Arc<dyn TestClassOrderer>) -> Self {
        self.class_orderer = Some(orderer);
        self
    }
}

impl fmt::Debug for CollectionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionDefinition")
            .field("name", &self.name)
            .field("fixtures", &self.fixtures.len())
            .field("disable_parallelization", &self.disable_parallelization)
            .finish()
    }
}

/// Top of the hierarchy: one assembly per run
#[derive(Clone)]
pub struct TestAssembly {
    pub unique_id: String,
    pub display_name: String,
    pub traits: Traits,
    pub fixtures: Vec<FixtureDescriptor>,
    pub generic_fixtures: Vec<GenericFixtureDescriptor>,
    pub collection_definitions: Vec<CollectionDefinition>,
    pub collection_orderer: Option<Arc<dyn TestCollectionOrderer>>,
    pub method_orderer: Option<Arc<dyn TestMethodOrderer>>,
    pub case_orderer: Option<Arc<dyn TestCaseOrderer>>,
    pub class_orderer: Option<Arc<dyn TestClassOrderer>>,
}

impl TestAssembly {
    pub fn new(unique_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            unique_id: unique_id.into(),
            display_name: display_name.into(),
            traits: Traits::new(),
            fixtures: Vec::new(),
            generic_fixtures: Vec::new(),
            collection_definitions: Vec::new(),
            collection_orderer: None,
            method_orderer: None,
            case_orderer: None,
            class_orderer: None,
        }
    }

    pub fn fixture(mut self, fixture: FixtureDescriptor) -> Self {
        self.fixtures.push(fixture);
        self
    }

    pub fn generic_fixture(mut self, fixture: GenericFixtureDescriptor) -> Self {
        self.generic_fixtures.push(fixture);
        self
    }

    pub fn collection_definition(mut self, definition: CollectionDefinition) -> Self {
        self.collection_definitions.push(definition);
        self
    }

    pub fn collection_orderer(mut self, orderer: Arc<dyn TestCollectionOrderer>) -> Self {
        self.collection_orderer = Some(orderer);
        self
    }

    pub fn method_orderer(mut self, orderer: Arc<dyn TestMethodOrderer>) -> Self {
        self.method_orderer = Some(orderer);
        self
    }

    pub fn case_orderer(mut self, orderer: Arc<dyn TestCaseOrderer>) -> Self {
        self.case_orderer = Some(orderer);
        self
    }

    pub fn class_orderer(mut self, orderer: Arc<dyn TestClassOrderer>) -> Self {
        self.class_orderer = Some(orderer);
        self
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(EntityLevel::Assembly, &self.unique_id, &self.display_name)
    }

    /// Definitions registered under `name`; more than one is a configuration error
    pub fn definitions_named(&self, name: &str) -> Vec<&CollectionDefinition> {
        self.collection_definitions
            .iter()
            .filter(|d| d.name == name)
            .collect()
    }
}

impl fmt::Debug for TestAssembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestAssembly")
            .field("unique_id", &self.unique_id)
            .field("display_name", &self.display_name)
            .field("fixtures", &self.fixtures.len())
            .field("collection_definitions", &self.collection_definitions)
            .finish()
    }
}

/// Unit of fixture sharing and potential parallelism
#[derive(Clone, Debug)]
pub struct TestCollection {
    pub unique_id: String,
    pub display_name: String,
    pub traits: Traits,
    /// Name of the collection definition, if any
    pub definition: Option<String>,
}

impl TestCollection {
    pub fn new(unique_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            unique_id: unique_id.into(),
            display_name: display_name.into(),
            traits: Traits::new(),
            definition: None,
        }
    }

    pub fn with_definition(mut self, name: impl Into<String>) -> Self {
        self.definition = Some(name.into());
        self
    }

    pub fn entity_ref(&self, assembly_id: &str) -> EntityRef {
        EntityRef::new(EntityLevel::Collection, &self.unique_id, &self.display_name)
            .with_ancestry(vec![assembly_id.to_string()])
    }
}

#[derive(Clone)]
pub struct TestClass {
    pub unique_id: String,
    pub display_name: String,
    pub traits: Traits,
    pub collection: Arc<TestCollection>,
    pub fixtures: Vec<FixtureDescriptor>,
    pub generic_fixtures: Vec<GenericFixtureDescriptor>,
    pub method_orderer: Option<Arc<dyn TestMethodOrderer>>,
    pub case_orderer: Option<Arc<dyn TestCaseOrderer>>,
}

impl TestClass {
    pub fn new(
        unique_id: impl Into<String>,
        display_name: impl Into<String>,
        collection: Arc<TestCollection>,
    ) -> Self {
        Self {
            unique_id: unique_id.into(),
            display_name: display_name.into(),
            traits: Traits::new(),
            collection,
            fixtures: Vec::new(),
            generic_fixtures: Vec::new(),
            method_orderer: None,
            case_orderer: None,
        }
    }

    pub fn fixture(mut self, fixture: FixtureDescriptor) -> Self {
        self.fixtures.push(fixture);
        self
    }

    pub fn generic_fixture(mut self, fixture: GenericFixtureDescriptor) -> Self {
        self.generic_fixtures.push(fixture);
        self
    }

    pub fn method_orderer(mut self, orderer: Arc<dyn TestMethodOrderer>) -> Self {
        self.method_orderer = Some(orderer);
        self
    }

    pub fn case_orderer(mut self, orderer: Arc<dyn TestCaseOrderer>) -> Self {
        self.case_orderer = Some(orderer);
        self
    }

    pub fn entity_ref(&self, assembly_id: &str) -> EntityRef {
        EntityRef::new(EntityLevel::Class, &self.unique_id, &self.display_name).with_ancestry(vec![
            assembly_id.to_string(),
            self.collection.unique_id.clone(),
        ])
    }
}

impl fmt::Debug for TestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestClass")
            .field("unique_id", &self.unique_id)
            .field("display_name", &self.display_name)
            .field("collection", &self.collection.unique_id)
            .field("fixtures", &self.fixtures.len())
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct TestMethod {
    pub unique_id: String,
    pub display_name: String,
    pub traits: Traits,
    pub class: Arc<TestClass>,
}

impl TestMethod {
    pub fn new(
        unique_id: impl Into<String>,
        display_name: impl Into<String>,
        class: Arc<TestClass>,
    ) -> Self {
        Self {
            unique_id: unique_id.into(),
            display_name: display_name.into(),
            traits: Traits::new(),
            class,
        }
    }

    pub fn entity_ref(&self, assembly_id: &str) -> EntityRef {
        EntityRef::new(EntityLevel::Method, &self.unique_id, &self.display_name).with_ancestry(
            vec![
                assembly_id.to_string(),
                self.class.collection.unique_id.clone(),
                self.class.unique_id.clone(),
            ],
        )
    }
}

type BodyFn = dyn Fn(TestContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// The executable part of a test case
#[derive(Clone)]
pub struct TestBody(Arc<BodyFn>);

impl TestBody {
    /// Async body; an `Err` is reported as a failure
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self(Arc::new(move |ctx| Box::pin(f(ctx))))
    }

    /// Synchronous body, run inline on the executing worker
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&TestContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self(Arc::new(move |ctx| {
            let f = f.clone();
            Box::pin(async move { f(&ctx) })
        }))
    }

    pub fn call(&self, ctx: TestContext) -> BoxFuture<'static, anyhow::Result<()>> {
        (self.0)(ctx)
    }
}

impl fmt::Debug for TestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TestBody(..)")
    }
}

/// A single runnable test case
#[derive(Clone, Debug)]
pub struct TestCase {
    pub unique_id: String,
    pub display_name: String,
    pub traits: Traits,
    pub method: Arc<TestMethod>,
    pub skip_reason: Option<String>,
    /// Only run when explicit tests are requested
    pub explicit: bool,
    pub source: Option<SourceInfo>,
    pub body: TestBody,
}

impl TestCase {
    pub fn new(
        unique_id: impl Into<String>,
        display_name: impl Into<String>,
        method: Arc<TestMethod>,
        body: TestBody,
    ) -> Self {
        Self {
            unique_id: unique_id.into(),
            display_name: display_name.into(),
            traits: Traits::new(),
            method,
            skip_reason: None,
            explicit: false,
            source: None,
            body,
        }
    }

    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip_reason = Some(reason.into());
        self
    }

    pub fn explicit(mut self) -> Self {
        self.explicit = true;
        self
    }

    pub fn with_trait(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.traits.add(name, value);
        self
    }

    pub fn with_source(mut self, file: impl Into<String>, line: Option<u32>) -> Self {
        self.source = Some(SourceInfo {
            file: file.into(),
            line,
        });
        self
    }

    pub fn class(&self) -> &Arc<TestClass> {
        &self.method.class
    }

    pub fn collection(&self) -> &Arc<TestCollection> {
        &self.method.class.collection
    }

    pub fn entity_ref(&self, assembly_id: &str) -> EntityRef {
        EntityRef::new(EntityLevel::Case, &self.unique_id, &self.display_name).with_ancestry(vec![
            assembly_id.to_string(),
            self.collection().unique_id.clone(),
            self.class().unique_id.clone(),
            self.method.unique_id.clone(),
        ])
    }

    /// The single test produced by this case
    pub fn test_ref(&self, assembly_id: &str) -> EntityRef {
        let mut entity = self.entity_ref(assembly_id);
        entity.ancestry.push(self.unique_id.clone());
        entity.level = EntityLevel::Test;
        entity
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traits_are_multi_valued() {
        let traits = Traits::new()
            .with("Category", "Integration")
            .with("Category", "Slow")
            .with("Owner", "infra");

        assert_eq!(traits.get("Category").map(|v| v.len()), Some(2));
        assert!(traits.contains("Owner", "infra"));
        assert!(!traits.contains("Owner", "web"));
    }

    #[test]
    fn test_entity_refs_carry_ancestry() {
        let collection = Arc::new(TestCollection::new("col-1", "Collection 1"));
        let class = Arc::new(TestClass::new("cls-1", "MathTests", collection));
        let method = Arc::new(TestMethod::new("m-1", "adds", class));
        let case = TestCase::new("case-1", "adds(1, 2)", method, TestBody::sync(|_| Ok(())));

        let entity = case.entity_ref("asm");
        assert_eq!(entity.level, EntityLevel::Case);
        assert_eq!(entity.ancestry, vec!["asm", "col-1", "cls-1", "m-1"]);

        let test = case.test_ref("asm");
        assert_eq!(test.level, EntityLevel::Test);
        assert_ne!(test.ledger_key(), entity.ledger_key());
    }

    #[test]
    fn test_duplicate_definitions_are_visible() {
        let assembly = TestAssembly::new("asm", "Assembly")
            .collection_definition(CollectionDefinition::new("db"))
            .collection_definition(CollectionDefinition::new("db"))
            .collection_definition(CollectionDefinition::new("web"));

        assert_eq!(assembly.definitions_named("db").len(), 2);
        assert_eq!(assembly.definitions_named("web").len(), 1);
        assert!(assembly.definitions_named("none").is_empty());
    }
}
