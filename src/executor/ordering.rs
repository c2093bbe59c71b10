//! Test orderers
//!
//! Each level of the tree can be reordered by a user-supplied orderer. An
//! orderer that errors or panics, or whose result is not a permutation of
//! its input, is reported as a diagnostic and replaced by a random shuffle
//! of the catalog order.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::warn;

use crate::bus::DiagnosticSink;
use crate::models::{FailureInfo, TestCase, TestClass, TestCollection, TestMethod};

/// An entity an orderer can rearrange, identified by its unique ID
pub trait Orderable: Clone {
    fn order_id(&self) -> &str;
}

impl Orderable for Arc<TestCollection> {
    fn order_id(&self) -> &str {
        &self.unique_id
    }
}

impl Orderable for Arc<TestClass> {
    fn order_id(&self) -> &str {
        &self.unique_id
    }
}

impl Orderable for Arc<TestMethod> {
    fn order_id(&self) -> &str {
        &self.unique_id
    }
}

impl Orderable for Arc<TestCase> {
    fn order_id(&self) -> &str {
        &self.unique_id
    }
}

/// True when `ordered` holds exactly the items of `input`, each once
fn is_permutation<T: Orderable>(input: &[T], ordered: &[T]) -> bool {
    if input.len() != ordered.len() {
        return false;
    }
    let mut expected: Vec<&str> = input.iter().map(Orderable::order_id).collect();
    let mut actual: Vec<&str> = ordered.iter().map(Orderable::order_id).collect();
    expected.sort_unstable();
    actual.sort_unstable();
    expected == actual
}

pub trait TestCollectionOrderer: Send + Sync {
    fn order_collections(
        &self,
        collections: Vec<Arc<TestCollection>>,
    ) -> anyhow::Result<Vec<Arc<TestCollection>>>;
}

pub trait TestClassOrderer: Send + Sync {
    fn order_classes(&self, classes: Vec<Arc<TestClass>>) -> anyhow::Result<Vec<Arc<TestClass>>>;
}

pub trait TestMethodOrderer: Send + Sync {
    fn order_methods(&self, methods: Vec<Arc<TestMethod>>)
        -> anyhow::Result<Vec<Arc<TestMethod>>>;
}

pub trait TestCaseOrderer: Send + Sync {
    fn order_cases(&self, cases: Vec<Arc<TestCase>>) -> anyhow::Result<Vec<Arc<TestCase>>>;
}

/// Stable sort by unique ID
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultCaseOrderer;

impl TestCaseOrderer for DefaultCaseOrderer {
    fn order_cases(&self, mut cases: Vec<Arc<TestCase>>) -> anyhow::Result<Vec<Arc<TestCase>>> {
        cases.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));
        Ok(cases)
    }
}

/// Stable sort by unique ID
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultMethodOrderer;

impl TestMethodOrderer for DefaultMethodOrderer {
    fn order_methods(
        &self,
        mut methods: Vec<Arc<TestMethod>>,
    ) -> anyhow::Result<Vec<Arc<TestMethod>>> {
        methods.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));
        Ok(methods)
    }
}

/// Stable sort by unique ID
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultClassOrderer;

impl TestClassOrderer for DefaultClassOrderer {
    fn order_classes(
        &self,
        mut classes: Vec<Arc<TestClass>>,
    ) -> anyhow::Result<Vec<Arc<TestClass>>> {
        classes.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));
        Ok(classes)
    }
}

/// Orders collections by a per-process random hash of their unique ID
#[derive(Clone, Debug, Default)]
pub struct DefaultCollectionOrderer {
    hasher: RandomState,
}

impl DefaultCollectionOrderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TestCollectionOrderer for DefaultCollectionOrderer {
    fn order_collections(
        &self,
        mut collections: Vec<Arc<TestCollection>>,
    ) -> anyhow::Result<Vec<Arc<TestCollection>>> {
        collections.sort_by_cached_key(|c| self.hasher.hash_one(&c.unique_id));
        Ok(collections)
    }
}

/// Applies orderers with the shuffle fallback
pub struct OrderingPolicy {
    diagnostics: DiagnosticSink,
    rng: Mutex<StdRng>,
}

impl OrderingPolicy {
    /// Fallback shuffles are reproducible when `seed` is set
    pub fn new(diagnostics: DiagnosticSink, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            diagnostics,
            rng: Mutex::new(rng),
        }
    }

    /// Run `order` over `items`; on failure, diagnose and shuffle the input
    pub fn apply<T: Orderable>(
        &self,
        level: &str,
        owner: &str,
        items: Vec<T>,
        order: impl FnOnce(Vec<T>) -> anyhow::Result<Vec<T>>,
    ) -> Vec<T> {
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| order(items.clone())));
        let reason = match outcome {
            Ok(Ok(ordered)) if is_permutation(&items, &ordered) => return ordered,
            Ok(Ok(ordered)) if ordered.len() != items.len() => {
                format!("returned {} of {} items", ordered.len(), items.len())
            }
            Ok(Ok(_)) => "returned duplicate or unknown items".to_string(),
            Ok(Err(e)) => format!("{e:#}"),
            Err(panic) => FailureInfo::from_panic(&*panic).message().to_string(),
        };

        let text = format!(
            "{level} orderer for '{owner}' failed ({reason}); running in random order"
        );
        warn!("{}", text);
        self.diagnostics.message(text);

        let mut items = items;
        items.shuffle(&mut *self.rng.lock());
        items
    }

    pub fn order_collections(
        &self,
        owner: &str,
        orderer: &dyn TestCollectionOrderer,
        collections: Vec<Arc<TestCollection>>,
    ) -> Vec<Arc<TestCollection>> {
        self.apply("Collection", owner, collections, |c| orderer.order_collections(c))
    }

    pub fn order_classes(
        &self,
        owner: &str,
        orderer: &dyn TestClassOrderer,
        classes: Vec<Arc<TestClass>>,
    ) -> Vec<Arc<TestClass>> {
        self.apply("Class", owner, classes, |c| orderer.order_classes(c))
    }

    pub fn order_methods(
        &self,
        owner: &str,
        orderer: &dyn TestMethodOrderer,
        methods: Vec<Arc<TestMethod>>,
    ) -> Vec<Arc<TestMethod>> {
        self.apply("Method", owner, methods, |m| orderer.order_methods(m))
    }

    pub fn order_cases(
        &self,
        owner: &str,
        orderer: &dyn TestCaseOrderer,
        cases: Vec<Arc<TestCase>>,
    ) -> Vec<Arc<TestCase>> {
        self.apply("Case", owner, cases, |c| orderer.order_cases(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{CollectingSink, MessageBus};
    use crate::models::{Message, MessageKind};

    fn collections(ids: &[&str]) -> Vec<Arc<TestCollection>> {
        ids.iter()
            .map(|id| Arc::new(TestCollection::new(*id, *id)))
            .collect()
    }

    fn ids(collections: &[Arc<TestCollection>]) -> Vec<String> {
        collections.iter().map(|c| c.unique_id.clone()).collect()
    }

    struct Failing;
    impl TestCollectionOrderer for Failing {
        fn order_collections(
            &self,
            _: Vec<Arc<TestCollection>>,
        ) -> anyhow::Result<Vec<Arc<TestCollection>>> {
            anyhow::bail!("orderer is broken")
        }
    }

    struct Panicking;
    impl TestCollectionOrderer for Panicking {
        fn order_collections(
            &self,
            _: Vec<Arc<TestCollection>>,
        ) -> anyhow::Result<Vec<Arc<TestCollection>>> {
            panic!("orderer panicked")
        }
    }

    struct Duplicating;
    impl TestCollectionOrderer for Duplicating {
        fn order_collections(
            &self,
            collections: Vec<Arc<TestCollection>>,
        ) -> anyhow::Result<Vec<Arc<TestCollection>>> {
            Ok(vec![collections[0].clone(); collections.len()])
        }
    }

    struct Lossy;
    impl TestCollectionOrderer for Lossy {
        fn order_collections(
            &self,
            mut collections: Vec<Arc<TestCollection>>,
        ) -> anyhow::Result<Vec<Arc<TestCollection>>> {
            collections.pop();
            Ok(collections)
        }
    }

    #[test]
    fn test_default_collection_order_is_a_permutation_and_stable_per_process() {
        let orderer = DefaultCollectionOrderer::new();
        let first = orderer
            .order_collections(collections(&["a", "b", "c", "d"]))
            .unwrap();
        let second = orderer
            .order_collections(collections(&["d", "c", "b", "a"]))
            .unwrap();

        assert_eq!(ids(&first), ids(&second));
        let mut sorted = ids(&first);
        sorted.sort();
        assert_eq!(sorted, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_broken_orderers_fall_back_with_a_diagnostic() {
        let bus = Arc::new(MessageBus::new());
        let sink = Arc::new(CollectingSink::new());
        bus.subscribe(MessageKind::Diagnostic, sink.clone());
        let policy = OrderingPolicy::new(DiagnosticSink::new(Arc::downgrade(&bus)), Some(7));

        let orderers: [&dyn TestCollectionOrderer; 4] =
            [&Failing, &Panicking, &Lossy, &Duplicating];
        for orderer in orderers {
            let ordered = policy.order_collections("asm", orderer, collections(&["x", "y", "z"]));
            let mut seen = ids(&ordered);
            seen.sort();
            assert_eq!(seen, vec!["x", "y", "z"]);
        }

        let diagnostics = sink.of_kind(MessageKind::Diagnostic);
        assert_eq!(diagnostics.len(), 4);
        let texts: Vec<_> = diagnostics
            .iter()
            .map(|m| match m {
                Message::Diagnostic { text } => text.clone(),
                _ => String::new(),
            })
            .collect();
        assert!(texts[0].contains("orderer is broken"));
        assert!(texts[1].contains("orderer panicked"));
        assert!(texts[2].contains("returned 2 of 3 items"));
        assert!(texts[3].contains("duplicate or unknown items"));
    }
}
