//! Per-scope fixture lifecycle manager
//!
//! One manager per assembly, collection and class. Lookups and construction
//! are serialized behind an async mutex, which is what makes construction
//! at-most-once even when many tests ask for the same fixture at once.

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    FixtureDescriptor, FixtureInstance, FixtureKey, FixtureScope, GenericFixtureDescriptor,
    Injectables, ResolvedArgs,
};
use crate::error::{ConfigurationError, DisposeStage, FixtureError, MissingParameter};
use crate::models::FailureInfo;

enum CacheEntry {
    Ready(FixtureInstance),
    InitFailed(FixtureInstance, FixtureError),
    ConstructFailed(FixtureError),
}

impl CacheEntry {
    fn outcome(&self) -> Result<FixtureInstance, FixtureError> {
        match self {
            CacheEntry::Ready(instance) => Ok(instance.clone()),
            CacheEntry::InitFailed(_, err) | CacheEntry::ConstructFailed(err) => Err(err.clone()),
        }
    }

    fn instance(&self) -> Option<&FixtureInstance> {
        match self {
            CacheEntry::Ready(instance) | CacheEntry::InitFailed(instance, _) => Some(instance),
            CacheEntry::ConstructFailed(_) => None,
        }
    }
}

#[derive(Default)]
struct ScopeState {
    known: HashMap<FixtureKey, FixtureDescriptor>,
    generics: HashMap<String, GenericFixtureDescriptor>,
    cache: HashMap<FixtureKey, CacheEntry>,
    created: Vec<FixtureKey>,
    disposed: bool,
}

pub struct FixtureLifecycleManager {
    scope: FixtureScope,
    owner: String,
    parent: Option<Arc<FixtureLifecycleManager>>,
    injectables: Injectables,
    state: Mutex<ScopeState>,
}

impl FixtureLifecycleManager {
    pub fn new(scope: FixtureScope, owner: impl Into<String>, injectables: Injectables) -> Self {
        Self {
            scope,
            owner: owner.into(),
            parent: None,
            injectables,
            state: Mutex::new(ScopeState::default()),
        }
    }

    /// Fall back to `parent` for anything this scope cannot satisfy
    pub fn with_parent(mut self, parent: Arc<FixtureLifecycleManager>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn scope(&self) -> FixtureScope {
        self.scope
    }

    pub fn injectables(&self) -> &Injectables {
        &self.injectables
    }

    /// Register fixture types and eagerly build the concrete ones.
    ///
    /// Every failure is collected; the returned error aggregates all of them.
    pub async fn initialize(
        &self,
        fixtures: Vec<FixtureDescriptor>,
        generics: Vec<GenericFixtureDescriptor>,
    ) -> Result<(), FixtureError> {
        let mut state = self.state.lock().await;
        let eager = self.register_locked(&mut state, fixtures, generics)?;

        let mut errors = Vec::new();
        for key in eager {
            let mut resolving = Vec::new();
            if let Err(e) = self.get_locked(&mut state, &key, &mut resolving).await {
                errors.push(e);
            }
        }

        match FixtureError::from_many(errors) {
            Some(err) => {
                warn!("{} fixtures for {} failed: {}", self.scope, self.owner, err);
                Err(err)
            }
            None => {
                debug!(
                    "{} fixtures ready for {} ({} cached)",
                    self.scope,
                    self.owner,
                    state.created.len()
                );
                Ok(())
            }
        }
    }

    /// Register fixture types without building them; they are built on first request
    pub async fn register(
        &self,
        fixtures: Vec<FixtureDescriptor>,
        generics: Vec<GenericFixtureDescriptor>,
    ) -> Result<(), FixtureError> {
        let mut state = self.state.lock().await;
        self.register_locked(&mut state, fixtures, generics)
            .map(|_| ())
    }

    fn register_locked(
        &self,
        state: &mut ScopeState,
        fixtures: Vec<FixtureDescriptor>,
        generics: Vec<GenericFixtureDescriptor>,
    ) -> Result<Vec<FixtureKey>, FixtureError> {
        if state.disposed {
            return Err(FixtureError::Disposed { scope: self.scope });
        }

        let mut added = Vec::with_capacity(fixtures.len());
        for descriptor in fixtures {
            let key = descriptor.key().clone();
            if state.known.contains_key(&key) {
                debug!("{} fixture {} registered twice; keeping the first", self.scope, key);
                continue;
            }
            state.known.insert(key.clone(), descriptor);
            added.push(key);
        }
        for generic in generics {
            state.generics.insert(generic.open_name().to_string(), generic);
        }
        Ok(added)
    }

    /// Look up (building on first use) a fixture registered in this scope only
    pub async fn get_fixture(
        &self,
        key: &FixtureKey,
    ) -> Result<Option<FixtureInstance>, FixtureError> {
        let mut state = self.state.lock().await;
        if state.disposed {
            return Err(FixtureError::Disposed { scope: self.scope });
        }
        let mut resolving = Vec::new();
        self.get_locked(&mut state, key, &mut resolving).await
    }

    /// Injectables first, then this scope, then each parent in turn
    pub async fn resolve(
        &self,
        key: &FixtureKey,
    ) -> Result<Option<FixtureInstance>, FixtureError> {
        if let Some(injected) = self.injectables.lookup(key) {
            return Ok(Some(injected));
        }

        let mut manager = self;
        loop {
            if let Some(found) = manager.get_fixture(key).await? {
                return Ok(Some(found));
            }
            match &manager.parent {
                Some(parent) => manager = parent,
                None => return Ok(None),
            }
        }
    }

    /// Typed convenience over [`resolve`](Self::resolve)
    pub async fn resolve_typed<T: Send + Sync + 'static>(
        &self,
    ) -> Result<Option<Arc<T>>, FixtureError> {
        Ok(self
            .resolve(&FixtureKey::of::<T>())
            .await?
            .and_then(|instance| instance.downcast::<T>()))
    }

    pub async fn cached_count(&self) -> usize {
        self.state.lock().await.created.len()
    }

    pub async fn is_disposed(&self) -> bool {
        self.state.lock().await.disposed
    }

    fn get_locked<'a>(
        &'a self,
        state: &'a mut ScopeState,
        key: &'a FixtureKey,
        resolving: &'a mut Vec<FixtureKey>,
    ) -> BoxFuture<'a, Result<Option<FixtureInstance>, FixtureError>> {
        Box::pin(async move {
            if let Some(entry) = state.cache.get(key) {
                return entry.outcome().map(Some);
            }

            let descriptor = match state.known.get(key) {
                Some(descriptor) => descriptor.clone(),
                None => {
                    let generic = key.open_name().and_then(|open| state.generics.get(open));
                    match generic {
                        Some(generic) => generic.close(self.scope, key.args())?,
                        None => return Ok(None),
                    }
                }
            };

            self.construct(state, descriptor, resolving).await.map(Some)
        })
    }

    async fn construct(
        &self,
        state: &mut ScopeState,
        descriptor: FixtureDescriptor,
        resolving: &mut Vec<FixtureKey>,
    ) -> Result<FixtureInstance, FixtureError> {
        let key = descriptor.key().clone();

        if resolving.contains(&key) {
            let mut chain: Vec<String> = resolving.iter().map(ToString::to_string).collect();
            chain.push(key.to_string());
            return Err(ConfigurationError::CircularDependency {
                scope: self.scope,
                fixture: key.to_string(),
                chain,
            }
            .into());
        }

        let constructor = descriptor.select_constructor(self.scope)?;

        resolving.push(key.clone());
        let resolved = self.resolve_arguments(state, constructor.params(), resolving).await;
        resolving.pop();

        let (args, missing) = resolved?;
        if !missing.is_empty() {
            return Err(ConfigurationError::UnresolvedParameters {
                scope: self.scope,
                fixture: key.to_string(),
                missing,
            }
            .into());
        }

        let built = std::panic::catch_unwind(AssertUnwindSafe(|| constructor.build(&args)));
        let value = match built {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                return Err(self.remember_failure(state, &key, FailureInfo::from_anyhow(&e)))
            }
            Err(panic) => {
                return Err(self.remember_failure(state, &key, FailureInfo::from_panic(&*panic)))
            }
        };

        let instance = FixtureInstance::new(key.clone(), value);
        let init_error = match instance.lifecycle().initialize() {
            Some(init) => match AssertUnwindSafe(init).catch_unwind().await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(FailureInfo::from_anyhow(&e)),
                Err(panic) => Some(FailureInfo::from_panic(&*panic)),
            },
            None => None,
        }
        .map(|failure| FixtureError::Initialization {
            scope: self.scope,
            fixture: key.to_string(),
            failure,
        });

        state.created.push(key.clone());
        match init_error {
            Some(err) => {
                warn!("{} fixture {} failed to initialize: {}", self.scope, key, err);
                state
                    .cache
                    .insert(key, CacheEntry::InitFailed(instance, err.clone()));
                Err(err)
            }
            None => {
                debug!("Created {} fixture {} for {}", self.scope, key, self.owner);
                state.cache.insert(key, CacheEntry::Ready(instance.clone()));
                Ok(instance)
            }
        }
    }

    async fn resolve_arguments(
        &self,
        state: &mut ScopeState,
        params: &[super::ParameterSpec],
        resolving: &mut Vec<FixtureKey>,
    ) -> Result<(ResolvedArgs, Vec<MissingParameter>), FixtureError> {
        let mut args = ResolvedArgs::new();
        let mut missing = Vec::new();

        for param in params {
            if let Some(injected) = self.injectables.lookup(&param.key) {
                args.insert(&param.name, injected);
                continue;
            }

            let local = self.get_locked(state, &param.key, resolving).await?;
            let found = match local {
                Some(instance) => Some(instance),
                None => match &self.parent {
                    Some(parent) => parent.resolve(&param.key).await?,
                    None => None,
                },
            };

            match found {
                Some(instance) => args.insert(&param.name, instance),
                None => missing.push(MissingParameter {
                    name: param.name.clone(),
                    type_name: param.key.to_string(),
                }),
            }
        }

        Ok((args, missing))
    }

    fn remember_failure(
        &self,
        state: &mut ScopeState,
        key: &FixtureKey,
        failure: FailureInfo,
    ) -> FixtureError {
        let err = FixtureError::Construction {
            scope: self.scope,
            fixture: key.to_string(),
            failure,
        };
        warn!("{}", err);
        state
            .cache
            .insert(key.clone(), CacheEntry::ConstructFailed(err.clone()));
        err
    }

    /// Dispose everything this scope created. Idempotent.
    ///
    /// Async disposers run concurrently first, then sync disposers in
    /// reverse creation order. Every failure is collected.
    pub async fn dispose(&self) -> Result<(), FixtureError> {
        let mut state = self.state.lock().await;
        if state.disposed {
            return Ok(());
        }
        state.disposed = true;

        let instances: Vec<FixtureInstance> = state
            .created
            .iter()
            .filter_map(|key| state.cache.get(key).and_then(CacheEntry::instance).cloned())
            .collect();

        let async_disposals = instances.iter().filter_map(|instance| {
            instance.lifecycle().dispose_async().map(|fut| async move {
                let outcome = AssertUnwindSafe(fut).catch_unwind().await;
                (instance.key(), outcome)
            })
        });

        let mut errors = Vec::new();
        for (key, outcome) in join_all(async_disposals).await {
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => FailureInfo::from_anyhow(&e),
                Err(panic) => FailureInfo::from_panic(&*panic),
            };
            errors.push(self.disposal_error(key, DisposeStage::Async, failure));
        }

        for instance in instances.iter().rev() {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| instance.lifecycle().dispose()));
            let failure = match outcome {
                Ok(None) | Ok(Some(Ok(()))) => continue,
                Ok(Some(Err(e))) => FailureInfo::from_anyhow(&e),
                Err(panic) => FailureInfo::from_panic(&*panic),
            };
            errors.push(self.disposal_error(instance.key(), DisposeStage::Sync, failure));
        }

        let disposed = instances.len();
        state.cache.clear();
        state.created.clear();

        match FixtureError::from_many(errors) {
            Some(err) => {
                warn!("Disposing {} fixtures for {} failed: {}", self.scope, self.owner, err);
                Err(err)
            }
            None => {
                if disposed > 0 {
                    info!("Disposed {} {} fixture(s) for {}", disposed, self.scope, self.owner);
                }
                Ok(())
            }
        }
    }

    fn disposal_error(
        &self,
        key: &FixtureKey,
        stage: DisposeStage,
        failure: FailureInfo,
    ) -> FixtureError {
        FixtureError::Disposal {
            scope: self.scope,
            fixture: key.to_string(),
            stage,
            failure,
        }
    }
}

impl std::fmt::Debug for FixtureLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureLifecycleManager")
            .field("scope", &self.scope)
            .field("owner", &self.owner)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::DiagnosticSink;
    use crate::fixture::{
        ConstructorDescriptor, ContextAccessor, Fixture, ParameterSpec, TypeArg,
    };
    use crate::models::{EntityLevel, EntityRef};
    use parking_lot::Mutex as SyncMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Weak;

    fn injectables() -> Injectables {
        let assembly = EntityRef::new(EntityLevel::Assembly, "asm", "Assembly");
        Injectables::new(
            DiagnosticSink::disabled(),
            ContextAccessor::for_assembly(assembly, Weak::new()),
        )
    }

    fn manager(scope: FixtureScope) -> FixtureLifecycleManager {
        FixtureLifecycleManager::new(scope, "owner", injectables())
    }

    struct Counted;
    impl Fixture for Counted {}

    struct Database {
        log: Arc<SyncMutex<Vec<String>>>,
        fail_dispose: bool,
    }

    impl Fixture for Database {
        fn dispose_async(&self) -> Option<BoxFuture<'_, anyhow::Result<()>>> {
            Some(Box::pin(async move {
                self.log.lock().push("database async".into());
                if self.fail_dispose {
                    anyhow::bail!("database refused to close");
                }
                Ok(())
            }))
        }
    }

    struct Cache {
        log: Arc<SyncMutex<Vec<String>>>,
        fail_dispose: bool,
    }

    impl Fixture for Cache {
        fn dispose(&self) -> Option<anyhow::Result<()>> {
            self.log.lock().push("cache sync".into());
            if self.fail_dispose {
                return Some(Err(anyhow::anyhow!("cache flush failed")));
            }
            Some(Ok(()))
        }
    }

    struct Service;
    impl Fixture for Service {
        fn dispose(&self) -> Option<anyhow::Result<()>> {
            Some(Ok(()))
        }
    }

    /// Fails to initialize; counts each disposal hook
    struct Broken {
        async_disposed: Arc<AtomicUsize>,
        sync_disposed: Arc<AtomicUsize>,
    }

    impl Fixture for Broken {
        fn initialize(&self) -> Option<BoxFuture<'_, anyhow::Result<()>>> {
            Some(Box::pin(async { anyhow::bail!("could not warm up") }))
        }

        fn dispose_async(&self) -> Option<BoxFuture<'_, anyhow::Result<()>>> {
            Some(Box::pin(async move {
                self.async_disposed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
        }

        fn dispose(&self) -> Option<anyhow::Result<()>> {
            self.sync_disposed.fetch_add(1, Ordering::SeqCst);
            Some(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_construction_is_at_most_once_under_concurrency() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let manager = Arc::new(manager(FixtureScope::Collection));
        manager
            .register(
                vec![FixtureDescriptor::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Counted)
                })],
                Vec::new(),
            )
            .await
            .unwrap();
        assert_eq!(manager.cached_count().await, 0);

        let lookups: Vec<_> = (0..16)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager
                        .get_fixture(&FixtureKey::of::<Counted>())
                        .await
                        .unwrap()
                        .unwrap()
                })
            })
            .collect();

        let instances: Vec<_> = join_all(lookups)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(instances.iter().all(|i| i.ptr_eq(&instances[0])));
    }

    #[tokio::test]
    async fn test_unknown_fixture_is_none() {
        let manager = manager(FixtureScope::Class);
        let found = manager.get_fixture(&FixtureKey::named("Nope")).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_arguments_come_from_scope_parent_and_injectables() {
        let log = Arc::new(SyncMutex::new(Vec::new()));
        let parent = Arc::new(manager(FixtureScope::Collection));
        let db_log = log.clone();
        parent
            .initialize(
                vec![FixtureDescriptor::new(move || {
                    Ok(Database {
                        log: db_log.clone(),
                        fail_dispose: false,
                    })
                })],
                Vec::new(),
            )
            .await
            .unwrap();

        let child = manager(FixtureScope::Class).with_parent(parent.clone());
        let cache_log = log.clone();
        child
            .initialize(
                vec![
                    FixtureDescriptor::with_params(
                        vec![
                            ParameterSpec::of::<Database>("db"),
                            ParameterSpec::of::<Cache>("cache"),
                            ParameterSpec::of::<DiagnosticSink>("diagnostics"),
                            ParameterSpec::of::<ContextAccessor>("context"),
                        ],
                        |args| {
                            args.get::<Database>("db")?;
                            args.get::<Cache>("cache")?;
                            args.get::<DiagnosticSink>("diagnostics")?;
                            let context = args.get::<ContextAccessor>("context")?;
                            anyhow::ensure!(context.scope() == FixtureScope::Assembly);
                            Ok(Service)
                        },
                    ),
                    FixtureDescriptor::new(move || {
                        Ok(Cache {
                            log: cache_log.clone(),
                            fail_dispose: false,
                        })
                    }),
                ],
                Vec::new(),
            )
            .await
            .unwrap();

        assert_eq!(child.cached_count().await, 2);
        assert!(child.resolve_typed::<Database>().await.unwrap().is_some());
        assert!(child.get_fixture(&FixtureKey::of::<Database>()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unresolved_parameters_are_all_named() {
        let manager = manager(FixtureScope::Class);
        let err = manager
            .initialize(
                vec![FixtureDescriptor::with_params(
                    vec![
                        ParameterSpec::of::<Database>("db"),
                        ParameterSpec::of::<Cache>("cache"),
                    ],
                    |_| Ok(Service),
                )],
                Vec::new(),
            )
            .await
            .unwrap_err();

        assert!(err.is_configuration());
        let text = err.to_string();
        assert!(text.contains("Class fixture type"));
        assert!(text.contains("unresolved constructor arguments"));
        assert!(text.contains("db"));
        assert!(text.contains("cache"));
    }

    #[tokio::test]
    async fn test_constructor_count_is_a_configuration_error() {
        let manager = manager(FixtureScope::Collection);
        let descriptor = FixtureDescriptor::new(|| Ok(Counted))
            .constructor(ConstructorDescriptor::public(Vec::new(), |_| Ok(Counted)));

        let err = manager.initialize(vec![descriptor], Vec::new()).await.unwrap_err();
        assert!(err.to_string().contains("single public constructor (found 2)"));
    }

    #[tokio::test]
    async fn test_circular_dependency_is_detected() {
        let manager = manager(FixtureScope::Class);
        let err = manager
            .initialize(
                vec![
                    FixtureDescriptor::with_params(
                        vec![ParameterSpec::new("b", FixtureKey::named("B"))],
                        |_| Ok(Counted),
                    ),
                    FixtureDescriptor::keyed(FixtureKey::named("B")).constructor(
                        ConstructorDescriptor::public(
                            vec![ParameterSpec::of::<Counted>("a")],
                            |_| Ok(Service),
                        ),
                    ),
                ],
                Vec::new(),
            )
            .await
            .unwrap_err();

        assert!(err.is_configuration());
        assert!(err.to_string().contains("circular dependency"));
    }

    #[tokio::test]
    async fn test_failed_initialization_is_cached_and_disposed() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let async_disposed = Arc::new(AtomicUsize::new(0));
        let sync_disposed = Arc::new(AtomicUsize::new(0));
        let (async_count, sync_count) = (async_disposed.clone(), sync_disposed.clone());
        let manager = manager(FixtureScope::Assembly);

        let err = manager
            .initialize(
                vec![FixtureDescriptor::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Broken {
                        async_disposed: async_count.clone(),
                        sync_disposed: sync_count.clone(),
                    })
                })],
                Vec::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FixtureError::Initialization { .. }));

        let again = manager
            .get_fixture(&FixtureKey::of::<Broken>())
            .await
            .unwrap_err();
        assert_eq!(again, err);
        assert_eq!(built.load(Ordering::SeqCst), 1);

        assert_eq!(manager.cached_count().await, 1);
        manager.dispose().await.unwrap();
        manager.dispose().await.unwrap();
        assert_eq!(async_disposed.load(Ordering::SeqCst), 1);
        assert_eq!(sync_disposed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_constructor_is_a_construction_error() {
        let manager = manager(FixtureScope::Class);
        let err = manager
            .initialize(
                vec![FixtureDescriptor::new(|| -> anyhow::Result<Counted> {
                    panic!("constructor exploded")
                })],
                Vec::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, FixtureError::Construction { .. }));
        assert!(err.to_string().contains("constructor exploded"));
    }

    #[tokio::test]
    async fn test_dispose_runs_async_then_sync_in_reverse_order() {
        let log = Arc::new(SyncMutex::new(Vec::new()));
        let manager = manager(FixtureScope::Collection);
        let (db_log, cache_log) = (log.clone(), log.clone());

        manager
            .initialize(
                vec![
                    FixtureDescriptor::new(move || {
                        Ok(Cache {
                            log: cache_log.clone(),
                            fail_dispose: false,
                        })
                    }),
                    FixtureDescriptor::new(move || {
                        Ok(Database {
                            log: db_log.clone(),
                            fail_dispose: false,
                        })
                    }),
                ],
                Vec::new(),
            )
            .await
            .unwrap();

        manager.dispose().await.unwrap();
        assert_eq!(*log.lock(), vec!["database async", "cache sync"]);

        // second dispose is a no-op
        manager.dispose().await.unwrap();
        assert_eq!(log.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_dispose_failures_are_aggregated() {
        let log = Arc::new(SyncMutex::new(Vec::new()));
        let manager = manager(FixtureScope::Class);
        let (db_log, cache_log) = (log.clone(), log.clone());

        manager
            .initialize(
                vec![
                    FixtureDescriptor::new(move || {
                        Ok(Database {
                            log: db_log.clone(),
                            fail_dispose: true,
                        })
                    }),
                    FixtureDescriptor::new(move || {
                        Ok(Cache {
                            log: cache_log.clone(),
                            fail_dispose: true,
                        })
                    }),
                ],
                Vec::new(),
            )
            .await
            .unwrap();

        let err = manager.dispose().await.unwrap_err();
        assert_eq!(err.count(), 2);
        let text = err.to_string();
        assert!(text.contains("database refused to close"));
        assert!(text.contains("cache flush failed"));
        assert_eq!(log.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_disposed_manager_rejects_lookups() {
        let manager = manager(FixtureScope::Class);
        manager.dispose().await.unwrap();

        let err = manager
            .get_fixture(&FixtureKey::of::<Counted>())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            FixtureError::Disposed {
                scope: FixtureScope::Class
            }
        );
        assert!(manager.is_disposed().await);
    }

    #[tokio::test]
    async fn test_generic_fixtures_are_cached_per_type_arguments() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let manager = manager(FixtureScope::Collection);
        manager
            .initialize(
                Vec::new(),
                vec![GenericFixtureDescriptor::new("Repo", 1, move |_| {
                    let counter = counter.clone();
                    Ok(FixtureDescriptor::new(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(Counted)
                    }))
                })],
            )
            .await
            .unwrap();

        let users = FixtureKey::closed("Repo", vec![TypeArg::named("User")]);
        let orders = FixtureKey::closed("Repo", vec![TypeArg::named("Order")]);

        let first = manager.get_fixture(&users).await.unwrap().unwrap();
        let second = manager.get_fixture(&users).await.unwrap().unwrap();
        let other = manager.get_fixture(&orders).await.unwrap().unwrap();

        assert!(first.ptr_eq(&second));
        assert!(!first.ptr_eq(&other));
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(first.key().to_string(), "Repo<User>");

        let wrong_arity = FixtureKey::closed(
            "Repo",
            vec![TypeArg::named("User"), TypeArg::named("Order")],
        );
        assert!(manager.get_fixture(&wrong_arity).await.unwrap_err().is_configuration());
    }
}
