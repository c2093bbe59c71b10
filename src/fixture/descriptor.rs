//! Fixture descriptors
//!
//! Construction is described explicitly: a fixture names its constructors,
//! each constructor lists its parameters by [`FixtureKey`], and a
//! type-erased factory builds the value once the arguments are resolved.
//! Generic fixtures register a factory under their open name and are
//! closed over concrete [`TypeArg`]s on first request.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::Fixture;
use crate::error::{ConfigurationError, FixtureError};
use crate::fixture::FixtureScope;
use crate::models::FailureInfo;

/// A closing type argument for a generic fixture
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeArg(String);

impl TypeArg {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(std::any::type_name::<T>().to_string())
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache identity of a fixture: a concrete type, or an open generic closed over arguments
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FixtureKey {
    name: String,
    args: Vec<TypeArg>,
}

impl FixtureKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::named(std::any::type_name::<T>())
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn closed(open: impl Into<String>, args: Vec<TypeArg>) -> Self {
        Self {
            name: open.into(),
            args,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[TypeArg] {
        &self.args
    }

    /// Open-generic definition this key closes, if it is a closed generic
    pub fn open_name(&self) -> Option<&str> {
        if self.args.is_empty() {
            None
        } else {
            Some(&self.name)
        }
    }
}

impl fmt::Display for FixtureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.args.is_empty() {
            let args: Vec<_> = self.args.iter().map(TypeArg::name).collect();
            write!(f, "<{}>", args.join(", "))?;
        }
        Ok(())
    }
}

/// A constructed fixture with its type erased
#[derive(Clone)]
pub struct ErasedFixture {
    any: Arc<dyn Any + Send + Sync>,
    lifecycle: Arc<dyn Fixture>,
}

impl ErasedFixture {
    pub fn new<T: Fixture>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<T: Fixture>(value: Arc<T>) -> Self {
        Self {
            any: value.clone(),
            lifecycle: value,
        }
    }
}

/// A cached fixture, shareable across tests of its scope
#[derive(Clone)]
pub struct FixtureInstance {
    key: FixtureKey,
    value: ErasedFixture,
}

impl FixtureInstance {
    pub fn new(key: FixtureKey, value: ErasedFixture) -> Self {
        Self { key, value }
    }

    pub fn key(&self) -> &FixtureKey {
        &self.key
    }

    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.any.clone().downcast::<T>().ok()
    }

    pub fn lifecycle(&self) -> &Arc<dyn Fixture> {
        &self.value.lifecycle
    }

    pub fn ptr_eq(&self, other: &FixtureInstance) -> bool {
        Arc::ptr_eq(&self.value.any, &other.value.any)
    }
}

impl fmt::Debug for FixtureInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureInstance")
            .field("key", &self.key)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: String,
    pub key: FixtureKey,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, key: FixtureKey) -> Self {
        Self {
            name: name.into(),
            key,
        }
    }

    pub fn of<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::new(name, FixtureKey::of::<T>())
    }
}

/// Constructor arguments after resolution, by parameter name
#[derive(Default)]
pub struct ResolvedArgs {
    values: HashMap<String, FixtureInstance>,
}

impl ResolvedArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FixtureInstance) {
        self.values.insert(name.into(), value);
    }

    pub fn instance(&self, name: &str) -> Option<&FixtureInstance> {
        self.values.get(name)
    }

    /// Typed access to a resolved argument
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> anyhow::Result<Arc<T>> {
        let instance = self
            .values
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("no argument named '{name}' was resolved"))?;
        instance.downcast::<T>().ok_or_else(|| {
            anyhow::anyhow!(
                "argument '{name}' is a {}, not a {}",
                instance.key(),
                std::any::type_name::<T>()
            )
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

type Factory = dyn Fn(&ResolvedArgs) -> anyhow::Result<ErasedFixture> + Send + Sync;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

/// One constructor: ordered parameters plus the factory
#[derive(Clone)]
pub struct ConstructorDescriptor {
    params: Vec<ParameterSpec>,
    visibility: Visibility,
    is_static: bool,
    factory: Arc<Factory>,
}

impl ConstructorDescriptor {
    pub fn public<T, F>(params: Vec<ParameterSpec>, build: F) -> Self
    where
        T: Fixture,
        F: Fn(&ResolvedArgs) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self {
            params,
            visibility: Visibility::Public,
            is_static: false,
            factory: Arc::new(move |args| build(args).map(ErasedFixture::new)),
        }
    }

    /// Type-erased constructor, for fixtures built from data rather than types
    pub fn erased<F>(params: Vec<ParameterSpec>, build: F) -> Self
    where
        F: Fn(&ResolvedArgs) -> anyhow::Result<ErasedFixture> + Send + Sync + 'static,
    {
        Self {
            params,
            visibility: Visibility::Public,
            is_static: false,
            factory: Arc::new(build),
        }
    }

    pub fn private(mut self) -> Self {
        self.visibility = Visibility::Private;
        self
    }

    pub fn static_factory(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn params(&self) -> &[ParameterSpec] {
        &self.params
    }

    /// Candidate for fixture construction
    pub fn is_eligible(&self) -> bool {
        self.visibility == Visibility::Public && !self.is_static
    }

    pub fn build(&self, args: &ResolvedArgs) -> anyhow::Result<ErasedFixture> {
        (self.factory)(args)
    }
}

#[derive(Clone)]
pub struct FixtureDescriptor {
    key: FixtureKey,
    constructors: Vec<ConstructorDescriptor>,
}

impl FixtureDescriptor {
    /// Fixture with a single public, parameterless constructor
    pub fn new<T, F>(build: F) -> Self
    where
        T: Fixture,
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::bare::<T>().constructor(ConstructorDescriptor::public(Vec::new(), move |_| build()))
    }

    /// Fixture with a single public constructor taking `params`
    pub fn with_params<T, F>(params: Vec<ParameterSpec>, build: F) -> Self
    where
        T: Fixture,
        F: Fn(&ResolvedArgs) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::bare::<T>().constructor(ConstructorDescriptor::public(params, build))
    }

    pub fn default_of<T: Fixture + Default>() -> Self {
        Self::new(|| Ok(T::default()))
    }

    /// Descriptor with no constructors yet
    pub fn bare<T: ?Sized + 'static>() -> Self {
        Self::keyed(FixtureKey::of::<T>())
    }

    pub fn keyed(key: FixtureKey) -> Self {
        Self {
            key,
            constructors: Vec::new(),
        }
    }

    pub fn constructor(mut self, constructor: ConstructorDescriptor) -> Self {
        self.constructors.push(constructor);
        self
    }

    pub fn key(&self) -> &FixtureKey {
        &self.key
    }

    /// The one eligible constructor, or a configuration error naming the scope and type
    pub fn select_constructor(
        &self,
        scope: FixtureScope,
    ) -> Result<&ConstructorDescriptor, ConfigurationError> {
        let eligible: Vec<_> = self
            .constructors
            .iter()
            .filter(|c| c.is_eligible())
            .collect();
        match eligible.as_slice() {
            [single] => Ok(single),
            _ => Err(ConfigurationError::ConstructorCount {
                scope,
                fixture: self.key.to_string(),
                found: eligible.len(),
            }),
        }
    }
}

impl fmt::Debug for ConstructorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorDescriptor")
            .field("params", &self.params)
            .field("visibility", &self.visibility)
            .field("is_static", &self.is_static)
            .finish()
    }
}

impl fmt::Debug for FixtureDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureDescriptor")
            .field("key", &self.key)
            .field("constructors", &self.constructors.len())
            .finish()
    }
}

type GenericFactory = dyn Fn(&[TypeArg]) -> anyhow::Result<FixtureDescriptor> + Send + Sync;

/// Open-generic fixture: a factory that closes over concrete type arguments
#[derive(Clone)]
pub struct GenericFixtureDescriptor {
    open: String,
    arity: usize,
    factory: Arc<GenericFactory>,
}

impl GenericFixtureDescriptor {
    pub fn new<F>(open: impl Into<String>, arity: usize, factory: F) -> Self
    where
        F: Fn(&[TypeArg]) -> anyhow::Result<FixtureDescriptor> + Send + Sync + 'static,
    {
        Self {
            open: open.into(),
            arity,
            factory: Arc::new(factory),
        }
    }

    pub fn open_name(&self) -> &str {
        &self.open
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Closed descriptor for `args`, cached under `(open, args)`
    pub fn close(&self, scope: FixtureScope, args: &[TypeArg]) -> Result<FixtureDescriptor, FixtureError> {
        if args.len() != self.arity {
            return Err(ConfigurationError::GenericArity {
                open: self.open.clone(),
                expected: self.arity,
                actual: args.len(),
            }
            .into());
        }

        let key = FixtureKey::closed(self.open.clone(), args.to_vec());
        let mut descriptor = (self.factory)(args).map_err(|e| FixtureError::Construction {
            scope,
            fixture: key.to_string(),
            failure: FailureInfo::from_anyhow(&e),
        })?;
        descriptor.key = key;
        Ok(descriptor)
    }
}

impl fmt::Debug for GenericFixtureDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericFixtureDescriptor")
            .field("open", &self.open)
            .field("arity", &self.arity)
            .finish()
    }
}
