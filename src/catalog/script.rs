//! Scripted catalogs
//!
//! A YAML or JSON description of an assembly whose tests and fixtures
//! behave as scripted: pass, fail or panic, sleep, write output, and use
//! named fixtures that can fail to initialize or dispose.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::CatalogError;
use crate::fixture::{
    ConstructorDescriptor, ErasedFixture, Fixture, FixtureDescriptor, FixtureKey, ParameterSpec,
};
use crate::models::{
    CollectionDefinition, TestAssembly, TestBody, TestCase, TestClass, TestCollection, TestMethod,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    #[default]
    Pass,
    Fail,
    Panic,
}

/// A named fixture with scripted lifecycle behavior
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureScript {
    pub name: String,
    /// Other named fixtures passed to the constructor
    pub depends_on: Vec<String>,
    pub fail_construct: bool,
    pub fail_init: bool,
    pub fail_dispose: bool,
    /// Dispose asynchronously instead of synchronously
    pub async_dispose: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseScript {
    pub name: Option<String>,
    pub outcome: Outcome,
    pub message: Option<String>,
    pub sleep_ms: u64,
    pub skip: Option<String>,
    pub explicit: bool,
    pub traits: BTreeMap<String, Vec<String>>,
    /// Named fixtures the body resolves before running
    pub uses: Vec<String>,
    pub output: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodScript {
    pub name: String,
    #[serde(default)]
    pub cases: Vec<CaseScript>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassScript {
    pub name: String,
    #[serde(default)]
    pub fixtures: Vec<FixtureScript>,
    #[serde(default)]
    pub methods: Vec<MethodScript>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionScript {
    pub name: String,
    #[serde(default)]
    pub definition: Option<String>,
    #[serde(default)]
    pub classes: Vec<ClassScript>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionScript {
    pub name: String,
    #[serde(default)]
    pub disable_parallelization: bool,
    #[serde(default)]
    pub fixtures: Vec<FixtureScript>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedCatalog {
    pub name: String,
    #[serde(default)]
    pub fixtures: Vec<FixtureScript>,
    #[serde(default)]
    pub definitions: Vec<DefinitionScript>,
    #[serde(default)]
    pub collections: Vec<CollectionScript>,
}

/// The value a scripted fixture descriptor builds
#[derive(Debug)]
pub struct ScriptedFixture {
    script: FixtureScript,
}

impl ScriptedFixture {
    pub fn name(&self) -> &str {
        &self.script.name
    }
}

impl Fixture for ScriptedFixture {
    fn initialize(&self) -> Option<futures::future::BoxFuture<'_, anyhow::Result<()>>> {
        if !self.script.fail_init {
            return None;
        }
        Some(Box::pin(async move {
            Err::<(), _>(anyhow::anyhow!("{} failed to initialize", self.script.name))
        }))
    }

    fn dispose_async(&self) -> Option<futures::future::BoxFuture<'_, anyhow::Result<()>>> {
        if !self.script.async_dispose {
            return None;
        }
        Some(Box::pin(async move { self.dispose_result() }))
    }

    fn dispose(&self) -> Option<anyhow::Result<()>> {
        (!self.script.async_dispose).then(|| self.dispose_result())
    }
}

impl ScriptedFixture {
    fn dispose_result(&self) -> anyhow::Result<()> {
        if self.script.fail_dispose {
            anyhow::bail!("{} failed to dispose", self.script.name);
        }
        debug!("Disposed scripted fixture {}", self.script.name);
        Ok(())
    }
}

fn fixture_key(name: &str) -> FixtureKey {
    FixtureKey::named(name)
}

impl FixtureScript {
    fn descriptor(&self) -> FixtureDescriptor {
        let params = self
            .depends_on
            .iter()
            .map(|dep| ParameterSpec::new(dep.clone(), fixture_key(dep)))
            .collect();
        let script = self.clone();
        FixtureDescriptor::keyed(fixture_key(&self.name)).constructor(ConstructorDescriptor::erased(
            params,
            move |_args| {
                if script.fail_construct {
                    anyhow::bail!("{} failed to construct", script.name);
                }
                Ok(ErasedFixture::new(ScriptedFixture {
                    script: script.clone(),
                }))
            },
        ))
    }
}

impl CaseScript {
    fn body(&self, display_name: &str) -> TestBody {
        let script = self.clone();
        let display_name = display_name.to_string();
        TestBody::new(move |ctx| {
            let script = script.clone();
            let display_name = display_name.clone();
            async move {
                for name in &script.uses {
                    ctx.fixture_by_key::<ScriptedFixture>(&fixture_key(name))
                        .await?;
                }
                for line in &script.output {
                    ctx.output().write_line(line);
                }
                if script.sleep_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(script.sleep_ms)).await;
                }
                let message = script
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("{display_name} was scripted to fail"));
                match script.outcome {
                    Outcome::Pass => Ok(()),
                    Outcome::Fail => Err(anyhow::anyhow!(message)),
                    Outcome::Panic => panic!("{}", message),
                }
            }
        })
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

impl ScriptedCatalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        if is_yaml(path) {
            Self::from_yaml(&content)
        } else {
            serde_json::from_str(&content).map_err(|e| CatalogError::Parse(e.to_string()))
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self, CatalogError> {
        serde_yaml::from_str(content).map_err(|e| CatalogError::Parse(e.to_string()))
    }

    pub fn case_count(&self) -> usize {
        self.collections
            .iter()
            .flat_map(|c| &c.classes)
            .flat_map(|c| &c.methods)
            .map(|m| m.cases.len().max(1))
            .sum()
    }

    /// Build the assembly and its cases, checking every `uses` reference
    pub fn build(&self) -> Result<(TestAssembly, Vec<TestCase>), CatalogError> {
        if self.case_count() == 0 {
            return Err(CatalogError::Empty);
        }

        let mut assembly = TestAssembly::new(&self.name, &self.name);
        for fixture in &self.fixtures {
            assembly = assembly.fixture(fixture.descriptor());
        }
        for definition in &self.definitions {
            let mut built = CollectionDefinition::new(&definition.name);
            if definition.disable_parallelization {
                built = built.disable_parallelization();
            }
            for fixture in &definition.fixtures {
                built = built.fixture(fixture.descriptor());
            }
            assembly = assembly.collection_definition(built);
        }

        let assembly_fixtures: HashSet<&str> = names(&self.fixtures);
        let mut cases = Vec::new();
        for collection in &self.collections {
            let mut visible = assembly_fixtures.clone();
            if let Some(name) = &collection.definition {
                for definition in self.definitions.iter().filter(|d| &d.name == name) {
                    visible.extend(names(&definition.fixtures));
                }
            }

            let mut test_collection = TestCollection::new(&collection.name, &collection.name);
            if let Some(name) = &collection.definition {
                test_collection = test_collection.with_definition(name);
            }
            let test_collection = Arc::new(test_collection);

            for class in &collection.classes {
                let mut visible = visible.clone();
                visible.extend(names(&class.fixtures));

                let class_id = format!("{}::{}", collection.name, class.name);
                let mut test_class =
                    TestClass::new(&class_id, &class.name, test_collection.clone());
                for fixture in &class.fixtures {
                    test_class = test_class.fixture(fixture.descriptor());
                }
                let test_class = Arc::new(test_class);

                for method in &class.methods {
                    let method_id = format!("{}.{}", class_id, method.name);
                    let display = format!("{}.{}", class.name, method.name);
                    let test_method =
                        Arc::new(TestMethod::new(&method_id, &display, test_class.clone()));

                    let default_case = [CaseScript::default()];
                    let scripts: &[CaseScript] = if method.cases.is_empty() {
                        &default_case
                    } else {
                        &method.cases
                    };
                    for (index, script) in scripts.iter().enumerate() {
                        cases.push(build_case(
                            script,
                            &visible,
                            &test_method,
                            index,
                            scripts.len(),
                        )?);
                    }
                }
            }
        }

        debug!("Scripted catalog '{}' built {} cases", self.name, cases.len());
        Ok((assembly, cases))
    }
}

fn names(fixtures: &[FixtureScript]) -> HashSet<&str> {
    fixtures.iter().map(|f| f.name.as_str()).collect()
}

fn build_case(
    script: &CaseScript,
    visible: &HashSet<&str>,
    method: &Arc<TestMethod>,
    index: usize,
    count: usize,
) -> Result<TestCase, CatalogError> {
    let display_name = match (&script.name, count) {
        (Some(name), _) => name.clone(),
        (None, 1) => method.display_name.clone(),
        (None, _) => format!("{}[{}]", method.display_name, index),
    };
    if let Some(missing) = script.uses.iter().find(|u| !visible.contains(u.as_str())) {
        return Err(CatalogError::UnknownFixture {
            case: display_name,
            fixture: missing.clone(),
        });
    }

    let mut case = TestCase::new(
        format!("{}#{}", method.unique_id, index),
        &display_name,
        method.clone(),
        script.body(&display_name),
    );
    for (name, values) in &script.traits {
        for value in values {
            case = case.with_trait(name, value);
        }
    }
    if let Some(reason) = &script.skip {
        case = case.skip(reason);
    }
    if script.explicit {
        case = case.explicit();
    }
    Ok(case)
}
