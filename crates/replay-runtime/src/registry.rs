//! Task registry.
//!
//! Tasks are registered on a [`RegistryBuilder`] during startup and frozen
//! into an immutable [`TaskRegistry`] with [`RegistryBuilder::build`]. The
//! built registry has no mutating methods, so registration after startup is
//! impossible, and it is shared across concurrent attempts through `Arc`.
//! Registering the same service/method (or collection) twice is an error.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use replay_core::errors::{BAD_REQUEST, SERVICE_EXEC, StructuredError, TaskError};
use replay_core::protocol::{CollectionDescription, MethodDescription, ServiceDescription};

use crate::context::TaskContext;
use crate::validator::Validator;

/// Future returned by an erased task.
pub type TaskFuture = BoxFuture<'static, Result<Value, TaskError>>;

/// Errors raised while building the registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The service/method pair is already taken.
    #[error("task {0} is already registered")]
    DuplicateTask(TaskKey),
    /// The collection name is already taken within the service.
    #[error("collection {collection} is already declared on service {service}")]
    DuplicateCollection {
        /// Owning service.
        service: String,
        /// Collection name.
        collection: String,
    },
    /// A service, method, or collection name is empty.
    #[error("empty {0} name")]
    EmptyName(&'static str),
}

/// Identity of a registered task.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TaskKey {
    /// Service name.
    pub service: String,
    /// Method name.
    pub method: String,
}

impl TaskKey {
    /// Build a key.
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service, self.method)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Erased handlers
// ─────────────────────────────────────────────────────────────────────────────

trait ErasedTask: Send + Sync {
    fn prepare(
        &self,
        ctx: TaskContext,
        input: Value,
        key: &TaskKey,
        validator: &dyn Validator,
    ) -> Result<TaskFuture, StructuredError>;
}

struct TypedTask<F, I, O, Fut> {
    f: F,
    _marker: PhantomData<fn(I) -> (O, Fut)>,
}

impl<F, I, O, Fut> ErasedTask for TypedTask<F, I, O, Fut>
where
    F: Fn(TaskContext, I) -> Fut + Send + Sync + 'static,
    I: DeserializeOwned + 'static,
    O: Serialize + 'static,
    Fut: Future<Output = Result<O, TaskError>> + Send + 'static,
{
    fn prepare(
        &self,
        ctx: TaskContext,
        input: Value,
        key: &TaskKey,
        validator: &dyn Validator,
    ) -> Result<TaskFuture, StructuredError> {
        let typed: I = serde_json::from_value(input.clone()).map_err(|e| BAD_REQUEST.with(e))?;
        validator.validate(key, &input).map_err(|reason| BAD_REQUEST.with(reason))?;

        let fut = (self.f)(ctx, typed);
        Ok(Box::pin(async move {
            let output = fut.await?;
            serde_json::to_value(output).map_err(|e| {
                TaskError::Application(SERVICE_EXEC.with(format!("unserializable output: {e}")))
            })
        }))
    }
}

/// Whether a task is a plain handler or a workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskKind {
    /// Single-shot handler.
    Handler,
    /// Long-running workflow that orchestrates other calls.
    Workflow,
}

/// A task ready to be registered.
#[derive(Clone)]
pub struct TaskDef {
    kind: TaskKind,
    description: String,
    input_type: &'static str,
    task: Arc<dyn ErasedTask>,
}

impl TaskDef {
    fn typed<F, I, O, Fut>(kind: TaskKind, f: F) -> Self
    where
        F: Fn(TaskContext, I) -> Fut + Send + Sync + 'static,
        I: DeserializeOwned + 'static,
        O: Serialize + 'static,
        Fut: Future<Output = Result<O, TaskError>> + Send + 'static,
    {
        Self {
            kind,
            description: String::new(),
            input_type: std::any::type_name::<I>(),
            task: Arc::new(TypedTask {
                f,
                _marker: PhantomData,
            }),
        }
    }

    /// A plain handler.
    pub fn handler<F, I, O, Fut>(f: F) -> Self
    where
        F: Fn(TaskContext, I) -> Fut + Send + Sync + 'static,
        I: DeserializeOwned + 'static,
        O: Serialize + 'static,
        Fut: Future<Output = Result<O, TaskError>> + Send + 'static,
    {
        Self::typed(TaskKind::Handler, f)
    }

    /// A workflow.
    pub fn workflow<F, I, O, Fut>(f: F) -> Self
    where
        F: Fn(TaskContext, I) -> Fut + Send + Sync + 'static,
        I: DeserializeOwned + 'static,
        O: Serialize + 'static,
        Fut: Future<Output = Result<O, TaskError>> + Send + 'static,
    {
        Self::typed(TaskKind::Workflow, f)
    }

    /// Attach a description for the catalogue.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Handler or workflow.
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Decode and validate `input`, then start the task.
    ///
    /// Decode and validation failures come back as `bad request` without
    /// running the task.
    pub fn prepare(
        &self,
        ctx: TaskContext,
        input: Value,
        key: &TaskKey,
        validator: &dyn Validator,
    ) -> Result<TaskFuture, StructuredError> {
        self.task.prepare(ctx, input, key, validator)
    }
}

impl fmt::Debug for TaskDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDef")
            .field("kind", &self.kind)
            .field("description", &self.description)
            .field("input_type", &self.input_type)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder and frozen registry
// ─────────────────────────────────────────────────────────────────────────────

/// Collects registrations during startup.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    tasks: HashMap<TaskKey, TaskDef>,
    collections: BTreeMap<String, BTreeMap<String, &'static str>>,
}

impl RegistryBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `def` under `service`/`method`.
    pub fn register(
        &mut self,
        service: &str,
        method: &str,
        def: TaskDef,
    ) -> Result<&mut Self, RegistryError> {
        if service.is_empty() {
            return Err(RegistryError::EmptyName("service"));
        }
        if method.is_empty() {
            return Err(RegistryError::EmptyName("method"));
        }
        let key = TaskKey::new(service, method);
        if self.tasks.contains_key(&key) {
            return Err(RegistryError::DuplicateTask(key));
        }
        let _ = self.tasks.insert(key, def);
        Ok(self)
    }

    /// Declare a data-model collection of `T` documents on `service`.
    pub fn collection<T: 'static>(
        &mut self,
        service: &str,
        name: &str,
    ) -> Result<&mut Self, RegistryError> {
        if service.is_empty() {
            return Err(RegistryError::EmptyName("service"));
        }
        if name.is_empty() {
            return Err(RegistryError::EmptyName("collection"));
        }
        let declared = self.collections.entry(service.to_owned()).or_default();
        if declared.contains_key(name) {
            return Err(RegistryError::DuplicateCollection {
                service: service.to_owned(),
                collection: name.to_owned(),
            });
        }
        let _ = declared.insert(name.to_owned(), std::any::type_name::<T>());
        Ok(self)
    }

    /// Freeze the registrations.
    pub fn build(self) -> TaskRegistry {
        TaskRegistry {
            tasks: self.tasks,
            collections: self.collections,
        }
    }
}

/// Immutable registry shared by all attempts.
#[derive(Debug)]
pub struct TaskRegistry {
    tasks: HashMap<TaskKey, TaskDef>,
    collections: BTreeMap<String, BTreeMap<String, &'static str>>,
}

impl TaskRegistry {
    /// Start a builder.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Find a task by exact name.
    pub fn lookup(&self, key: &TaskKey) -> Option<&TaskDef> {
        self.tasks.get(key)
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no tasks are registered.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Catalogue for registration, sorted by service then method.
    pub fn descriptions(&self) -> Vec<ServiceDescription> {
        let mut services: BTreeMap<&str, ServiceDescription> = BTreeMap::new();

        for (key, def) in &self.tasks {
            let entry = services
                .entry(key.service.as_str())
                .or_insert_with(|| ServiceDescription {
                    name: key.service.clone(),
                    ..ServiceDescription::default()
                });
            entry.methods.push(MethodDescription {
                name: key.method.clone(),
                description: def.description.clone(),
                is_workflow: def.kind == TaskKind::Workflow,
                input_type: def.input_type.to_owned(),
            });
        }

        for (service, declared) in &self.collections {
            let entry = services
                .entry(service.as_str())
                .or_insert_with(|| ServiceDescription {
                    name: service.clone(),
                    ..ServiceDescription::default()
                });
            entry.collections = declared
                .iter()
                .map(|(name, type_name)| CollectionDescription {
                    name: name.clone(),
                    type_name: (*type_name).to_owned(),
                })
                .collect();
        }

        services
            .into_values()
            .map(|mut s| {
                s.methods.sort_by(|a, b| a.name.cmp(&b.name));
                s
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
