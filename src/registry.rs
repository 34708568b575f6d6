//! Process-wide name → implementation registries
//!
//! Artifacts name their implementation in the `name` key of their config.
//! Constructors look that name up here and check it maps to the type the
//! caller asked for before anything is built.

use crate::error::{HubError, Result};
use crate::models::Model;
use crate::models::sequence_labeling::{
    DISTILBERT_SEQUENCE_LABELING, DistilBertSequenceLabeling,
};
use crate::preprocessors::Tokenizer;
use crate::preprocessors::tokenizers::{WORDPIECE_TOKENIZER, WordPieceTokenizer};
use dashmap::DashMap;
use std::any::TypeId;
use std::sync::LazyLock;

/// Which registry an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryKind {
    Model,
    Preprocessor,
}

impl RegistryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Preprocessor => "preprocessor",
        }
    }
}

impl std::fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime identity of a registered type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeInfo {
    pub id: TypeId,
    pub name: &'static str,
}

impl TypeInfo {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

/// One registry entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub kind: RegistryKind,
    pub implementation: TypeInfo,
    pub config: TypeInfo,
}

impl Registration {
    /// Fail unless this entry maps to implementation `I` with config `C`
    pub fn ensure<I: ?Sized + 'static, C: ?Sized + 'static>(&self) -> Result<()> {
        let requested = TypeInfo::of::<I>();
        if self.implementation != requested {
            return Err(HubError::TypeMismatch {
                name: self.name.clone(),
                registered: self.implementation.name,
                requested: requested.name,
            });
        }

        let requested = TypeInfo::of::<C>();
        if self.config != requested {
            return Err(HubError::TypeMismatch {
                name: self.name.clone(),
                registered: self.config.name,
                requested: requested.name,
            });
        }

        Ok(())
    }
}

/// Concurrent name → [`Registration`] map
#[derive(Debug)]
pub struct Registry {
    kind: RegistryKind,
    entries: DashMap<String, Registration>,
}

impl Registry {
    pub fn new(kind: RegistryKind) -> Self {
        Self {
            kind,
            entries: DashMap::new(),
        }
    }

    pub fn kind(&self) -> RegistryKind {
        self.kind
    }

    /// Register `I` (configured by `C`) under `name`
    ///
    /// A later registration under the same name replaces the earlier one.
    pub fn register<I: ?Sized + 'static, C: ?Sized + 'static>(&self, name: &str) {
        let registration = Registration {
            name: name.to_string(),
            kind: self.kind,
            implementation: TypeInfo::of::<I>(),
            config: TypeInfo::of::<C>(),
        };

        if let Some(previous) = self.entries.insert(name.to_string(), registration) {
            tracing::warn!(
                kind = %self.kind,
                name = %name,
                replaced = previous.implementation.name,
                "Registration replaced"
            );
        } else {
            tracing::debug!(kind = %self.kind, name = %name, "Registered");
        }
    }

    pub fn lookup(&self, name: &str) -> Result<Registration> {
        self.entries
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| HubError::NotFound {
                kind: self.kind.as_str(),
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

static MODELS: LazyLock<Registry> = LazyLock::new(|| {
    let registry = Registry::new(RegistryKind::Model);
    registry.register::<DistilBertSequenceLabeling, <DistilBertSequenceLabeling as Model>::Config>(
        DISTILBERT_SEQUENCE_LABELING,
    );
    registry
});

static PREPROCESSORS: LazyLock<Registry> = LazyLock::new(|| {
    let registry = Registry::new(RegistryKind::Preprocessor);
    registry.register::<WordPieceTokenizer, <WordPieceTokenizer as Tokenizer>::Config>(
        WORDPIECE_TOKENIZER,
    );
    registry
});

/// Model registry, with built-in models already registered
pub fn models() -> &'static Registry {
    &MODELS
}

/// Preprocessor registry, with built-in tokenizers already registered
pub fn preprocessors() -> &'static Registry {
    &PREPROCESSORS
}

pub fn register_model<M: Model>(name: &str) {
    models().register::<M, M::Config>(name);
}

pub fn register_preprocessor<T: Tokenizer>(name: &str) {
    preprocessors().register::<T, T::Config>(name);
}
