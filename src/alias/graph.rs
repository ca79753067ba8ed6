//! Dependency graph over alias definitions.

use std::collections::{BTreeSet, HashMap};

use super::AliasDefinition;

/// Immutable view of all alias definitions of one run.
///
/// Iteration follows source order so logs stay deterministic run to run.
#[derive(Debug, Default)]
pub struct AliasGraph {
    aliases: Vec<AliasDefinition>,
    index: HashMap<String, usize>,
}

impl AliasGraph {
    /// Build the graph. A later definition with an already seen name is ignored
    /// and self references are dropped from the dependency sets.
    pub fn new(definitions: Vec<AliasDefinition>) -> Self {
        let mut aliases = Vec::with_capacity(definitions.len());
        let mut index = HashMap::with_capacity(definitions.len());

        for mut alias in definitions {
            if index.contains_key(&alias.name) {
                tracing::warn!("Duplicate alias {} ignored", alias.name);
                continue;
            }
            alias.dependencies.remove(&alias.name);
            index.insert(alias.name.clone(), aliases.len());
            aliases.push(alias);
        }

        Self { aliases, index }
    }

    pub fn all(&self) -> impl Iterator<Item = &AliasDefinition> {
        self.aliases.iter()
    }

    /// Absence is a normal answer (e.g. a removed dependency).
    pub fn get(&self, name: &str) -> Option<&AliasDefinition> {
        self.index.get(name).map(|&i| &self.aliases[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Direct dependencies of `name`, empty when the alias is unknown.
    pub fn dependencies_of(&self, name: &str) -> BTreeSet<String> {
        self.get(name)
            .map(|alias| alias.dependencies.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}
