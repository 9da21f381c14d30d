use std::{collections::HashSet, path::Path};

use tracing::debug;

use crate::{RepositoryDescriptor, TetherModelError};

/// The set of repository definitions for one run.
///
/// Repositories keep the order they were loaded in; loading from a directory
/// sorts by file name so that runs are reproducible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositoryCatalog {
    repositories: Vec<RepositoryDescriptor>,
}

impl RepositoryCatalog {
    /// Build a catalog, rejecting duplicate names.
    pub fn new(repositories: Vec<RepositoryDescriptor>) -> Result<Self, TetherModelError> {
        let mut seen = HashSet::new();
        for repository in &repositories {
            if !seen.insert(repository.name.as_str()) {
                return Err(TetherModelError::DuplicateRepository(
                    repository.name.clone(),
                ));
            }
        }
        Ok(Self { repositories })
    }

    /// Load every `*.yaml` / `*.yml` file in `directory`.
    pub fn load(directory: impl AsRef<Path>) -> Result<Self, TetherModelError> {
        let directory = directory.as_ref();
        let read_error = |source| TetherModelError::Read {
            path: directory.to_path_buf(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(directory).map_err(read_error)? {
            let path = entry.map_err(read_error)?.path();
            let is_yaml = path
                .extension()
                .and_then(|extension| extension.to_str())
                .is_some_and(|extension| matches!(extension, "yaml" | "yml"));
            if is_yaml && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut repositories = Vec::with_capacity(paths.len());
        for path in paths {
            let text = std::fs::read_to_string(&path).map_err(|source| TetherModelError::Read {
                path: path.clone(),
                source,
            })?;
            let repository: RepositoryDescriptor = serde_yaml::from_str(&text)
                .map_err(|source| TetherModelError::Repository {
                    path: path.clone(),
                    source,
                })?;
            debug!(repository = %repository.name, path = %path.display(), "loaded repository");
            repositories.push(repository);
        }

        Self::new(repositories)
    }

    /// Iterate repositories in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &RepositoryDescriptor> {
        self.repositories.iter()
    }

    /// Look a repository up by name.
    pub fn get(&self, name: &str) -> Option<&RepositoryDescriptor> {
        self.repositories
            .iter()
            .find(|repository| repository.name == name)
    }

    /// The number of repositories.
    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}

impl<'a> IntoIterator for &'a RepositoryCatalog {
    type Item = &'a RepositoryDescriptor;
    type IntoIter = std::slice::Iter<'a, RepositoryDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.repositories.iter()
    }
}
