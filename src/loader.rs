use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

use crate::definition::{ChildSpec, TestDefinition};

/// Errors raised while loading test documents.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("test file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid YAML in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid test definition in {}: {reason}", .path.display())]
    Schema { path: PathBuf, reason: String },

    #[error("circular reference detected: {}", render_chain(.chain))]
    CircularReference { chain: Vec<PathBuf> },
}

fn render_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" → ")
}

/// A statically loaded test tree.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub definition: Rc<TestDefinition>,
    /// Resolved path for file-backed nodes, `None` for inline children.
    pub path: Option<PathBuf>,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Number of nodes in this subtree.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(TreeNode::count).sum::<usize>()
    }

    /// Number of file-backed nodes in this subtree.
    pub fn file_count(&self) -> usize {
        usize::from(self.path.is_some())
            + self.children.iter().map(TreeNode::file_count).sum::<usize>()
    }
}

/// Loads test documents with caching and circular reference detection.
///
/// One loader serves one run. Paths currently being parsed or executed are
/// kept in an ordered in-flight list; loading a path that is already in
/// flight is a cycle. Completed documents are cached by resolved path and
/// shared.
#[derive(Debug)]
pub struct TestFileLoader {
    base_dir: PathBuf,
    cache: HashMap<PathBuf, Rc<TestDefinition>>,
    in_flight: Vec<PathBuf>,
}

impl TestFileLoader {
    /// Create a loader resolving top-level relative paths against the
    /// process working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the working directory cannot be determined.
    pub fn new() -> io::Result<Self> {
        Ok(Self::with_base_dir(std::env::current_dir()?))
    }

    /// Create a loader resolving top-level relative paths against `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            cache: HashMap::new(),
            in_flight: Vec::new(),
        }
    }

    /// Resolve `path` to a normalized absolute path.
    ///
    /// Relative paths resolve against the directory containing
    /// `relative_to`, or the base directory when there is none.
    pub fn resolve(&self, path: &str, relative_to: Option<&Path>) -> PathBuf {
        let path = Path::new(path);
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            let dir = relative_to
                .and_then(Path::parent)
                .map_or_else(|| self.base_dir.clone(), Path::to_path_buf);
            let dir = if dir.is_absolute() {
                dir
            } else {
                self.base_dir.join(dir)
            };
            dir.join(path)
        };
        normalize(&joined)
    }

    /// Load and validate the document at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::CircularReference`] if the path is in flight,
    /// [`LoadError::NotFound`] if it does not exist, and a read, parse or
    /// schema error if the document is unusable.
    pub fn load(
        &mut self,
        path: &str,
        relative_to: Option<&Path>,
    ) -> Result<Rc<TestDefinition>, LoadError> {
        let resolved = self.resolve(path, relative_to);

        if self.in_flight.contains(&resolved) {
            let mut chain = self.in_flight.clone();
            chain.push(resolved);
            return Err(LoadError::CircularReference { chain });
        }

        if let Some(cached) = self.cache.get(&resolved) {
            debug!(path = %resolved.display(), "test file cache hit");
            return Ok(Rc::clone(cached));
        }

        self.in_flight.push(resolved.clone());
        let parsed = parse_file(&resolved);
        self.leave(&resolved);

        let definition = Rc::new(parsed?);
        self.cache.insert(resolved, Rc::clone(&definition));
        Ok(definition)
    }

    /// Mark `path` as executing. Pair with [`TestFileLoader::leave`].
    pub fn enter(&mut self, path: &Path) {
        self.in_flight.push(path.to_path_buf());
    }

    /// Remove the most recent in-flight entry for `path`.
    pub fn leave(&mut self, path: &Path) {
        if let Some(pos) = self.in_flight.iter().rposition(|p| p == path) {
            self.in_flight.remove(pos);
        }
    }

    /// Paths currently in flight, outermost first.
    pub fn in_flight(&self) -> &[PathBuf] {
        &self.in_flight
    }

    pub fn is_cached(&self, path: &Path) -> bool {
        self.cache.contains_key(path)
    }

    /// Load `path` and every file it references, recursively.
    ///
    /// # Errors
    ///
    /// Returns the first [`LoadError`] met anywhere in the tree.
    pub fn load_tree(&mut self, path: &str) -> Result<TreeNode, LoadError> {
        self.load_file_node(path, None)
    }

    fn load_file_node(
        &mut self,
        path: &str,
        relative_to: Option<&Path>,
    ) -> Result<TreeNode, LoadError> {
        let definition = self.load(path, relative_to)?;
        let resolved = self.resolve(path, relative_to);

        self.enter(&resolved);
        let children = self.load_children(&definition.children, &resolved);
        self.leave(&resolved);

        Ok(TreeNode {
            definition,
            path: Some(resolved),
            children: children?,
        })
    }

    fn load_children(
        &mut self,
        children: &[ChildSpec],
        base: &Path,
    ) -> Result<Vec<TreeNode>, LoadError> {
        children
            .iter()
            .map(|child| match child {
                ChildSpec::File { path } => self.load_file_node(path, Some(base)),
                ChildSpec::Inline(inline) => {
                    let definition = Rc::new(TestDefinition::clone(inline));
                    let children = self.load_children(&definition.children, base)?;
                    Ok(TreeNode {
                        definition,
                        path: None,
                        children,
                    })
                }
            })
            .collect()
    }
}

fn parse_file(path: &Path) -> Result<TestDefinition, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    debug!(path = %path.display(), "loading test file");

    let input = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut definition: TestDefinition =
        serde_yaml::from_str(&input).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    if definition.name.trim().is_empty() {
        return Err(LoadError::Schema {
            path: path.to_path_buf(),
            reason: "missing required field \"name\"".into(),
        });
    }
    definition.source = Some(path.to_path_buf());
    Ok(definition)
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
