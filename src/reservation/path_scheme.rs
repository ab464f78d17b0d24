use crate::constants::COORD_PATH_TOKEN;
use crate::constants::MULTI_PERMIT_GATE_SUFFIX;
use crate::constants::RESERVATION_DELIMITER;
use crate::CoordinationError;
use crate::PathConfig;
use crate::ReservationKind;
use crate::Result;

/// Deterministic mapping from entity names to store paths.
///
/// `<base>/coord/<category>/<entity name>` is the entity path; reservation
/// nodes are created under it with the `<entity path>/<PREFIX>_` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathScheme {
    base_path: String,
}

impl PathScheme {
    pub fn new(base_path: impl Into<String>) -> Self {
        let base_path = base_path.into();
        let base_path = if base_path == "/" {
            String::new()
        } else {
            base_path
        };
        Self { base_path }
    }

    pub fn from_config(config: &PathConfig) -> Self {
        Self::new(config.base_path.clone())
    }

    /// Root of all coordination entities, `<base>/coord`.
    pub fn coord_root(&self) -> String {
        format!("{}/{}", self.base_path, COORD_PATH_TOKEN)
    }

    /// Entity path for `entity_name` in the bucket of `kind`.
    ///
    /// # Errors
    /// [`CoordinationError::InvalidPath`] for an empty name or a name with
    /// empty segments.
    pub fn entity_path(
        &self,
        kind: ReservationKind,
        entity_name: &str,
    ) -> Result<String> {
        let name = entity_name.trim_start_matches('/');
        if name.is_empty() || name.ends_with('/') || name.contains("//") {
            return Err(CoordinationError::InvalidPath(entity_name.to_string()).into());
        }
        Ok(format!("{}/{}/{}", self.coord_root(), kind.category(), name))
    }

    /// Sequential node prefix for a reservation of `kind` under `entity_path`.
    pub fn reservation_prefix(
        entity_path: &str,
        kind: ReservationKind,
    ) -> String {
        format!("{}/{}{}", entity_path, kind.prefix(), RESERVATION_DELIMITER)
    }

    /// Exclusive lock entity that takers of more than one permit of the
    /// semaphore at `entity_path` hold while collecting their permits.
    pub fn multi_permit_gate(entity_path: &str) -> String {
        format!("{}{}", entity_path, MULTI_PERMIT_GATE_SUFFIX)
    }
}

pub fn join_paths(
    parent: &str,
    child: &str,
) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, child)
    } else {
        format!("{}/{}", parent, child)
    }
}

/// Last path segment; the path itself if it has no `/`.
pub fn leaf_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Parent of an absolute path; `/` for top-level nodes.
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

pub fn is_valid_path(path: &str) -> bool {
    path == "/" || (path.starts_with('/') && !path.ends_with('/') && !path.contains("//"))
}

/// Every proper ancestor of `path`, outermost first, excluding `/`.
pub(crate) fn ancestors(path: &str) -> Vec<&str> {
    path.match_indices('/')
        .map(|(i, _)| &path[..i])
        .filter(|p| !p.is_empty())
        .collect()
}
