//! Path helpers shared by the on-disk stores.

use std::path::{Component, Path, PathBuf};

/// Join `name` onto `root` only if it is a single plain path component.
///
/// Handles come from the orchestrator; anything that would resolve outside
/// `root` (or to `root` itself) yields `None`.
pub(crate) fn child_path(root: &Path, name: &str) -> Option<PathBuf> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Some(root.join(part)),
        _ => None,
    }
}
