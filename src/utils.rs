use std::path::Path;

/// First four values of a box row, in the order they were stored.
pub(crate) fn vec_to_bbox<T: Copy>(v: &[T]) -> [T; 4] {
    [v[0], v[1], v[2], v[3]]
}

/// Creates the parent directory of `path` if it has one.
pub(crate) fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
