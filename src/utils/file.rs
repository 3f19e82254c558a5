use std::env;
use std::path::{Component, Path, PathBuf};


/// Lexically normalizes a path: drops `.` components and folds `dir/..`
/// pairs without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}


/// Renders `path` relative to `base`, walking up with `..` where the two
/// diverge. Relative inputs are taken as already relative to `base`.
///
/// # Arguments
///
/// * `path` - Path to render.
/// * `base` - Absolute directory to render against.
///
/// # Returns
/// Normalized relative path.
pub fn relative_path(path: &Path, base: &Path) -> PathBuf {
    if !path.is_absolute() {
        return normalize_path(path);
    }
    let path = normalize_path(path);
    let base = normalize_path(base);

    let path_parts: Vec<Component> = path.components().collect();
    let base_parts: Vec<Component> = base.components().collect();
    let common = path_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    // Different roots (e.g. Windows drive prefixes): nothing to relate.
    if common == 0 {
        return path;
    }

    let mut rel = PathBuf::new();
    for _ in common..base_parts.len() {
        rel.push("..");
    }
    for part in &path_parts[common..] {
        rel.push(part.as_os_str());
    }
    normalize_path(&rel)
}


/// Renders `path` relative to the current working directory, falling back to
/// the path as given when the cwd cannot be read.
pub fn relative_to_cwd(path: &Path) -> PathBuf {
    match env::current_dir() {
        Ok(cwd) => relative_path(path, &cwd),
        Err(_) => normalize_path(path),
    }
}


/// Prefixes `ext` with a dot unless it already has one.
pub fn dot_extension(ext: &str) -> String {
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{}", ext)
    }
}


/// Appends `suffix` verbatim to the final component of `path`.
pub fn append_to_path(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}
