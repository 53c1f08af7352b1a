use std::{
    fs, io,
    path::{Component, Path, PathBuf},
};

/// Resolve a path cell from a metadata CSV against the model directory.
///
/// Blank input yields an empty string ("no path"). Relative values are joined
/// onto `base_dir` and the result is made absolute. Components are then
/// applied left to right like `realpath`: every prefix that exists is
/// canonicalised before the next component, so `..` after a symlink climbs
/// out of the link target. The target itself does not need to exist.
pub fn resolve_path(base_dir: &Path, value: &str) -> io::Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(String::new());
    }

    let raw = Path::new(value);
    let joined = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        base_dir.join(raw)
    };
    let absolute = std::path::absolute(&joined)?;
    Ok(canonicalize_walk(&absolute).to_string_lossy().into_owned())
}

/// Apply components in order, canonicalising each existing prefix.
fn canonicalize_walk(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            // popping the root is a no-op
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(name) => {
                out.push(name);
                if let Ok(canon) = fs::canonicalize(&out) {
                    out = canon;
                }
            }
            Component::RootDir | Component::Prefix(_) => out.push(comp.as_os_str()),
        }
    }
    out
}
