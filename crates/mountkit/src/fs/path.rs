//! Path helpers for backend-relative string paths.
//!
//! All backends address content with `/`-separated paths relative to their
//! root; the empty string is the root itself. Leading and trailing slashes
//! are insignificant and stripped during normalization.

/// Normalize a backend-relative path.
///
/// Collapses duplicate separators, resolves `.` and `..` components, and
/// strips leading/trailing slashes. `..` never escapes the root.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }

    parts.join("/")
}

/// The parent of a normalized path. The root's parent is the root.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// The final component of a normalized path.
pub fn name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Join a base directory and a child component.
pub fn join(base: &str, child: &str) -> String {
    if base.is_empty() {
        child.to_string()
    } else {
        format!("{}/{}", base, child)
    }
}

/// True when `path` equals `dir` or sits anywhere beneath it.
/// The root contains every path.
pub fn is_within(path: &str, dir: &str) -> bool {
    dir.is_empty() || path == dir || path.starts_with(&format!("{}/", dir))
}

/// Rewrite `path` from the `from` namespace into the `to` namespace.
/// `path` must be within `from`.
pub fn rebase(path: &str, from: &str, to: &str) -> String {
    if path == from {
        return to.to_string();
    }
    let relative = if from.is_empty() {
        path
    } else {
        path.strip_prefix(&format!("{}/", from)).unwrap_or(path)
    };
    join(to, relative)
}
