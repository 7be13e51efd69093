//! Extension-based mimetype guessing.

/// Guess a mimetype from a path's extension.
pub fn guess_mimetype(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("");

    match ext.to_lowercase().as_str() {
        // Text
        "txt" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "json" => "application/json",
        "toml" => "application/toml",
        "yaml" | "yml" => "application/yaml",
        "xml" => "application/xml",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",

        // Code
        "rs" => "text/x-rust",
        "py" => "text/x-python",
        "js" => "text/javascript",
        "ts" => "text/typescript",
        "sh" | "bash" => "application/x-sh",
        "c" | "h" => "text/x-c",
        "php" => "application/x-httpd-php",

        // Images
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",

        // Archives
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",

        // Documents
        "pdf" => "application/pdf",

        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_mimetype() {
        assert_eq!(guess_mimetype("file.rs"), "text/x-rust");
        assert_eq!(guess_mimetype("file.json"), "application/json");
        assert_eq!(guess_mimetype("dir/photo.PNG"), "image/png");
        assert_eq!(guess_mimetype("noext"), "application/octet-stream");
    }
}
