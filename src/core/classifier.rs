use std::collections::HashMap;
use std::path::Path;

use super::record::FileKind;

/// Content-based fallback used when the extension does not decide the kind.
pub trait ContentSniffer: Send + Sync {
    fn sniff(&self, head: &[u8]) -> Option<FileKind>;
}

/// Magic-number and prefix heuristics over the first bytes of a file.
#[derive(Debug, Default, Clone, Copy)]
pub struct MagicSniffer;

const MAGIC_NUMBERS: &[&[u8]] = &[
    b"\x89PNG\r\n\x1a\n",
    b"\xff\xd8\xff",
    b"GIF87a",
    b"GIF89a",
    b"%PDF-",
    b"PK\x03\x04",
    b"\x7fELF",
    b"\x1f\x8b",
    b"\0asm",
    b"\xca\xfe\xba\xbe",
];

impl ContentSniffer for MagicSniffer {
    fn sniff(&self, head: &[u8]) -> Option<FileKind> {
        if head.is_empty() {
            return None;
        }
        if MAGIC_NUMBERS.iter().any(|magic| head.starts_with(magic)) {
            return Some(FileKind::Binary);
        }
        if head.contains(&0) {
            return Some(FileKind::Binary);
        }

        let text = match std::str::from_utf8(head) {
            Ok(text) => text,
            // A sample cut in the middle of a multi-byte character is still text.
            Err(err) if err.error_len().is_none() => {
                std::str::from_utf8(&head[..err.valid_up_to()]).unwrap_or("")
            }
            Err(_) => return Some(FileKind::Binary),
        };

        let trimmed = text.trim_start_matches('\u{feff}').trim_start();
        if let Some(first_line) = trimmed.strip_prefix("#!").and_then(|l| l.lines().next()) {
            if first_line.contains("python") {
                return Some(FileKind::Python);
            }
            if first_line.contains("node") || first_line.contains("deno") {
                return Some(FileKind::Javascript);
            }
            return None;
        }

        let lowered: String = trimmed.chars().take(64).collect::<String>().to_lowercase();
        if lowered.starts_with("<!doctype html") || lowered.starts_with("<html") {
            return Some(FileKind::Html);
        }

        None
    }
}

/// Maps a path and its leading bytes to a [`FileKind`]. Never fails.
pub struct Classifier {
    extensions: HashMap<&'static str, FileKind>,
    sniffer: Box<dyn ContentSniffer>,
}

impl Classifier {
    pub fn new() -> Self {
        Self::with_sniffer(Box::new(MagicSniffer))
    }

    pub fn with_sniffer(sniffer: Box<dyn ContentSniffer>) -> Self {
        Self {
            extensions: Self::extension_table(),
            sniffer,
        }
    }

    /// Extension lookup only; `None` when content sniffing is required.
    pub fn classify_path(&self, path: &Path) -> Option<FileKind> {
        let name = path.file_name()?.to_str()?;
        // `.py-tpl` style double extensions are checked before the plain one.
        let lowered = name.to_ascii_lowercase();
        if lowered.ends_with(".py-tpl") {
            return Some(FileKind::Python);
        }
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        self.extensions.get(extension.as_str()).copied()
    }

    pub fn classify(&self, path: &Path, head: &[u8]) -> FileKind {
        if let Some(kind) = self.classify_path(path) {
            return kind;
        }
        self.sniffer.sniff(head).unwrap_or(FileKind::Unknown)
    }

    fn extension_table() -> HashMap<&'static str, FileKind> {
        let mut extensions = HashMap::with_capacity(64);

        for ext in ["py", "pyi", "pyw", "pyx"] {
            extensions.insert(ext, FileKind::Python);
        }
        for ext in ["html", "htm"] {
            extensions.insert(ext, FileKind::Html);
        }
        for ext in ["css", "scss", "sass", "less"] {
            extensions.insert(ext, FileKind::Css);
        }
        for ext in ["js", "mjs", "cjs"] {
            extensions.insert(ext, FileKind::Javascript);
        }
        for ext in ["ts", "tsx", "mts", "cts"] {
            extensions.insert(ext, FileKind::Typescript);
        }
        extensions.insert("jsx", FileKind::Jsx);
        extensions.insert("vue", FileKind::Vue);
        for ext in ["md", "markdown", "mdx"] {
            extensions.insert(ext, FileKind::Markdown);
        }
        for ext in [
            "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "pdf", "doc", "docx", "xls",
            "xlsx", "ppt", "pptx", "odt", "zip", "gz", "tar", "jar", "so", "dll", "exe", "class",
            "pyc", "woff", "woff2", "ttf", "otf", "mp3", "mp4", "wav",
        ] {
            extensions.insert(ext, FileKind::Binary);
        }

        extensions
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}
