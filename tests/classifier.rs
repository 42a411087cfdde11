use codebase_mirror::core::loader::{content_hash, decode_text};
use codebase_mirror::core::{Classifier, ContentLoader, FileKind};
use codebase_mirror::error::UnreadableReason;
use std::path::Path;

#[test]
fn extension_decides_kind() {
    let classifier = Classifier::new();
    let cases = [
        ("app/main.py", FileKind::Python),
        ("scripts/manage.py-tpl", FileKind::Python),
        ("index.HTML", FileKind::Html),
        ("theme.scss", FileKind::Css),
        ("server.mjs", FileKind::Javascript),
        ("ui/App.tsx", FileKind::Typescript),
        ("ui/Button.jsx", FileKind::Jsx),
        ("Layout.vue", FileKind::Vue),
        ("README.md", FileKind::Markdown),
        ("logo.png", FileKind::Binary),
    ];
    for (path, expected) in cases {
        assert_eq!(classifier.classify(Path::new(path), b""), expected, "{path}");
    }
}

#[test]
fn unknown_extension_falls_back_to_content() {
    let classifier = Classifier::new();

    assert_eq!(
        classifier.classify(Path::new("bin/tool"), b"#!/usr/bin/env python3\nprint(1)\n"),
        FileKind::Python
    );
    assert_eq!(
        classifier.classify(Path::new("bin/serve"), b"#!/usr/bin/env node\n"),
        FileKind::Javascript
    );
    assert_eq!(
        classifier.classify(Path::new("page"), b"<!DOCTYPE html><html></html>"),
        FileKind::Html
    );
    assert_eq!(
        classifier.classify(Path::new("blob.dat"), b"abc\0def"),
        FileKind::Binary
    );
    assert_eq!(
        classifier.classify(Path::new("image.bin"), b"\x89PNG\r\n\x1a\n rest"),
        FileKind::Binary
    );
    assert_eq!(
        classifier.classify(Path::new("notes.txt"), b"plain words"),
        FileKind::Unknown
    );
    assert_eq!(classifier.classify(Path::new("Makefile"), b""), FileKind::Unknown);
}

#[test]
fn extension_wins_over_content() {
    let classifier = Classifier::new();
    assert_eq!(
        classifier.classify(Path::new("odd.py"), b"\0\0\0"),
        FileKind::Python
    );
}

#[test]
fn decode_text_handles_byte_order_marks() {
    assert_eq!(decode_text(b"\xef\xbb\xbfhello").unwrap(), "hello");
    assert_eq!(decode_text(b"\xff\xfeh\0i\0").unwrap(), "hi");
    assert_eq!(decode_text(b"\xfe\xff\0h\0i").unwrap(), "hi");
    assert_eq!(decode_text(b"plain").unwrap(), "plain");
    assert_eq!(
        decode_text(b"\xc3\x28"),
        Err(UnreadableReason::InvalidEncoding)
    );
    assert_eq!(
        decode_text(b"\xff\xfe\x41"),
        Err(UnreadableReason::InvalidEncoding)
    );
}

#[test]
fn content_hash_is_lowercase_sha256() {
    assert_eq!(
        content_hash(b""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert_eq!(content_hash(b"a"), content_hash(b"a"));
    assert_ne!(content_hash(b"a"), content_hash(b"b"));
}

#[tokio::test]
async fn loader_enforces_size_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    let small = dir.path().join("small.py");
    let large = dir.path().join("large.py");
    std::fs::write(&small, "x = 1\n").unwrap();
    std::fs::write(&large, "x".repeat(64)).unwrap();

    let loader = ContentLoader::new(16);

    let loaded = loader.load(&small).await.unwrap();
    assert_eq!(loaded.bytes, b"x = 1\n");
    assert_eq!(loaded.size(), 6);
    assert_eq!(loaded.head(3), b"x =");
    assert_eq!(loaded.content_hash, content_hash(b"x = 1\n"));

    assert_eq!(
        loader.load(&large).await.unwrap_err(),
        UnreadableReason::TooLarge { size: 64, limit: 16 }
    );
    assert!(matches!(
        loader.load(&dir.path().join("missing.py")).await,
        Err(UnreadableReason::Io(_))
    ));
}
