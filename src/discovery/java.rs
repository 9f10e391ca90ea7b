//! Java test class discovery.
//!
//! Finds `*.java` files by glob and reads each one's package and first
//! top-level type declaration. Only concrete classes are schedulable:
//!
//! - interfaces, enums, records and annotation types are skipped
//! - `abstract` classes are skipped
//! - classes annotated `@Disabled` (JUnit 5) or `@Ignore` (JUnit 4) are
//!   skipped when the matching annotation is imported
//!
//! This is a lexical scan, not a full parser. It handles the shapes test
//! sources take in practice; a file with no recognizable type declaration
//! fails discovery rather than being silently dropped.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use regex::Regex;
use tracing::{debug, info};

use super::{DiscoveryError, DiscoveryResult, TestDiscoverer, walk};
use crate::config::JavaDiscoveryConfig;

/// Imports that make `@Disabled` / `@Ignore` refer to JUnit.
const SKIP_TEST_IMPORTS: &[&str] = &[
    "org.junit.jupiter.api.Disabled",
    "org.junit.Ignore",
    "org.junit.jupiter.api.*",
    "org.junit.*",
];

/// Annotation names that disable a test class.
const SKIP_TEST_ANNOTATIONS: &[&str] = &["Disabled", "Ignore"];

static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid block comment regex"));

static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)//.*$").expect("valid line comment regex"));

static PACKAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*package\s+([\w.]+)\s*;").expect("valid package regex")
});

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*import\s+(?:static\s+)?([\w.]+(?:\.\*)?)\s*;").expect("valid import regex")
});

static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        // Annotation arguments may hold string literals with parentheses.
        r#"((?:@[\w.]+(?:\((?:"(?:[^"\\]|\\.)*"|[^)"])*\))?\s*)*)"#,
        r"((?:(?:public|protected|private|abstract|final|static|sealed|non-sealed|strictfp)\s+)*)",
        r"\b(class|interface|enum|record)\s+([A-Za-z_$][\w$]*)",
    ))
    .expect("valid declaration regex")
});

static ANNOTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([\w.]+)").expect("valid annotation regex"));

/// Kind of a top-level Java type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Interface,
    Enum,
    Record,
}

/// The first top-level type declared in a Java source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDeclaration {
    /// Fully-qualified name (`package.Type`).
    pub name: String,
    pub kind: TypeKind,
    pub is_abstract: bool,
    /// Annotated with an imported `@Disabled` / `@Ignore`.
    pub disabled: bool,
}

impl TypeDeclaration {
    /// Why this type cannot be scheduled, or `None` if it is a runnable
    /// test class.
    pub fn skip_reason(&self) -> Option<&'static str> {
        match self.kind {
            TypeKind::Interface => Some("interface"),
            TypeKind::Enum => Some("enum"),
            TypeKind::Record => Some("record"),
            TypeKind::Class if self.is_abstract => Some("abstract class"),
            TypeKind::Class if self.disabled => Some("disabled test class"),
            TypeKind::Class => None,
        }
    }
}

/// Reads the package and first type declaration from Java source.
///
/// Returns `None` if no type declaration is found.
///
/// ```
/// use split_tests::discovery::java::{inspect_source, TypeKind};
///
/// let source = r#"
/// package com.example;
///
/// import org.junit.jupiter.api.Test;
///
/// public class CalculatorTest {
///     @Test
///     void adds() {}
/// }
/// "#;
///
/// let declaration = inspect_source(source).unwrap();
/// assert_eq!(declaration.name, "com.example.CalculatorTest");
/// assert_eq!(declaration.kind, TypeKind::Class);
/// assert!(declaration.skip_reason().is_none());
/// ```
pub fn inspect_source(source: &str) -> Option<TypeDeclaration> {
    let without_blocks = BLOCK_COMMENT.replace_all(source, " ");
    let code = LINE_COMMENT.replace_all(&without_blocks, "");

    let package = PACKAGE.captures(&code).map(|c| c[1].to_string());
    let imports: Vec<&str> = IMPORT
        .captures_iter(&code)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    let declaration = DECLARATION.captures(&code)?;
    let annotations = declaration.get(1).map_or("", |m| m.as_str());
    let modifiers = declaration.get(2).map_or("", |m| m.as_str());
    let kind = match &declaration[3] {
        "class" => TypeKind::Class,
        "interface" => TypeKind::Interface,
        "enum" => TypeKind::Enum,
        _ => TypeKind::Record,
    };
    let simple_name = &declaration[4];

    let name = match package {
        Some(package) => format!("{}.{}", package, simple_name),
        None => simple_name.to_string(),
    };

    Some(TypeDeclaration {
        name,
        kind,
        is_abstract: modifiers.split_whitespace().any(|m| m == "abstract"),
        disabled: is_disabled(annotations, &imports),
    })
}

fn is_disabled(annotations: &str, imports: &[&str]) -> bool {
    let has_skip_import = imports.iter().any(|i| SKIP_TEST_IMPORTS.contains(i));
    ANNOTATION
        .captures_iter(annotations)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .any(|annotation| {
            if SKIP_TEST_IMPORTS.contains(&annotation) {
                // Fully-qualified, e.g. @org.junit.Ignore
                true
            } else {
                has_skip_import && SKIP_TEST_ANNOTATIONS.contains(&annotation)
            }
        })
}

/// Discovers JUnit test classes in a Java source tree.
pub struct JavaDiscoverer {
    root: PathBuf,
    config: JavaDiscoveryConfig,
    max_parallel: usize,
}

impl JavaDiscoverer {
    /// Creates a discoverer rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, config: JavaDiscoveryConfig) -> Self {
        Self {
            root: root.into(),
            config,
            max_parallel: 16,
        }
    }

    /// Limits how many source files are read concurrently.
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    async fn inspect_file(path: PathBuf) -> DiscoveryResult<(PathBuf, TypeDeclaration)> {
        let source = tokio::fs::read_to_string(&path).await?;
        let declaration = inspect_source(&source).ok_or_else(|| DiscoveryError::ParseError {
            path: path.clone(),
            message: "no class declaration found".to_string(),
        })?;
        Ok((path, declaration))
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl TestDiscoverer for JavaDiscoverer {
    async fn discover(&self) -> DiscoveryResult<Vec<String>> {
        let files = walk::find_files(
            self.root(),
            &self.config.glob,
            self.config.exclude_glob.as_deref(),
        )?;
        debug!("Found {} test source files", files.len());

        let declarations: Vec<(PathBuf, TypeDeclaration)> = stream::iter(files)
            .map(Self::inspect_file)
            .buffered(self.max_parallel)
            .try_collect()
            .await?;

        let mut classes = Vec::with_capacity(declarations.len());
        for (path, declaration) in declarations {
            match declaration.skip_reason() {
                Some(reason) => info!("Skipping {} {}", reason, declaration.name),
                None => {
                    debug!("Found test class {} in {}", declaration.name, path.display());
                    classes.push(declaration.name);
                }
            }
        }

        if classes.is_empty() {
            tracing::warn!("Found no test classes matching {}", self.config.glob);
        } else {
            info!("Found {} test classes", classes.len());
        }

        Ok(classes)
    }

    fn name(&self) -> &'static str {
        "java"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn config(glob: &str) -> JavaDiscoveryConfig {
        JavaDiscoveryConfig {
            glob: glob.to_string(),
            exclude_glob: None,
        }
    }

    #[test]
    fn test_inspect_without_package() {
        let declaration = inspect_source("class FooTest {}").unwrap();
        assert_eq!(declaration.name, "FooTest");
    }

    #[test]
    fn test_inspect_skips_interfaces_and_abstract_classes() {
        let interface = inspect_source("package a;\npublic interface BaseTest {}").unwrap();
        assert_eq!(interface.skip_reason(), Some("interface"));

        let abstract_class =
            inspect_source("package a;\npublic abstract class AbstractTest {}").unwrap();
        assert!(abstract_class.is_abstract);
        assert_eq!(abstract_class.skip_reason(), Some("abstract class"));

        let annotation_type = inspect_source("package a;\npublic @interface Slow {}").unwrap();
        assert_eq!(annotation_type.kind, TypeKind::Interface);
    }

    #[test]
    fn test_inspect_disabled_classes() {
        let junit5 = inspect_source(
            "package a;\nimport org.junit.jupiter.api.Disabled;\n@Disabled(\"flaky\")\nclass OffTest {}",
        )
        .unwrap();
        assert!(junit5.disabled);

        let junit4 = inspect_source(
            "package a;\nimport org.junit.Ignore;\n@Ignore\npublic class OldTest {}",
        )
        .unwrap();
        assert!(junit4.disabled);

        let qualified = inspect_source("package a;\n@org.junit.Ignore\npublic class QTest {}").unwrap();
        assert!(qualified.disabled);

        let parenthesized = inspect_source(
            "package a;\nimport org.junit.jupiter.api.Disabled;\n@Disabled(\"flaky (see #12)\")\npublic class OffTest {}",
        )
        .unwrap();
        assert!(parenthesized.disabled);
        assert_eq!(parenthesized.name, "a.OffTest");
    }

    #[test]
    fn test_inspect_foreign_disabled_annotation_is_ignored() {
        let declaration = inspect_source(
            "package a;\nimport com.acme.Disabled;\n@Disabled\npublic class StillRunsTest {}",
        )
        .unwrap();
        assert!(!declaration.disabled);
        assert!(declaration.skip_reason().is_none());
    }

    #[test]
    fn test_inspect_ignores_comments_and_class_literals() {
        let source = r#"
            /*
             * This class tests things.
             */
            package com.example.web; // the web package

            import org.junit.jupiter.api.extension.ExtendWith;

            // public class Commented {}
            @ExtendWith(MockitoExtension.class)
            @Tag("slow")
            final class ControllerTest {
            }
        "#;
        let declaration = inspect_source(source).unwrap();
        assert_eq!(declaration.name, "com.example.web.ControllerTest");
        assert!(!declaration.disabled);
    }

    #[test]
    fn test_inspect_no_declaration() {
        assert!(inspect_source("package a;\n// nothing here\n").is_none());
    }

    #[tokio::test]
    async fn test_discover_java_tree() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "src/test/java/a/FooTest.java", "package a;\npublic class FooTest {}");
        write(root, "src/test/java/a/BarTest.java", "package a;\nclass BarTest {}");
        write(
            root,
            "src/test/java/a/BaseTest.java",
            "package a;\npublic abstract class BaseTest {}",
        );
        write(root, "src/main/java/a/Foo.java", "package a;\npublic class Foo {}");

        let discoverer = JavaDiscoverer::new(root, config("**/src/test/java/**/*Test.java"));
        let mut classes = discoverer.discover().await.unwrap();
        classes.sort();
        assert_eq!(classes, vec!["a.BarTest", "a.FooTest"]);
    }

    #[tokio::test]
    async fn test_discover_exclude_glob() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "unit/FastTest.java", "package u;\nclass FastTest {}");
        write(root, "integration/SlowTest.java", "package i;\nclass SlowTest {}");

        let config = JavaDiscoveryConfig {
            glob: "**/*Test.java".to_string(),
            exclude_glob: Some("integration/**".to_string()),
        };
        let classes = JavaDiscoverer::new(root, config).discover().await.unwrap();
        assert_eq!(classes, vec!["u.FastTest"]);
    }

    #[tokio::test]
    async fn test_discover_fails_on_unparseable_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "BrokenTest.java", "this is not java");

        let err = JavaDiscoverer::new(root, config("*Test.java"))
            .discover()
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::ParseError { .. }));
    }
}
