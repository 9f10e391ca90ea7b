//! JUnit XML timing history.
//!
//! Reads the `TEST-*.xml` files Gradle, Maven Surefire and most other
//! JUnit-compatible runners leave behind:
//!
//! ```xml
//! <testsuite name="com.example.FooTest" tests="2" time="1.532">
//!   <testcase classname="com.example.FooTest" name="adds" time="0.032"/>
//!   <testcase classname="com.example.FooTest" name="divides" time="1.500"/>
//! </testsuite>
//! ```
//!
//! In [`JunitFormat::Suite`] mode the file above yields one sample,
//! `com.example.FooTest = 1.532s`. In [`JunitFormat::Case`] mode it yields
//! `com.example.FooTest.adds` and `com.example.FooTest.divides`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{HistoryError, HistoryReader, HistoryResult};
use crate::discovery::walk;
use crate::duration::{DurationError, DurationSample};

/// Which JUnit element a sample is taken from.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum JunitFormat {
    /// `<testsuite name time>`; one sample per test class.
    #[default]
    Suite,
    /// `<testcase classname name time>`; one sample per test method.
    Case,
}

impl JunitFormat {
    fn element(&self) -> &'static [u8] {
        match self {
            JunitFormat::Suite => b"testsuite",
            JunitFormat::Case => b"testcase",
        }
    }
}

/// Loads samples from JUnit XML files matched by glob.
pub struct JunitReader {
    root: PathBuf,
    glob: String,
    format: JunitFormat,
    max_parallel: usize,
}

impl JunitReader {
    /// Creates a reader for report files under `root` matching `glob`.
    pub fn new(root: impl Into<PathBuf>, glob: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            glob: glob.into(),
            format: JunitFormat::default(),
            max_parallel: 16,
        }
    }

    /// Sets the sample granularity.
    pub fn with_format(mut self, format: JunitFormat) -> Self {
        self.format = format;
        self
    }

    /// Limits how many report files are parsed concurrently.
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    async fn read_file(path: PathBuf, format: JunitFormat) -> HistoryResult<Vec<DurationSample>> {
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| HistoryError::Read {
                path: path.clone(),
                source,
            })?;
        parse_report(&content, &path, format)
    }
}

#[async_trait]
impl HistoryReader for JunitReader {
    async fn read(&self) -> HistoryResult<Vec<DurationSample>> {
        let files = walk::find_files(&self.root, &self.glob, None)?;
        debug!("Found {} JUnit report files", files.len());

        let format = self.format;
        let per_file: Vec<Vec<DurationSample>> = stream::iter(files)
            .map(|path| Self::read_file(path, format))
            .buffered(self.max_parallel)
            .try_collect()
            .await?;

        let samples: Vec<DurationSample> = per_file.into_iter().flatten().collect();
        info!("Loaded {} timing samples from JUnit reports", samples.len());
        Ok(samples)
    }

    fn name(&self) -> &'static str {
        "junit"
    }
}

/// Parses one JUnit XML document into samples.
///
/// `path` is used for error messages and as the sample origin.
///
/// # Errors
///
/// [`HistoryError::Parse`] for invalid XML, [`HistoryError::Malformed`] for
/// a sample element without a usable name or `time`.
pub fn parse_report(
    content: &str,
    path: &Path,
    format: JunitFormat,
) -> HistoryResult<Vec<DurationSample>> {
    let origin = path.display().to_string();
    let mut reader = Reader::from_str(content);
    let mut samples = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) | Ok(Event::Empty(element))
                if element.local_name().as_ref() == format.element() =>
            {
                let sample = sample_from(&element, format, &origin)?;
                debug!(
                    "Adding test {} [{}]",
                    sample.id,
                    crate::report::format_time(sample.duration)
                );
                samples.push(sample);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(HistoryError::Parse {
                    path: path.to_path_buf(),
                    message: format!("at byte {}: {}", reader.error_position(), e),
                });
            }
        }
    }

    Ok(samples)
}

fn sample_from(
    element: &BytesStart<'_>,
    format: JunitFormat,
    origin: &str,
) -> HistoryResult<DurationSample> {
    let name = attribute(element, b"name", origin)?.unwrap_or_default();
    let id = match format {
        JunitFormat::Suite => name,
        JunitFormat::Case => match attribute(element, b"classname", origin)? {
            Some(class) if !class.trim().is_empty() => format!("{}.{}", class.trim(), name.trim()),
            _ => name,
        },
    };

    let time = attribute(element, b"time", origin)?.ok_or_else(|| {
        DurationError::malformed(origin, format!("test {} has no time attribute", id.trim()))
    })?;
    let secs = parse_seconds(&time).ok_or_else(|| {
        DurationError::malformed(origin, format!("test {} has invalid time {:?}", id.trim(), time))
    })?;

    Ok(DurationSample::from_secs_f64(&id, secs, origin)?)
}

fn attribute(
    element: &BytesStart<'_>,
    key: &[u8],
    origin: &str,
) -> Result<Option<String>, DurationError> {
    let attr = element
        .try_get_attribute(key)
        .map_err(|e| DurationError::malformed(origin, e.to_string()))?;
    match attr {
        Some(attr) => {
            let value = attr
                .unescape_value()
                .map_err(|e| DurationError::malformed(origin, e.to_string()))?;
            Ok(Some(value.into_owned()))
        }
        None => Ok(None),
    }
}

/// Some runners write thousands separators (`time="1,234.5"`).
///
/// A comma is only accepted between groups of exactly three digits in the
/// integer part; a decimal comma such as `1,5` is rejected.
fn parse_seconds(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.contains(',') {
        let (whole, fraction) = raw.split_once('.').unwrap_or((raw, ""));
        if fraction.contains(',') {
            return None;
        }
        let is_digits = |group: &str| group.bytes().all(|b| b.is_ascii_digit());
        let mut groups = whole.split(',');
        let lead = groups.next()?;
        if lead.is_empty() || lead.len() > 3 || !is_digits(lead) {
            return None;
        }
        if !groups.all(|group| group.len() == 3 && is_digits(group)) {
            return None;
        }
    }
    raw.replace(',', "").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<testsuite name="com.example.FooTest" tests="2" skipped="0" failures="0" errors="0" time="1.532">
  <properties/>
  <testcase name="adds" classname="com.example.FooTest" time="0.032"/>
  <testcase name="divides" classname="com.example.FooTest" time="1.5">
    <system-out><![CDATA[ok]]></system-out>
  </testcase>
</testsuite>
"#;

    fn parse(content: &str, format: JunitFormat) -> HistoryResult<Vec<DurationSample>> {
        parse_report(content, Path::new("TEST-x.xml"), format)
    }

    #[test]
    fn test_parse_suite() {
        let samples = parse(REPORT, JunitFormat::Suite).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].id.as_str(), "com.example.FooTest");
        assert_eq!(samples[0].duration, Duration::from_millis(1532));
        assert_eq!(samples[0].origin, "TEST-x.xml");
    }

    #[test]
    fn test_parse_cases() {
        let samples = parse(REPORT, JunitFormat::Case).unwrap();
        let ids: Vec<_> = samples.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["com.example.FooTest.adds", "com.example.FooTest.divides"]);
        assert_eq!(samples[1].duration, Duration::from_millis(1500));
    }

    #[test]
    fn test_parse_testsuites_wrapper() {
        let content = r#"<testsuites>
  <testsuite name="a.ATest" time="2"/>
  <testsuite name="a.BTest" time="1,000.25"></testsuite>
</testsuites>"#;
        let samples = parse(content, JunitFormat::Suite).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].duration, Duration::from_millis(1_000_250));
    }

    #[test]
    fn test_missing_time_is_malformed() {
        let err = parse(r#"<testsuite name="a.ATest"/>"#, JunitFormat::Suite).unwrap_err();
        assert!(matches!(err, HistoryError::Malformed(_)));
        assert!(err.to_string().contains("TEST-x.xml"));
    }

    #[test]
    fn test_negative_and_garbage_time_are_malformed() {
        for time in ["-1.0", "soon", "NaN", "1,5", "12,34.5", ",500", "1,000,5", "1.000,5"] {
            let content = format!(r#"<testsuite name="a.ATest" time="{}"/>"#, time);
            let err = parse(&content, JunitFormat::Suite).unwrap_err();
            assert!(matches!(err, HistoryError::Malformed(_)), "time {time}");
        }
    }

    #[test]
    fn test_thousands_separators() {
        assert_eq!(parse_seconds("1,234.5"), Some(1234.5));
        assert_eq!(parse_seconds(" 12,000 "), Some(12000.0));
        assert_eq!(parse_seconds("1,000,000.25"), Some(1_000_000.25));
        assert_eq!(parse_seconds("0.75"), Some(0.75));
        assert_eq!(parse_seconds("1,5"), None);
        assert_eq!(parse_seconds("1234,567"), None);
    }

    #[test]
    fn test_missing_name_is_malformed() {
        let err = parse(r#"<testsuite time="1.0"/>"#, JunitFormat::Suite).unwrap_err();
        assert!(matches!(err, HistoryError::Malformed(_)));
    }

    #[test]
    fn test_invalid_xml() {
        let err = parse("<testsuite name=\"a\" time=\"1\"></testcase>", JunitFormat::Suite)
            .unwrap_err();
        assert!(matches!(err, HistoryError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_reader_loads_matching_files_in_path_order() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("build/test-results/test");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("TEST-a.ATest.xml"),
            r#"<testsuite name="a.ATest" time="3.0"/>"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("TEST-a.BTest.xml"),
            r#"<testsuite name="a.BTest" time="1.0"/>"#,
        )
        .unwrap();
        std::fs::write(dir.join("output.bin"), "not xml").unwrap();

        let reader = JunitReader::new(temp_dir.path(), "**/TEST-*.xml").with_max_parallel(1);
        let samples = reader.read().await.unwrap();
        let ids: Vec<_> = samples.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a.ATest", "a.BTest"]);
    }

    #[tokio::test]
    async fn test_reader_without_matches_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let reader = JunitReader::new(temp_dir.path(), "**/TEST-*.xml");
        assert!(reader.read().await.unwrap().is_empty());
    }
}
