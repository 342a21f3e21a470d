use std::{
    io::{self, ErrorKind},
    panic::AssertUnwindSafe,
    path::PathBuf,
    process::Stdio,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use futures::FutureExt;
use metrics::{counter, histogram};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::application::render::{
    artifacts::{ArtifactCache, content_hash},
    runtime::InFlightConversions,
    types::DiagramArtifact,
};

pub const DIAGRAM_ID_PREFIX: &str = "folio-diagram-";
pub const SVG_DATA_URI_PREFIX: &str = "data:image/svg+xml;base64,";

pub(crate) const METRIC_DIAGRAM_CACHE_HIT: &str = "folio_diagram_cache_hit_total";
pub(crate) const METRIC_DIAGRAM_CACHE_MISS: &str = "folio_diagram_cache_miss_total";
pub(crate) const METRIC_DIAGRAM_FAILURE: &str = "folio_diagram_failure_total";
pub(crate) const METRIC_DIAGRAM_STALE: &str = "folio_diagram_stale_total";
pub(crate) const METRIC_DIAGRAM_CONVERT_MS: &str = "folio_diagram_convert_ms";

#[derive(Debug, Error)]
pub enum DiagramError {
    #[error("failed to prepare conversion workspace: {0}")]
    Io(io::Error),
    #[error("diagram CLI unavailable: {0}")]
    NotFound(io::Error),
    #[error("diagram CLI invocation failed (exit {exit_code:?}): {stderr}")]
    Cli {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("diagram CLI timed out after {seconds}s")]
    Timeout { seconds: u64 },
    #[error("failed to read rendered SVG: {0}")]
    Read(io::Error),
    #[error("diagram converter panicked")]
    Panicked,
}

/// Converts textual diagram source into SVG markup.
#[async_trait]
pub trait DiagramConverter: Send + Sync {
    async fn convert(&self, source: &str, diagram_id: &str) -> Result<String, DiagramError>;
}

/// Converter driving the Mermaid CLI (`mmdc`).
#[derive(Debug, Clone)]
pub struct MermaidCliConverter {
    cli_path: PathBuf,
    timeout: Duration,
}

impl MermaidCliConverter {
    pub fn new(cli_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            cli_path: cli_path.into(),
            timeout,
        }
    }
}

#[async_trait]
impl DiagramConverter for MermaidCliConverter {
    async fn convert(&self, source: &str, diagram_id: &str) -> Result<String, DiagramError> {
        let workspace = tempfile::tempdir().map_err(DiagramError::Io)?;
        let input_path = workspace.path().join("diagram.mmd");
        let output_path = workspace.path().join("diagram.svg");
        tokio::fs::write(&input_path, source)
            .await
            .map_err(DiagramError::Io)?;

        let cli_started_at = Instant::now();
        let child = Command::new(&self.cli_path)
            .arg("--input")
            .arg(&input_path)
            .arg("--output")
            .arg(&output_path)
            .arg("--outputFormat")
            .arg("svg")
            .arg("--svgId")
            .arg(diagram_id)
            .arg("--quiet")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                warn!(
                    target = "application::render::diagram",
                    op = "diagram::convert",
                    result = "error",
                    error_code = "spawn_cli",
                    cli_path = %self.cli_path.display(),
                    error = %err,
                    "Failed to spawn diagram CLI"
                );
                if err.kind() == ErrorKind::NotFound {
                    DiagramError::NotFound(err)
                } else {
                    DiagramError::Io(err)
                }
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| DiagramError::Timeout {
                seconds: self.timeout.as_secs(),
            })?
            .map_err(DiagramError::Io)?;

        if !output.status.success() {
            let exit_code = output.status.code();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(
                target = "application::render::diagram",
                op = "diagram::convert",
                result = "error",
                cli_elapsed_ms = cli_started_at.elapsed().as_millis() as u64,
                exit_code = exit_code.map(i64::from).unwrap_or(-1),
                error_code = "diagram_cli",
                stderr = %stderr,
                "Diagram CLI invocation failed"
            );
            return Err(DiagramError::Cli { exit_code, stderr });
        }

        let svg = tokio::fs::read_to_string(&output_path)
            .await
            .map_err(DiagramError::Read)?;

        debug!(
            target = "application::render::diagram",
            op = "diagram::convert",
            result = "ok",
            cli_elapsed_ms = cli_started_at.elapsed().as_millis() as u64,
            svg_bytes = svg.len(),
            "Diagram rendered via CLI"
        );

        Ok(svg)
    }
}

/// Result of one pipeline render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagramOutcome {
    /// Blank source; nothing was converted or cached.
    Empty,
    Ready(Arc<DiagramArtifact>),
    /// Conversion failed. The failure was logged and counted.
    Unavailable,
}

/// Diagram source → cached, displayable artifact.
///
/// Concurrent renders of the same source share one conversion. Failures never
/// escape: they degrade to [`DiagramOutcome::Unavailable`].
#[derive(Clone)]
pub struct DiagramPipeline {
    converter: Arc<dyn DiagramConverter>,
    cache: Arc<dyn ArtifactCache>,
    in_flight: InFlightConversions,
}

impl DiagramPipeline {
    pub fn new(converter: Arc<dyn DiagramConverter>, cache: Arc<dyn ArtifactCache>) -> Self {
        Self {
            converter,
            cache,
            in_flight: InFlightConversions::new(),
        }
    }

    pub fn cache(&self) -> &Arc<dyn ArtifactCache> {
        &self.cache
    }

    /// Cached artifact for `content_hash`, without converting.
    pub fn lookup(&self, content_hash: &str) -> Option<Arc<DiagramArtifact>> {
        let artifact = self.cache.get(content_hash)?;
        counter!(METRIC_DIAGRAM_CACHE_HIT).increment(1);
        Some(artifact)
    }

    pub async fn render(&self, source: &str) -> DiagramOutcome {
        if source.trim().is_empty() {
            return DiagramOutcome::Empty;
        }

        let hash = content_hash(source);
        if let Some(artifact) = self.lookup(&hash) {
            debug!(
                target = "application::render::diagram",
                op = "diagram::render",
                result = "cache_hit",
                content_hash = %hash,
                "Diagram served from cache"
            );
            return DiagramOutcome::Ready(artifact);
        }
        counter!(METRIC_DIAGRAM_CACHE_MISS).increment(1);

        let converter = Arc::clone(&self.converter);
        let cache = Arc::clone(&self.cache);
        let source = source.to_string();
        let conversion = self.in_flight.join_or_start(hash.clone(), move || {
            convert_and_store(converter, cache, hash, source).boxed()
        });

        match conversion.await {
            Some(artifact) => DiagramOutcome::Ready(artifact),
            None => DiagramOutcome::Unavailable,
        }
    }
}

async fn convert_and_store(
    converter: Arc<dyn DiagramConverter>,
    cache: Arc<dyn ArtifactCache>,
    hash: String,
    source: String,
) -> Option<Arc<DiagramArtifact>> {
    // A conversion for the same hash may have finished since the caller's lookup.
    if let Some(artifact) = cache.get(&hash) {
        return Some(artifact);
    }

    let started_at = Instant::now();
    let diagram_id = diagram_id(&hash);
    let result = AssertUnwindSafe(converter.convert(&source, &diagram_id))
        .catch_unwind()
        .await
        .unwrap_or(Err(DiagramError::Panicked));
    let elapsed = started_at.elapsed();
    histogram!(METRIC_DIAGRAM_CONVERT_MS).record(elapsed.as_secs_f64() * 1000.0);

    match result {
        Ok(svg) => {
            let artifact = Arc::new(DiagramArtifact {
                rendered_image: svg_data_uri(&svg),
                content_hash: hash,
                source_text: source,
            });
            cache.insert(Arc::clone(&artifact));
            info!(
                target = "application::render::diagram",
                op = "diagram::render",
                result = "converted",
                elapsed_ms = elapsed.as_millis() as u64,
                content_hash = %artifact.content_hash,
                svg_bytes = svg.len(),
                "Diagram converted"
            );
            Some(artifact)
        }
        Err(err) => {
            counter!(METRIC_DIAGRAM_FAILURE).increment(1);
            warn!(
                target = "application::render::diagram",
                op = "diagram::render",
                result = "unavailable",
                elapsed_ms = elapsed.as_millis() as u64,
                content_hash = %hash,
                error = %err,
                "Diagram conversion failed; showing source instead"
            );
            None
        }
    }
}

/// Stable element identifier for the SVG generated from `content_hash`.
pub fn diagram_id(content_hash: &str) -> String {
    let short = content_hash.get(..16).unwrap_or(content_hash);
    format!("{DIAGRAM_ID_PREFIX}{short}")
}

pub fn svg_data_uri(svg: &str) -> String {
    format!("{SVG_DATA_URI_PREFIX}{}", STANDARD.encode(svg.as_bytes()))
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::application::render::artifacts::MemoryArtifactCache;

    #[derive(Default)]
    struct CountingConverter {
        calls: AtomicUsize,
        ids: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DiagramConverter for CountingConverter {
        async fn convert(&self, source: &str, diagram_id: &str) -> Result<String, DiagramError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.ids
                .lock()
                .expect("ids lock")
                .push(diagram_id.to_string());
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(format!("<svg>{}</svg>", source.len()))
        }
    }

    struct FailingConverter;

    #[async_trait]
    impl DiagramConverter for FailingConverter {
        async fn convert(&self, _source: &str, _diagram_id: &str) -> Result<String, DiagramError> {
            Err(DiagramError::Cli {
                exit_code: Some(1),
                stderr: "Parse error on line 1".into(),
            })
        }
    }

    struct PanickingConverter;

    #[async_trait]
    impl DiagramConverter for PanickingConverter {
        async fn convert(&self, _source: &str, _diagram_id: &str) -> Result<String, DiagramError> {
            panic!("converter exploded");
        }
    }

    fn pipeline(converter: Arc<dyn DiagramConverter>) -> DiagramPipeline {
        DiagramPipeline::new(converter, Arc::new(MemoryArtifactCache::default()))
    }

    #[tokio::test]
    async fn blank_source_is_empty_and_uncached() {
        let converter = Arc::new(CountingConverter::default());
        let pipeline = pipeline(converter.clone());

        assert_eq!(pipeline.render("  \n\t").await, DiagramOutcome::Empty);
        assert_eq!(converter.calls.load(Ordering::SeqCst), 0);
        assert!(pipeline.cache().is_empty());
    }

    #[tokio::test]
    async fn converted_svg_is_encoded_and_cached() {
        let converter = Arc::new(CountingConverter::default());
        let pipeline = pipeline(converter.clone());
        let source = "graph TD;A-->B";

        let DiagramOutcome::Ready(artifact) = pipeline.render(source).await else {
            panic!("expected ready artifact");
        };
        assert_eq!(artifact.content_hash, content_hash(source));
        assert_eq!(artifact.source_text, source);
        assert_eq!(artifact.rendered_image, svg_data_uri("<svg>14</svg>"));
        assert!(artifact.rendered_image.starts_with(SVG_DATA_URI_PREFIX));

        let ids = converter.ids.lock().expect("ids lock").clone();
        assert_eq!(ids, vec![format!("{DIAGRAM_ID_PREFIX}{}", &artifact.content_hash[..16])]);

        let again = pipeline.render(source).await;
        assert_eq!(again, DiagramOutcome::Ready(artifact));
        assert_eq!(converter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_renders_share_one_conversion() {
        let converter = Arc::new(CountingConverter::default());
        let pipeline = pipeline(converter.clone());

        let (first, second, third) = tokio::join!(
            pipeline.render("graph LR;X-->Y"),
            pipeline.render("graph LR;X-->Y"),
            pipeline.render("graph LR;X-->Y"),
        );

        assert_eq!(converter.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(first, DiagramOutcome::Ready(_)));
        assert_eq!(first, second);
        assert_eq!(second, third);
        assert_eq!(pipeline.cache().len(), 1);
    }

    #[tokio::test]
    async fn conversion_failure_degrades_to_unavailable() {
        let pipeline = pipeline(Arc::new(FailingConverter));
        assert_eq!(
            pipeline.render("graph TD;A-->").await,
            DiagramOutcome::Unavailable
        );
        assert!(pipeline.cache().is_empty());
    }

    #[tokio::test]
    async fn converter_panic_degrades_to_unavailable() {
        let pipeline = pipeline(Arc::new(PanickingConverter));
        assert_eq!(
            pipeline.render("graph TD;A-->B").await,
            DiagramOutcome::Unavailable
        );
    }

    #[test]
    fn diagram_id_uses_hash_prefix() {
        let hash = content_hash("graph TD;A-->B");
        assert_eq!(diagram_id(&hash), format!("folio-diagram-{}", &hash[..16]));
        assert_eq!(diagram_id("abc"), "folio-diagram-abc");
    }

    #[cfg(unix)]
    mod cli {
        use std::{fs, os::unix::fs::PermissionsExt, path::Path};

        use tempfile::TempDir;

        use super::*;

        fn make_executable(path: &Path) {
            let mut perms = fs::metadata(path).expect("metadata").permissions();
            perms.set_mode(0o755);
            fs::set_permissions(path, perms).expect("set perms");
        }

        fn write_script(dir: &TempDir, body: &str) -> PathBuf {
            let script_path = dir.path().join("fake-mmdc");
            fs::write(&script_path, body).expect("write script");
            make_executable(&script_path);
            script_path
        }

        #[tokio::test]
        async fn renders_svg_with_valid_cli() {
            let dir = TempDir::new().expect("temp dir");
            let args_path = dir.path().join("args.log");
            let script = format!(
                r#"#!/bin/sh
set -eu
echo "$@" > "{args_file}"
out=""
while [ "$#" -gt 0 ]; do
  case "$1" in
    --output)
      shift
      out="$1"
      ;;
    *)
      ;;
  esac
  shift
done
if [ -z "$out" ]; then
  echo "missing --output" >&2
  exit 2
fi
cat <<'SVG' > "$out"
<svg>ok</svg>
SVG
"#,
                args_file = args_path.display()
            );
            let script_path = write_script(&dir, &script);

            let converter = MermaidCliConverter::new(script_path, Duration::from_secs(10));
            let svg = converter
                .convert("flowchart LR\n  A --> B", "folio-diagram-0123456789abcdef")
                .await
                .expect("svg rendered");
            assert!(svg.contains("<svg>ok</svg>"), "unexpected svg output: {svg}");

            let args = fs::read_to_string(&args_path).expect("read args");
            assert!(args.contains("--outputFormat svg"), "args: {args}");
            assert!(
                args.contains("--svgId folio-diagram-0123456789abcdef"),
                "args: {args}"
            );
        }

        #[tokio::test]
        async fn surfaces_cli_errors() {
            let dir = TempDir::new().expect("temp dir");
            let script_path = write_script(
                &dir,
                r#"#!/bin/sh
echo "boom" >&2
exit 42
"#,
            );

            let converter = MermaidCliConverter::new(script_path, Duration::from_secs(10));
            let err = converter
                .convert("flowchart LR\n  A --> B", "folio-diagram-x")
                .await
                .expect_err("expected cli failure");
            match err {
                DiagramError::Cli { exit_code, stderr } => {
                    assert_eq!(exit_code, Some(42));
                    assert!(stderr.contains("boom"), "stderr did not propagate: {stderr}");
                }
                other => panic!("unexpected error variant: {other:?}"),
            }
        }

        #[tokio::test]
        async fn slow_cli_times_out() {
            let dir = TempDir::new().expect("temp dir");
            let script_path = write_script(&dir, "#!/bin/sh\nsleep 5\n");

            let converter = MermaidCliConverter::new(script_path, Duration::from_millis(100));
            let err = converter
                .convert("graph TD;A-->B", "folio-diagram-x")
                .await
                .expect_err("expected timeout");
            assert!(matches!(err, DiagramError::Timeout { .. }), "got {err:?}");
        }

        #[tokio::test]
        async fn missing_cli_is_not_found() {
            let converter = MermaidCliConverter::new(
                "/nonexistent/folio-test-mmdc",
                Duration::from_secs(1),
            );
            let err = converter
                .convert("graph TD;A-->B", "folio-diagram-x")
                .await
                .expect_err("expected spawn failure");
            assert!(matches!(err, DiagramError::NotFound(_)), "got {err:?}");
        }
    }
}
