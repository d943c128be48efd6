// crates/core/src/converter.rs
//! Calibre `ebook-convert` detection and invocation.
//!
//! Detection probes a fixed list of install locations with `--version` and a
//! short timeout. The result is cached for a few minutes because probing
//! spawns processes; callers that need an exact answer (right before
//! accepting an upload) bypass the cache.

use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, RwLock};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::{Stream, StreamExt};

use crate::error::ConvertError;

/// Timeout for each `--version` probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a probe result stays valid.
pub const CACHE_TTL: Duration = Duration::from_secs(300);

/// A program plus the arguments that always precede the conversion
/// arguments, e.g. `xvfb-run -a ebook-convert` on a headless host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: PathBuf,
    leading_args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.leading_args.push(arg.into());
        self
    }

    /// Split a whitespace-separated command line. Returns `None` when blank.
    pub fn parse(spec: &str) -> Option<Self> {
        let mut parts = spec.split_whitespace();
        let program = parts.next()?;
        Some(Self {
            program: PathBuf::from(program),
            leading_args: parts.map(str::to_string).collect(),
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args);
        cmd
    }

    /// Run with `--version`; true when it exits 0 within [`PROBE_TIMEOUT`].
    async fn probe(&self) -> bool {
        let mut cmd = self.command();
        cmd.arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(PROBE_TIMEOUT, cmd.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                tracing::debug!(tool = %self, error = %e, "tool probe failed to start");
                false
            }
            Err(_) => {
                tracing::debug!(tool = %self, "tool probe timed out");
                false
            }
        }
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.leading_args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Standard install locations, most likely first.
pub fn default_candidates() -> Vec<ToolCommand> {
    let mut candidates = vec![
        ToolCommand::new("ebook-convert"),
        ToolCommand::new("/Applications/calibre.app/Contents/MacOS/ebook-convert"),
        ToolCommand::new("/Applications/Calibre.app/Contents/MacOS/ebook-convert"),
    ];
    if let Some(home) = dirs::home_dir() {
        candidates.push(ToolCommand::new(
            home.join("Applications/calibre.app/Contents/MacOS/ebook-convert"),
        ));
    }
    candidates
}

#[derive(Debug, Clone)]
struct CachedProbe {
    resolved: Option<ToolCommand>,
    checked_at: Instant,
}

/// Finds the conversion tool and remembers where it is.
pub struct ToolLocator {
    candidates: Vec<ToolCommand>,
    ttl: Duration,
    cache: RwLock<Option<CachedProbe>>,
    /// Serializes probe runs; cache readers never wait on it.
    probing: Mutex<()>,
}

impl Default for ToolLocator {
    fn default() -> Self {
        Self::new(default_candidates())
    }
}

impl ToolLocator {
    pub fn new(candidates: Vec<ToolCommand>) -> Self {
        Self {
            candidates,
            ttl: CACHE_TTL,
            cache: RwLock::new(None),
            probing: Mutex::new(()),
        }
    }

    /// Probe `preferred` before the standard locations.
    pub fn with_preferred(preferred: ToolCommand) -> Self {
        let mut candidates = vec![preferred];
        candidates.extend(default_candidates());
        Self::new(candidates)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Probe every candidate in order, uncached.
    pub async fn locate(&self) -> Option<ToolCommand> {
        for candidate in &self.candidates {
            if candidate.probe().await {
                return Some(candidate.clone());
            }
        }
        None
    }

    /// Whether the tool is installed. With `use_cache`, a probe younger than
    /// the TTL is reused.
    pub async fn is_available(&self, use_cache: bool) -> bool {
        self.resolve(use_cache).await.is_some()
    }

    /// The resolved tool, probing only when the cache is empty or stale.
    pub async fn resolved(&self) -> Option<ToolCommand> {
        self.resolve(true).await
    }

    /// Drop the cached probe so the next lookup re-probes.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    async fn cached(&self) -> Option<Option<ToolCommand>> {
        self.cache
            .read()
            .await
            .as_ref()
            .filter(|cached| cached.checked_at.elapsed() < self.ttl)
            .map(|cached| cached.resolved.clone())
    }

    async fn resolve(&self, use_cache: bool) -> Option<ToolCommand> {
        if use_cache {
            if let Some(resolved) = self.cached().await {
                return resolved;
            }
        }

        let _probing = self.probing.lock().await;
        // A caller that queued behind a probe reuses its result.
        if use_cache {
            if let Some(resolved) = self.cached().await {
                return resolved;
            }
        }

        let resolved = self.locate().await;
        match &resolved {
            Some(tool) => tracing::info!(tool = %tool, "conversion tool found"),
            None => tracing::warn!(
                candidates = self.candidates.len(),
                "conversion tool not found"
            ),
        }
        *self.cache.write().await = Some(CachedProbe {
            resolved: resolved.clone(),
            checked_at: Instant::now(),
        });
        resolved
    }
}

/// Formatting flags passed to `ebook-convert`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOptions {
    pub base_font_size: u32,
    pub pdf_default_font_size: u32,
    pub pdf_mono_font_size: u32,
    pub embed_font_family: String,
    pub pdf_standard_font: String,
    /// Page margin in points, applied to all four sides.
    pub margin_pt: u32,
    pub page_numbers: bool,
    pub mark_links: bool,
    pub preserve_cover_aspect_ratio: bool,
    pub keep_ligatures: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            base_font_size: 12,
            pdf_default_font_size: 12,
            pdf_mono_font_size: 12,
            embed_font_family: "Times New Roman".to_string(),
            pdf_standard_font: "serif".to_string(),
            margin_pt: 72,
            page_numbers: true,
            mark_links: true,
            preserve_cover_aspect_ratio: true,
            keep_ligatures: true,
        }
    }
}

impl ConversionOptions {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--base-font-size".to_string(),
            self.base_font_size.to_string(),
        ];
        if self.page_numbers {
            args.push("--pdf-page-numbers".to_string());
        }
        if self.mark_links {
            args.push("--pdf-mark-links".to_string());
        }
        args.extend([
            "--embed-font-family".to_string(),
            self.embed_font_family.clone(),
            "--pdf-default-font-size".to_string(),
            self.pdf_default_font_size.to_string(),
            "--pdf-mono-font-size".to_string(),
            self.pdf_mono_font_size.to_string(),
            "--pdf-standard-font".to_string(),
            self.pdf_standard_font.clone(),
        ]);
        if self.preserve_cover_aspect_ratio {
            args.push("--preserve-cover-aspect-ratio".to_string());
        }
        if self.keep_ligatures {
            args.push("--keep-ligatures".to_string());
        }
        for side in ["left", "right", "top", "bottom"] {
            args.push(format!("--pdf-page-margin-{side}"));
            args.push(self.margin_pt.to_string());
        }
        args
    }
}

type LineStream = Pin<Box<dyn Stream<Item = std::io::Result<String>> + Send>>;

/// A running conversion with stdout and stderr merged into one line stream.
pub struct ConversionProcess {
    child: Child,
    lines: LineStream,
}

impl ConversionProcess {
    /// Next output line from either stream; `None` once both are closed.
    pub async fn next_line(&mut self) -> Option<std::io::Result<String>> {
        self.lines.next().await
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Kill the process and everything it started, then reap it.
    ///
    /// A wrapper such as `xvfb-run` runs the real converter as a grandchild,
    /// so the whole process group is signalled before the direct child.
    pub async fn kill(&mut self) -> std::io::Result<()> {
        #[cfg(unix)]
        self.kill_group();
        self.child.kill().await
    }

    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// SIGKILL the process group led by the child. No-op once the child
    /// has been reaped, so a recycled pid is never signalled.
    #[cfg(unix)]
    fn kill_group(&self) {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id().and_then(|id| i32::try_from(id).ok()) else {
            return;
        };
        match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => tracing::warn!(pid, error = %e, "failed to kill conversion process group"),
        }
    }
}

#[cfg(unix)]
impl Drop for ConversionProcess {
    fn drop(&mut self) {
        // `kill_on_drop` reaches only the direct child.
        self.kill_group();
    }
}

/// Start `tool input output <options>`.
pub fn invoke(
    tool: &ToolCommand,
    input: &Path,
    output: &Path,
    options: &ConversionOptions,
) -> Result<ConversionProcess, ConvertError> {
    let mut cmd = tool.command();
    cmd.arg(input)
        .arg(output)
        .args(options.to_args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group, so a timeout can take down helpers the tool spawns.
    #[cfg(unix)]
    cmd.process_group(0);

    tracing::info!(
        tool = %tool,
        input = %input.display(),
        output = %output.display(),
        "spawning conversion"
    );
    let mut child = cmd.spawn().map_err(ConvertError::Spawn)?;

    let stdout = child.stdout.take().ok_or_else(|| {
        ConvertError::Spawn(std::io::Error::other("stdout was not captured"))
    })?;
    let stderr = child.stderr.take().ok_or_else(|| {
        ConvertError::Spawn(std::io::Error::other("stderr was not captured"))
    })?;

    let lines = LinesStream::new(BufReader::new(stdout).lines())
        .merge(LinesStream::new(BufReader::new(stderr).lines()));

    Ok(ConversionProcess {
        child,
        lines: Box::pin(lines),
    })
}
