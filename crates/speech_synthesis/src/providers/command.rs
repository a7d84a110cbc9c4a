//! Command-line model runner backend
//!
//! Drives an on-device synthesis runner (e.g. a `csm-mlx` wrapper script)
//! as a child process. Text is written to the runner's stdin and encoded
//! audio is read back from its stdout.
//!
//! # Runner contract
//!
//! ```text
//! <runner> --version                              # load-time probe, exit 0
//! <runner> --weights <path> --speaker <n>
//!          --max-audio-length-ms <ms> --temp <t>
//!          --top-k <k> [--stream]                 # text on stdin, audio on stdout
//! ```
//!
//! In `--stream` mode the runner is expected to flush audio segments to
//! stdout as soon as they are produced.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, error, instrument, trace};

use crate::config::LocalModelConfig;
use crate::error::SpeechError;
use crate::ports::AudioStream;
use crate::providers::local::{ModelLoader, SynthesisModel, SynthesisParams};

/// Size of each stdout read in streaming mode
const STREAM_READ_SIZE: usize = 16 * 1024;

/// Upper bound for the `--version` load probe
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Loads a [`CommandModel`] after checking the runner and weights exist
#[derive(Debug, Clone)]
pub struct CommandModelLoader {
    executable_path: PathBuf,
    weights_path: PathBuf,
    probe_timeout: Duration,
}

impl CommandModelLoader {
    #[must_use]
    pub fn new(config: &LocalModelConfig) -> Self {
        Self {
            executable_path: config.executable_path.clone(),
            weights_path: config.weights_path.clone(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Override how long the runner may take to answer `--version`
    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    async fn probe_runner(&self) -> Result<(), SpeechError> {
        let probe = Command::new(&self.executable_path)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        let status = tokio::time::timeout(self.probe_timeout, probe)
            .await
            .map_err(|_| {
                SpeechError::Initialization(format!(
                    "Model runner probe timed out after {}ms",
                    self.probe_timeout.as_millis()
                ))
            })?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SpeechError::Initialization(format!(
                        "Model runner not found at '{}'",
                        self.executable_path.display()
                    ))
                } else {
                    SpeechError::Initialization(format!("Failed to run model runner: {e}"))
                }
            })?;

        if !status.success() {
            return Err(SpeechError::Initialization(format!(
                "Model runner probe exited with {status}"
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl ModelLoader for CommandModelLoader {
    #[instrument(skip(self), fields(weights = %self.weights_path.display()))]
    async fn load(&self) -> Result<Arc<dyn SynthesisModel>, SpeechError> {
        let metadata = tokio::fs::metadata(&self.weights_path).await.map_err(|e| {
            SpeechError::Initialization(format!(
                "Cannot read model weights '{}': {e}",
                self.weights_path.display()
            ))
        })?;

        if !metadata.is_file() {
            return Err(SpeechError::Initialization(format!(
                "Model weights '{}' is not a file",
                self.weights_path.display()
            )));
        }

        self.probe_runner().await?;

        debug!(size_bytes = metadata.len(), "Model weights located");

        Ok(Arc::new(CommandModel {
            executable_path: self.executable_path.clone(),
            weights_path: self.weights_path.clone(),
        }))
    }
}

/// A model served by a runner process per request
#[derive(Debug, Clone)]
pub struct CommandModel {
    executable_path: PathBuf,
    weights_path: PathBuf,
}

impl CommandModel {
    fn executable(&self) -> &Path {
        &self.executable_path
    }

    fn command(&self, params: &SynthesisParams, streaming: bool) -> Command {
        let mut cmd = Command::new(self.executable());

        cmd.arg("--weights")
            .arg(&self.weights_path)
            .arg("--speaker")
            .arg(params.speaker.to_string())
            .arg("--max-audio-length-ms")
            .arg(params.max_audio_length_ms.to_string())
            .arg("--temp")
            .arg(params.sampler.temperature.to_string())
            .arg("--top-k")
            .arg(params.sampler.top_k.to_string());

        if streaming {
            cmd.arg("--stream");
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true);

        cmd
    }

    fn spawn(&self, mut cmd: Command) -> Result<Child, SpeechError> {
        debug!("Running model runner: {:?}", cmd);

        cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SpeechError::local(format!(
                    "Model runner not found at '{}'",
                    self.executable().display()
                ))
            } else {
                SpeechError::local(format!("Failed to start model runner: {e}"))
            }
        })
    }

    fn take_stdin(child: &mut Child) -> Result<ChildStdin, SpeechError> {
        child
            .stdin
            .take()
            .ok_or_else(|| SpeechError::local("Model runner stdin unavailable"))
    }
}

/// Write the whole input and close stdin so the runner sees EOF
async fn feed_stdin(mut stdin: ChildStdin, input: &[u8]) -> std::io::Result<()> {
    stdin.write_all(input).await?;
    stdin.flush().await
}

#[async_trait]
impl SynthesisModel for CommandModel {
    #[instrument(skip(self, text, params), fields(text_len = text.len()))]
    async fn generate(
        &self,
        text: &str,
        params: &SynthesisParams,
    ) -> Result<Vec<u8>, SpeechError> {
        let mut cmd = self.command(params, false);
        cmd.stderr(Stdio::piped());

        let mut child = self.spawn(cmd)?;
        let stdin = Self::take_stdin(&mut child)?;

        // Feed stdin while draining stdout so neither pipe can fill up
        let (written, output) =
            tokio::join!(feed_stdin(stdin, text.as_bytes()), child.wait_with_output());

        let output = output
            .map_err(|e| SpeechError::local(format!("Failed to wait for model runner: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("Model runner failed: {}", stderr.trim());
            return Err(SpeechError::local(format!(
                "Model runner exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        written.map_err(|e| {
            SpeechError::local(format!("Failed to write to model runner stdin: {e}"))
        })?;

        if output.stdout.is_empty() {
            return Err(SpeechError::local("Model runner produced empty output"));
        }

        Ok(output.stdout)
    }

    #[instrument(skip(self, text, params), fields(text_len = text.len()))]
    async fn generate_stream(
        &self,
        text: &str,
        params: &SynthesisParams,
    ) -> Result<AudioStream, SpeechError> {
        let mut cmd = self.command(params, true);
        // Nothing drains stderr while streaming
        cmd.stderr(Stdio::null());

        let mut child = self.spawn(cmd)?;
        let stdin = Self::take_stdin(&mut child)?;

        let input = text.as_bytes().to_vec();
        tokio::spawn(async move {
            if let Err(e) = feed_stdin(stdin, &input).await {
                debug!("Model runner stopped reading stdin: {e}");
            }
        });

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SpeechError::local("Model runner stdout unavailable"))?;

        Ok(Box::pin(runner_output_stream(child, stdout)))
    }
}

struct RunnerOutput {
    child: Child,
    stdout: ChildStdout,
}

/// Forward runner stdout in read order, ending with an error if the runner
/// exits unsuccessfully
fn runner_output_stream(
    child: Child,
    stdout: ChildStdout,
) -> impl futures::Stream<Item = Result<Bytes, SpeechError>> + Send {
    stream::unfold(Some(RunnerOutput { child, stdout }), |state| async move {
        let mut output = state?;
        let mut buf = vec![0u8; STREAM_READ_SIZE];

        match output.stdout.read(&mut buf).await {
            Ok(0) => match output.child.wait().await {
                Ok(status) if status.success() => None,
                Ok(status) => Some((
                    Err(SpeechError::local(format!(
                        "Model runner exited with {status} mid-stream"
                    ))),
                    None,
                )),
                Err(e) => Some((
                    Err(SpeechError::local(format!(
                        "Failed to wait for model runner: {e}"
                    ))),
                    None,
                )),
            },
            Ok(n) => {
                buf.truncate(n);
                trace!(chunk_size = n, "Model runner produced audio");
                Some((Ok(Bytes::from(buf)), Some(output)))
            },
            Err(e) => Some((
                Err(SpeechError::local(format!(
                    "Failed to read model runner output: {e}"
                ))),
                None,
            )),
        }
    })
}
