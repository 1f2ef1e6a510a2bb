//! Detection adapter backed by an external embedding command.
//!
//! The command receives the raw image on stdin and prints the detected face
//! embeddings as JSON on stdout (see [`rollcall_core::detector::parse_detections`]).

use async_trait::async_trait;
use rollcall_core::{parse_detections, Detection, DetectionAdapter, DetectionError};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub struct CommandDetector {
    program: String,
    args: Vec<String>,
}

impl CommandDetector {
    /// Build from a command line split into program and arguments.
    /// Returns `None` for an empty command line.
    pub fn from_command_line(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

fn failed(context: &str, e: impl std::fmt::Display) -> DetectionError {
    DetectionError::Failed(format!("{context}: {e}"))
}

#[async_trait]
impl DetectionAdapter for CommandDetector {
    async fn detect(&self, image: &[u8]) -> Result<Vec<Detection>, DetectionError> {
        let format = image::guess_format(image).map_err(|e| failed("unrecognized image", e))?;
        tracing::debug!(program = %self.program, ?format, bytes = image.len(), "running detector");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| failed(&format!("failed to start '{}'", self.program), e))?;

        // Feed stdin while stdout and stderr are drained, so neither side can
        // block on a full pipe.
        let stdin = child.stdin.take();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(image).await {
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    tracing::debug!("detector closed stdin before reading the whole image");
                    Ok(())
                }
                other => other,
            }
            // stdin drops here so the detector sees EOF
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());

        let output = output.map_err(|e| failed("detector did not finish", e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DetectionError::Failed(format!(
                "detector exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        fed.map_err(|e| failed("failed to send image to detector", e))?;

        let detections = parse_detections(&output.stdout)?;
        tracing::debug!(faces = detections.len(), "detector finished");
        Ok(detections)
    }
}
