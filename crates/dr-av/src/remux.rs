//! Raw capture to Matroska remuxing using mkvmerge or ffmpeg.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use dr_core::{Error, LogSink};

use crate::command::ToolCommand;
use crate::tools::{Tool, ToolRegistry};
use crate::workspace::file_size;

/// mkvmerge exit code for "finished, but with warnings".
const MKVMERGE_WARNINGS: i32 = 1;

/// Converts a raw capture into the final container.
#[derive(Debug, Clone)]
pub struct RemuxController {
    tools: Arc<ToolRegistry>,
}

impl RemuxController {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    /// Remux `raw` into `output`.
    ///
    /// Prefers `mkvmerge` (lossless, fast on well-formed streams). Any
    /// failure there, including an empty result, falls back to `ffmpeg` with
    /// explicit stream maps and timestamp correction.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `cancel` fires.
    /// - [`Error::Remux`] if the fallback fails. Whatever it left at
    ///   `output` is not removed.
    pub async fn remux(
        &self,
        raw: &Path,
        output: &Path,
        log: &LogSink,
        cancel: &CancellationToken,
    ) -> dr_core::Result<()> {
        let result = self.run(raw, output, log, cancel).await;
        if let Err(e) = &result {
            if !e.is_cancelled() {
                log.error(e.to_string());
            }
        }
        result
    }

    async fn run(
        &self,
        raw: &Path,
        output: &Path,
        log: &LogSink,
        cancel: &CancellationToken,
    ) -> dr_core::Result<()> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Remux(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        log.info(format!("Remuxing {} -> {}", raw.display(), output.display()));

        match self.run_primary(raw, output, log, cancel).await {
            Ok(()) => {
                log.info("Remux complete (mkvmerge)");
                return Ok(());
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => log.error(format!("mkvmerge failed, falling back to ffmpeg: {e}")),
        }

        // A partial file left here is overwritten by ffmpeg (-y).
        if file_size(output).is_some() {
            if let Err(e) = tokio::fs::remove_file(output).await {
                log.error(format!("Could not remove partial {}: {e}", output.display()));
            }
        }

        self.run_secondary(raw, output, log, cancel).await?;
        log.info("Remux complete (ffmpeg)");
        Ok(())
    }

    async fn run_primary(
        &self,
        raw: &Path,
        output: &Path,
        log: &LogSink,
        cancel: &CancellationToken,
    ) -> dr_core::Result<()> {
        let mut cmd = self.tools.command(Tool::Mkvmerge)?;
        cmd.arg("-q").arg("-o").arg(output).arg(raw);
        log.debug(cmd.display());

        match cmd.execute(cancel).await {
            Ok(_) => {}
            Err(Error::ToolExit {
                code: Some(MKVMERGE_WARNINGS),
                stderr,
                ..
            }) if output_has_data(output) => {
                log.info(format!("mkvmerge finished with warnings: {stderr}"));
            }
            Err(e) => return Err(e),
        }

        if output_has_data(output) {
            Ok(())
        } else {
            Err(Error::Remux("mkvmerge produced no output".into()))
        }
    }

    async fn run_secondary(
        &self,
        raw: &Path,
        output: &Path,
        log: &LogSink,
        cancel: &CancellationToken,
    ) -> dr_core::Result<()> {
        let cmd = secondary_command(self.tools.command(Tool::Ffmpeg)?, raw, output);
        log.debug(cmd.display());

        cmd.execute(cancel).await.map_err(|e| match e {
            Error::Cancelled => e,
            other => Error::Remux(other.to_string()),
        })?;

        if output_has_data(output) {
            Ok(())
        } else {
            Err(Error::Remux("ffmpeg produced no output".into()))
        }
    }
}

fn secondary_command(mut cmd: ToolCommand, raw: &Path, output: &Path) -> ToolCommand {
    cmd.args(["-hide_banner", "-y", "-fflags", "+genpts", "-i"])
        .arg(raw)
        .args(["-map", "0:v:0", "-map", "0:a", "-map", "0:s?"])
        .args(["-c", "copy"])
        .args(["-avoid_negative_ts", "make_zero", "-muxdelay", "0", "-muxpreload", "0"])
        .arg(output);
    cmd
}

fn output_has_data(path: &Path) -> bool {
    file_size(path).is_some_and(|len| len > 0)
}
