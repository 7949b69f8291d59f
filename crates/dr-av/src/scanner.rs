//! Title discovery: structured lsdvd probe with a per-title identify fallback.
//!
//! The structured probe is one fast invocation but fails outright on some
//! media and drives. Only when it yields nothing does the scanner pay for the
//! fallback, which launches the identify probe once per candidate index.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use dr_core::{Error, LogSink, Title};

use crate::command::ToolCommand;
use crate::tools::{Tool, ToolRegistry};

/// Highest title index tried by the identify fallback (inclusive, from 1).
pub const FALLBACK_TITLE_LIMIT: u32 = 50;

/// Duration marker emitted by the identify probe.
const LENGTH_MARKER: &str = "ID_LENGTH=";

/// Discovers the titles on a disc.
#[derive(Debug, Clone)]
pub struct TitleScanner {
    tools: Arc<ToolRegistry>,
}

impl TitleScanner {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    /// Scan `device` and return its titles sorted ascending by number.
    ///
    /// Probe failures are logged and never escalate: an empty list is a
    /// valid outcome. Duplicate numbers from malformed probe output are kept
    /// as reported.
    ///
    /// # Errors
    ///
    /// Only [`Error::Cancelled`], logged at error level before it is
    /// returned.
    pub async fn scan(
        &self,
        device: &str,
        log: &LogSink,
        cancel: &CancellationToken,
    ) -> dr_core::Result<Vec<Title>> {
        let result = self.run(device, log, cancel).await;
        if let Err(e) = &result {
            log.error(format!("Scan of {device} stopped: {e}"));
        }
        result
    }

    async fn run(
        &self,
        device: &str,
        log: &LogSink,
        cancel: &CancellationToken,
    ) -> dr_core::Result<Vec<Title>> {
        log.info(format!("Scanning titles on {device}"));

        let mut titles = match self.probe_structured(device, log, cancel).await {
            Ok(titles) => titles,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                log.error(format!("lsdvd probe failed: {e}"));
                Vec::new()
            }
        };

        if titles.is_empty() {
            log.info(format!(
                "Structured probe found no titles; identifying titles 1-{FALLBACK_TITLE_LIMIT} individually"
            ));
            titles = self.probe_fallback(device, log, cancel).await?;
        }

        titles.sort_by_key(|t| t.number);
        log.info(format!("Found {} title(s)", titles.len()));
        Ok(titles)
    }

    async fn probe_structured(
        &self,
        device: &str,
        log: &LogSink,
        cancel: &CancellationToken,
    ) -> dr_core::Result<Vec<Title>> {
        let cmd = lsdvd_command(self.tools.command(Tool::Lsdvd)?, device);
        log.debug(cmd.display());

        let output = cmd.execute(cancel).await?;
        parse_lsdvd_xml(&output.stdout)
    }

    async fn probe_fallback(
        &self,
        device: &str,
        log: &LogSink,
        cancel: &CancellationToken,
    ) -> dr_core::Result<Vec<Title>> {
        let mut titles = Vec::new();

        if let Err(e) = self.tools.require(Tool::Mplayer) {
            log.error(format!("Identify fallback unavailable: {e}"));
            return Ok(titles);
        }

        for number in 1..=FALLBACK_TITLE_LIMIT {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            match self.identify_title(device, number, log, cancel).await {
                Ok(Some(title)) => titles.push(title),
                Ok(None) => {}
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => log.error(format!("Identify of title {number} failed: {e}")),
            }
        }

        Ok(titles)
    }

    /// Identify one title index. `Ok(None)` when the probe reports no
    /// positive duration for it.
    async fn identify_title(
        &self,
        device: &str,
        number: u32,
        log: &LogSink,
        cancel: &CancellationToken,
    ) -> dr_core::Result<Option<Title>> {
        let cmd = identify_command(self.tools.command(Tool::Mplayer)?, device, number);
        log.debug(cmd.display());

        let mut length = None;
        cmd.execute_with_lines(
            |line| {
                if length.is_none() {
                    length = parse_identify_length(&line.text);
                }
            },
            cancel,
        )
        .await?;

        let title = length
            .map(|secs| Title::from_fractional_secs(number, secs))
            .filter(|t| t.duration_secs > 0);
        if let Some(title) = title {
            log.debug(format!("Title {number}: {}s", title.duration_secs));
        }
        Ok(title)
    }
}

fn lsdvd_command(mut cmd: ToolCommand, device: &str) -> ToolCommand {
    cmd.arg("-Ox").arg(device);
    cmd
}

fn identify_command(mut cmd: ToolCommand, device: &str, number: u32) -> ToolCommand {
    cmd.args(["-identify", "-frames", "0", "-quiet", "-ao", "null", "-vo", "null"])
        .arg("-dvd-device")
        .arg(device)
        .arg(format!("dvd://{number}"));
    cmd
}

/// Parse `lsdvd -Ox` output into titles, in document order.
///
/// Each `<track>` must carry an integer `<ix>` and a fractional-seconds
/// `<length>`; any malformed track fails the whole document. Text before the
/// first `<` (stray library chatter) is ignored.
pub fn parse_lsdvd_xml(xml: &str) -> dr_core::Result<Vec<Title>> {
    let start = xml
        .find('<')
        .ok_or_else(|| Error::Parse("lsdvd output contains no XML".into()))?;

    let doc = roxmltree::Document::parse(&xml[start..])
        .map_err(|e| Error::Parse(format!("lsdvd XML: {e}")))?;

    doc.descendants()
        .filter(|n| n.has_tag_name("track"))
        .map(|track| {
            let ix = child_text(&track, "ix")
                .and_then(|t| t.parse::<u32>().ok())
                .filter(|&ix| ix > 0)
                .ok_or_else(|| Error::Parse("track without a valid <ix>".into()))?;
            let length = child_text(&track, "length")
                .and_then(|t| t.parse::<f64>().ok())
                .ok_or_else(|| Error::Parse(format!("track {ix} without a valid <length>")))?;
            Ok(Title::from_fractional_secs(ix, length))
        })
        .collect()
}

fn child_text<'a>(node: &roxmltree::Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .and_then(|n| n.text())
        .map(str::trim)
}

/// Extract the seconds value from an `ID_LENGTH=<secs>` identify line.
pub fn parse_identify_length(line: &str) -> Option<f64> {
    line.trim()
        .strip_prefix(LENGTH_MARKER)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}
