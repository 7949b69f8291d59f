//! Shared test harness for integration tests.
//!
//! Provides [`FakeTools`], a temp directory of executable shell scripts that
//! stand in for lsdvd, mpv, mplayer, mkvmerge, and ffmpeg. Each script
//! appends one line per invocation to `<name>.calls` so tests can count how
//! often a tool ran.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use discrip::Ripper;
use dr_av::{CaptureTimings, Tool, ToolRegistry};
use tempfile::TempDir;

/// lsdvd stand-in printing two titles out of order.
pub const LSDVD_TWO_TITLES: &str = r#"
cat <<'XML'
<?xml version="1.0" encoding="UTF-8"?>
<lsdvd>
  <device>/dev/sr0</device>
  <track><ix>2</ix><length>95.600</length></track>
  <track><ix>1</ix><length>5422.480</length></track>
</lsdvd>
XML
"#;

/// lsdvd stand-in that cannot read the disc.
pub const LSDVD_FAILS: &str = "echo 'libdvdread: Could not open /dev/sr0' >&2\nexit 1";

/// mplayer stand-in for both identify and dump modes.
///
/// Identify reports 120.4s for titles 1 and 3, 0.2s for title 5, and
/// fails for everything else. Dump writes a small program stream to the
/// `-dumpfile` target.
pub const MPLAYER: &str = r#"
prev=""
out=""
title=""
identify=0
for a in "$@"; do
  [ "$prev" = "-dumpfile" ] && out="$a"
  [ "$a" = "-identify" ] && identify=1
  case "$a" in dvd://*) title="${a#dvd://}";; esac
  prev="$a"
done
if [ $identify -eq 1 ]; then
  case "$title" in
    1|3) echo "ID_LENGTH=120.40" ;;
    5) echo "ID_LENGTH=0.20" ;;
    *) echo "Failed to open title $title" >&2; exit 1 ;;
  esac
  exit 0
fi
printf 'MPEG-PS dump' > "$out"
"#;

/// mpv stand-in that records a few bytes with progress lines.
pub const MPV_OK: &str = r#"
for a in "$@"; do case "$a" in --stream-record=*) out="${a#--stream-record=}";; esac; done
printf 'PROGRESS 10%%\r' >&2
printf 'MPEG-PS record' > "$out"
printf 'PROGRESS 97%%\r' >&2
"#;

/// mpv stand-in that prints one progress line and then hangs.
///
/// Writes its pid to `mpv.pid` and appends to `mpv.overlap` when the pid
/// recorded by a previous run is still alive.
pub const MPV_HANGS: &str = r#"
pid_file="$(dirname "$0")/mpv.pid"
if [ -f "$pid_file" ] && kill -0 "$(cat "$pid_file")" 2>/dev/null; then
  echo "$$" >> "$(dirname "$0")/mpv.overlap"
fi
echo "$$" > "$pid_file"
printf 'PROGRESS 1%%\r' >&2
exec sleep 30
"#;

/// mkvmerge stand-in writing to the `-o` target.
pub const MKVMERGE_OK: &str = r#"
prev=""
for a in "$@"; do
  [ "$prev" = "-o" ] && out="$a"
  prev="$a"
done
printf 'MKV' > "$out"
"#;

/// ffmpeg stand-in writing to its last argument.
pub const FFMPEG_OK: &str = r#"
for a in "$@"; do out="$a"; done
printf 'FFMKV' > "$out"
"#;

pub const FAILS: &str = "echo 'simulated failure' >&2\nexit 1";

/// Short capture timings so stall tests finish quickly.
pub const FAST_TIMINGS: CaptureTimings = CaptureTimings {
    poll_interval: std::time::Duration::from_millis(50),
    stall_threshold: std::time::Duration::from_millis(400),
    exit_grace: std::time::Duration::from_millis(10),
};

/// A directory of fake tool scripts.
pub struct FakeTools {
    pub dir: TempDir,
    paths: Vec<(Tool, PathBuf)>,
}

impl FakeTools {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create temp dir"),
            paths: Vec::new(),
        }
    }

    /// Install a script for `tool` with the given shell body.
    pub fn with(mut self, tool: Tool, body: &str) -> Self {
        let path = self.dir.path().join(tool.name());
        let script = format!(
            "#!/bin/sh\necho \"$@\" >> \"$(dirname \"$0\")/{}.calls\"\n{body}\n",
            tool.name()
        );
        std::fs::write(&path, script).expect("failed to write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("failed to chmod script");
        self.paths.push((tool, path));
        self
    }

    /// Number of times `tool` was invoked.
    pub fn calls(&self, tool: Tool) -> usize {
        std::fs::read_to_string(self.dir.path().join(format!("{}.calls", tool.name())))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    pub fn path(&self, tool: Tool) -> Option<&Path> {
        self.paths
            .iter()
            .find(|(t, _)| *t == tool)
            .map(|(_, p)| p.as_path())
    }

    /// Pid last recorded by a script via `<name>.pid`.
    pub fn pid(&self, tool: Tool) -> Option<u32> {
        std::fs::read_to_string(self.dir.path().join(format!("{}.pid", tool.name())))
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    /// Whether a script ever started while a previous instance was alive.
    pub fn overlapped(&self, tool: Tool) -> bool {
        self.dir.path().join(format!("{}.overlap", tool.name())).exists()
    }

    pub fn registry(&self) -> Arc<ToolRegistry> {
        Arc::new(ToolRegistry::with_paths(self.paths.clone()))
    }

    /// A ripper over these tools with raw files under `temp_dir`.
    pub fn ripper(&self, temp_dir: &Path) -> Ripper {
        Ripper::new(self.registry(), temp_dir.to_path_buf()).with_capture_timings(FAST_TIMINGS)
    }
}

/// Files currently in `dir`.
pub fn entries(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|rd| rd.filter_map(|e| e.ok().map(|e| e.path())).collect())
        .unwrap_or_default()
}

/// Whether `pid` names a live (or unreaped) process.
pub fn process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
