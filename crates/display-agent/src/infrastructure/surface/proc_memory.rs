//! Private memory of a browser window's content processes.
//!
//! A kiosk browser is many processes (browser, GPU, utilities, renderers),
//! all descendants of the one the agent launched.  Only the renderers hold
//! the page content, so only their private memory is compared against the
//! watchdog threshold; the browser and GPU processes are excluded.  Shared
//! pages are excluded too, so the same library mapped into ten renderers is
//! not counted ten times.
//!
//! The process tree comes from `sysinfo`.  Private memory is read from
//! `/proc/<pid>/smaps_rollup`, which `sysinfo` does not expose.

use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

use crate::application::surface::{MemoryUsage, SurfaceError};

/// Command-line flag Chromium passes to its content renderer processes.
const RENDERER_FLAG: &str = "--type=renderer";

/// One row of the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessNode {
    pub pid: u32,
    pub parent: Option<u32>,
    /// The process renders page content.
    pub renderer: bool,
}

/// Returns `true` if a command line belongs to a content renderer.
pub fn is_renderer<S: AsRef<OsStr>>(cmd: &[S]) -> bool {
    cmd.iter()
        .any(|arg| arg.as_ref().to_str() == Some(RENDERER_FLAG))
}

/// Pids of every renderer descending from `root`.  `root` itself is never
/// included.
pub fn renderer_descendants(root: u32, table: &[ProcessNode]) -> Vec<u32> {
    let mut children: HashMap<u32, Vec<&ProcessNode>> = HashMap::new();
    for node in table {
        if let Some(parent) = node.parent {
            children.entry(parent).or_default().push(node);
        }
    }

    let mut renderers = Vec::new();
    let mut seen = HashSet::from([root]);
    let mut stack: Vec<&ProcessNode> = children.get(&root).cloned().unwrap_or_default();
    while let Some(node) = stack.pop() {
        if !seen.insert(node.pid) {
            continue;
        }
        if node.renderer {
            renderers.push(node.pid);
        }
        if let Some(grandchildren) = children.get(&node.pid) {
            stack.extend(grandchildren);
        }
    }
    renderers.sort_unstable();
    renderers
}

/// Sums the `Private_Clean` and `Private_Dirty` lines of an `smaps_rollup`
/// (or `smaps`) file, in kB.
pub fn parse_private_kb(smaps: &str) -> u64 {
    smaps
        .lines()
        .filter(|line| line.starts_with("Private_Clean:") || line.starts_with("Private_Dirty:"))
        .filter_map(|line| line.split_whitespace().nth(1)?.parse::<u64>().ok())
        .sum()
}

/// Private memory of the renderers under the browser process `root`.
///
/// Runs the process scan on the blocking thread pool.  A window whose
/// renderers have not started yet reports zero.
///
/// # Errors
///
/// Returns [`SurfaceError::MemoryQuery`] if `root` no longer exists, or
/// [`SurfaceError::Unsupported`] on platforms without `/proc`.
pub async fn content_usage(root: u32) -> Result<MemoryUsage, SurfaceError> {
    tokio::task::spawn_blocking(move || content_private_kb(root))
        .await
        .map_err(|e| SurfaceError::MemoryQuery(format!("memory scan panicked: {e}")))?
        .map(MemoryUsage::from_kb)
}

fn content_private_kb(root: u32) -> Result<u64, SurfaceError> {
    if !cfg!(target_os = "linux") {
        return Err(SurfaceError::Unsupported("process memory sampling"));
    }

    let table = process_table();
    if !table.iter().any(|node| node.pid == root) {
        return Err(SurfaceError::MemoryQuery(format!("process {root} not found")));
    }

    Ok(renderer_descendants(root, &table)
        .into_iter()
        // Renderers exit during the scan; a missing file counts as zero.
        .filter_map(|pid| std::fs::read_to_string(format!("/proc/{pid}/smaps_rollup")).ok())
        .map(|smaps| parse_private_kb(&smaps))
        .sum())
}

fn process_table() -> Vec<ProcessNode> {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
    );
    system
        .processes()
        .values()
        .map(|process| ProcessNode {
            pid: process.pid().as_u32(),
            parent: process.parent().map(|parent| parent.as_u32()),
            renderer: is_renderer(process.cmd()),
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn node(pid: u32, parent: u32, renderer: bool) -> ProcessNode {
        ProcessNode {
            pid,
            parent: Some(parent),
            renderer,
        }
    }

    #[test]
    fn test_only_renderers_under_root_are_counted() {
        // Arrange: browser 100 -> gpu 101, zygote 102 -> renderers 103, 104;
        // an unrelated renderer 200 belongs to another window.
        let table = vec![
            ProcessNode {
                pid: 100,
                parent: Some(1),
                renderer: false,
            },
            node(101, 100, false),
            node(102, 100, false),
            node(103, 102, true),
            node(104, 102, true),
            node(200, 1, true),
        ];

        // Act
        let renderers = renderer_descendants(100, &table);

        // Assert
        assert_eq!(renderers, vec![103, 104]);
    }

    #[test]
    fn test_root_is_never_counted_even_if_flagged() {
        let table = vec![
            ProcessNode {
                pid: 100,
                parent: None,
                renderer: true,
            },
            node(101, 100, false),
        ];

        assert!(renderer_descendants(100, &table).is_empty());
    }

    #[test]
    fn test_is_renderer_matches_exact_type_flag() {
        assert!(is_renderer(&["chromium", "--type=renderer", "--lang=en-US"]));
        assert!(!is_renderer(&["chromium", "--type=gpu-process"]));
        assert!(!is_renderer(&["chromium", "--kiosk", "about:blank"]));
    }

    #[test]
    fn test_parse_private_kb_sums_clean_and_dirty() {
        let smaps = "\
00400000-7ffd [rollup]
Rss:              250000 kB
Pss:              120000 kB
Shared_Clean:      40000 kB
Private_Clean:     10000 kB
Private_Dirty:     90000 kB
Swap:                  0 kB
";
        assert_eq!(parse_private_kb(smaps), 100_000);
    }

    #[test]
    fn test_parse_private_kb_of_empty_input_is_zero() {
        assert_eq!(parse_private_kb(""), 0);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_process_without_renderers_reports_zero() {
        let usage = content_usage(std::process::id()).await.expect("usage");
        assert_eq!(usage.private_kb, 0);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_missing_process_is_a_query_error() {
        let err = content_usage(u32::MAX - 1).await.unwrap_err();
        assert!(matches!(err, SurfaceError::MemoryQuery(_)));
    }
}
