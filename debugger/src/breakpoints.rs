//! Breakpoint verification against the cached source text.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dap_codec::types::BreakpointId;

/// Where a requested breakpoint actually lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Placement {
    pub(crate) line: usize,
    pub(crate) verified: bool,
}

/// Decide the placement for a breakpoint requested at the 1-indexed
/// `requested` line. Pure function of the source text, so re-requesting the
/// same line always yields the same placement.
///
/// Empty lines and continuation markers push the breakpoint to the adjacent
/// statement: an empty or `+`-prefixed line moves it one line down, a
/// `-`-prefixed line one line up. Lines mentioning `lazy` are deferred by
/// the debugger and stay unverified. Out-of-bounds requests are accepted
/// unverified without adjustment.
pub(crate) fn place(lines: &[String], requested: usize) -> Placement {
    if requested == 0 || requested > lines.len() {
        return Placement {
            line: requested,
            verified: false,
        };
    }

    let text = lines[requested - 1].trim();
    let line = if text.is_empty() || text.starts_with('+') {
        requested + 1
    } else if text.starts_with('-') {
        requested - 1
    } else {
        requested
    };

    let verified = match line.checked_sub(1).and_then(|index| lines.get(index)) {
        Some(text) => !text.trim().contains("lazy"),
        None => true,
    };

    Placement { line, verified }
}

/// A breakpoint accepted by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Breakpoint {
    pub(crate) id: BreakpointId,
    pub(crate) line: usize,
    pub(crate) verified: bool,
}

/// Accepted breakpoints keyed by source path.
///
/// A set request replaces the whole collection for its path; identifiers
/// keep increasing across replacements.
pub(crate) struct BreakpointTable {
    by_path: HashMap<PathBuf, Vec<Breakpoint>>,
    current_id: BreakpointId,
}

impl BreakpointTable {
    pub(crate) fn new() -> Self {
        Self {
            by_path: HashMap::new(),
            current_id: 0,
        }
    }

    pub(crate) fn replace(&mut self, path: &Path, placements: &[Placement]) -> Vec<Breakpoint> {
        let mut entries = Vec::with_capacity(placements.len());
        for placement in placements {
            entries.push(Breakpoint {
                id: self.next_id(),
                line: placement.line,
                verified: placement.verified,
            });
        }
        self.by_path.insert(path.to_path_buf(), entries.clone());
        entries
    }

    #[allow(dead_code)]
    pub(crate) fn for_path(&self, path: &Path) -> &[Breakpoint] {
        self.by_path.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    fn next_id(&mut self) -> BreakpointId {
        self.current_id += 1;
        self.current_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn placement_follows_adjustment_rules() {
        let source = lines(&["a", "", "+b", "-c", "lazy_var = 1"]);

        let expected = [(2, 3, true), (3, 4, true), (4, 3, true), (5, 5, false)];
        for (requested, line, verified) in expected {
            let placement = place(&source, requested);
            assert_eq!(placement.line, line, "requested line {requested}");
            assert_eq!(placement.verified, verified, "requested line {requested}");
        }
    }

    #[test]
    fn placement_is_idempotent_under_re_request() {
        let source = lines(&["a", "", "+b", "-c", "lazy_var = 1"]);

        for requested in 1..=6 {
            assert_eq!(place(&source, requested), place(&source, requested));
        }
    }

    #[test]
    fn out_of_bounds_requests_are_accepted_unverified() {
        let source = lines(&["a"]);

        assert_eq!(
            place(&source, 12),
            Placement {
                line: 12,
                verified: false,
            }
        );
        assert_eq!(
            place(&source, 0),
            Placement {
                line: 0,
                verified: false,
            }
        );
    }

    #[test]
    fn replacing_a_set_does_not_touch_other_paths() {
        let mut table = BreakpointTable::new();
        let one = Path::new("/src/one.rb");
        let two = Path::new("/src/two.rb");

        table.replace(
            one,
            &[Placement {
                line: 1,
                verified: true,
            }],
        );
        table.replace(
            two,
            &[Placement {
                line: 8,
                verified: true,
            }],
        );

        table.replace(one, &[]);

        assert!(table.for_path(one).is_empty());
        assert_eq!(table.for_path(two).len(), 1);
        assert_eq!(table.for_path(two)[0].line, 8);
    }

    #[test]
    fn identifiers_keep_increasing_across_replacements() {
        let mut table = BreakpointTable::new();
        let path = Path::new("/src/user.rb");
        let placement = Placement {
            line: 3,
            verified: true,
        };

        let first = table.replace(path, &[placement, placement]);
        let second = table.replace(path, &[placement]);

        assert_eq!(first[0].id, 1);
        assert_eq!(first[1].id, 2);
        assert_eq!(second[0].id, 3);
    }
}
