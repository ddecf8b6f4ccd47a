use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::error::{Result, ScanError};

const MIN_PORT: u64 = 1;
const MAX_PORT: u64 = 65535;

/// Resolve a port specification into an ascending, duplicate-free port list.
///
/// Supported tokens, separated by commas:
/// - single port: `80` (dropped silently when outside 1..=65535)
/// - inclusive range: `8000-8010` (reversed bounds are swapped, bounds clamped to 1..=65535)
///
/// Any non-numeric part rejects the whole specification. An empty result is not an
/// error here; the orchestrator refuses to scan it.
pub fn parse_port_spec(spec: &str) -> Result<Vec<u16>> {
    let mut set = BTreeSet::new();

    for raw in spec.split(',') {
        let token = raw.trim_matches(|c| c == ' ' || c == '\t');

        if let Some((a, b)) = token.split_once('-') {
            let mut lo = parse_number(a, token)?;
            let mut hi = parse_number(b, token)?;
            if lo > hi {
                std::mem::swap(&mut lo, &mut hi);
            }
            let lo = lo.max(MIN_PORT);
            let hi = hi.min(MAX_PORT);
            // Both bounds past the same edge leave nothing to scan.
            if lo <= hi {
                set.extend((lo as u16)..=(hi as u16));
            }
            continue;
        }

        let p = parse_number(token, token)?;
        if (MIN_PORT..=MAX_PORT).contains(&p) {
            set.insert(p as u16);
        }
    }

    Ok(set.into_iter().collect())
}

/// Load a port list file: one or more tokens per line, `#` starts a comment,
/// blank lines are ignored.
pub fn load_port_spec(path: impl AsRef<Path>) -> Result<Vec<u16>> {
    let content = fs::read_to_string(path.as_ref())?;
    parse_port_spec(&spec_from_lines(&content))
}

/// Fold a multi-line port list into a single comma-separated specification.
pub fn spec_from_lines(s: &str) -> String {
    s.lines()
        .map(|line| line.split('#').next().map(str::trim).unwrap_or(""))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

// All-digit values too large for u64 are still numeric, just out of range.
fn parse_number(s: &str, token: &str) -> Result<u64> {
    let s = s.trim_matches(|c| c == ' ' || c == '\t');
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ScanError::InvalidPort(token.to_string()));
    }
    Ok(s.parse::<u64>().unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_ports() {
        let ports = parse_port_spec("80, 22 ,\t443").unwrap();
        assert_eq!(ports, vec![22, 80, 443]);
    }

    #[test]
    fn parse_ranges_and_dedup() {
        let ports = parse_port_spec("80,22,80,1-3").unwrap();
        assert_eq!(ports, vec![1, 2, 3, 22, 80]);
    }

    #[test]
    fn reversed_range_is_swapped() {
        let ports = parse_port_spec("500-10").unwrap();
        assert_eq!(ports.len(), 491);
        assert_eq!(ports.first(), Some(&10));
        assert_eq!(ports.last(), Some(&500));
    }

    #[test]
    fn range_bounds_are_clamped() {
        let ports = parse_port_spec("0-70000").unwrap();
        assert_eq!(ports.len(), 65535);
        assert_eq!(ports[0], 1);
        assert_eq!(ports[65534], 65535);
    }

    #[test]
    fn out_of_range_single_ports_are_dropped() {
        let ports = parse_port_spec("0,70000,99999999999999999999999,22").unwrap();
        assert_eq!(ports, vec![22]);
    }

    #[test]
    fn range_entirely_out_of_bounds_is_empty() {
        assert!(parse_port_spec("70000-80000").unwrap().is_empty());
        assert!(parse_port_spec("0-0").unwrap().is_empty());
    }

    #[test]
    fn non_numeric_token_rejects_everything() {
        for spec in ["80,http", "1-abc", "22,,23", "", "-5", "8o"] {
            let err = parse_port_spec(spec).unwrap_err();
            assert!(matches!(err, ScanError::InvalidPort(_)), "{spec}: {err}");
        }
    }

    #[test]
    fn lines_with_comments_fold_into_spec() {
        let input = "\n# web\n80  # http\n443,8443\n\n8000-8002 # dev\n";
        assert_eq!(spec_from_lines(input), "80,443,8443,8000-8002");
    }
}
