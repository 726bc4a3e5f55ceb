// Host-range expansion, e.g. "n[0-3,8]" -> ["n0","n1","n2","n3","n8"].
//
// This is the node-set notation used throughout the config parser's
// EXPLINE semantics and the forwarder's destination lists. A "hostlist
// expression" is a comma-separated list of terms; each term is either a
// bare hostname or a `prefix[ranges]` form where `ranges` is itself a
// comma-separated list of `N` or `N-M`. Top-level commas (outside any
// `[...]`) separate terms; commas inside `[...]` separate range entries.

use crate::{err, Error};

pub fn expand_hostlist(spec: &str) -> Result<Vec<String>, Error> {
    let mut out = Vec::new();
    for term in split_top_level(spec) {
        expand_term(term, &mut out)?;
    }
    Ok(out)
}

/// Inverse of [`expand_hostlist`] for same-prefix, contiguous-enough
/// sequences: fold a flat name list back into `prefix[a-b,c]` form. Only
/// used by config emission and log messages, so it doesn't need to be
/// optimal — just correct and round-trip with [`expand_hostlist`].
pub fn compact_hostlist(names: &[String]) -> String {
    // Group by (prefix, numeric width), preserving first-seen order of
    // groups, then by ascending numeric suffix within a group.
    struct Group {
        prefix: String,
        width: usize,
        suffix: String,
        nums: Vec<u64>,
    }
    let mut groups: Vec<Group> = Vec::new();
    let mut bare: Vec<String> = Vec::new();

    for name in names {
        match split_trailing_digits(name) {
            Some((prefix, digits, suffix)) => {
                let width = digits.len();
                let n: u64 = digits.parse().unwrap_or(0);
                if let Some(g) =
                    groups.iter_mut().find(|g| g.prefix == prefix && g.width == width && g.suffix == suffix)
                {
                    g.nums.push(n);
                } else {
                    groups.push(Group { prefix: prefix.to_string(), width, suffix: suffix.to_string(), nums: vec![n] });
                }
            }
            None => bare.push(name.clone()),
        }
    }

    let mut parts = Vec::new();
    for g in groups {
        let mut nums = g.nums.clone();
        nums.sort_unstable();
        nums.dedup();
        let ranges = fold_ranges(&nums);
        let range_str = ranges
            .iter()
            .map(|(a, b)| {
                if a == b {
                    format!("{:0w$}", a, w = g.width)
                } else {
                    format!("{:0w$}-{:0w$}", a, b, w = g.width)
                }
            })
            .collect::<Vec<_>>()
            .join(",");
        if ranges.len() == 1 && ranges[0].0 == ranges[0].1 {
            parts.push(format!("{}{}{}", g.prefix, range_str, g.suffix));
        } else {
            parts.push(format!("{}[{}]{}", g.prefix, range_str, g.suffix));
        }
    }
    parts.extend(bare);
    parts.join(",")
}

fn fold_ranges(sorted_nums: &[u64]) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    let mut iter = sorted_nums.iter().copied();
    if let Some(mut start) = iter.next() {
        let mut end = start;
        for n in iter {
            if n == end + 1 {
                end = n;
            } else {
                ranges.push((start, end));
                start = n;
                end = n;
            }
        }
        ranges.push((start, end));
    }
    ranges
}

fn split_trailing_digits(name: &str) -> Option<(&str, &str, &str)> {
    let digit_end = name.rfind(|c: char| !c.is_ascii_digit()).map(|i| i + 1).unwrap_or(0);
    if digit_end == name.len() {
        return None;
    }
    let digit_start = name[..digit_end].rfind(|c: char| !c.is_ascii_digit()).map(|i| i + 1).unwrap_or(0);
    if digit_start == digit_end {
        return None;
    }
    Some((&name[..digit_start], &name[digit_start..digit_end], &name[digit_end..]))
}

fn split_top_level(spec: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, c) in spec.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth -= 1,
            ',' if depth == 0 => {
                out.push(&spec[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&spec[start..]);
    out
}

fn expand_term(term: &str, out: &mut Vec<String>) -> Result<(), Error> {
    let term = term.trim();
    if term.is_empty() {
        return Ok(());
    }
    match term.find('[') {
        None => {
            out.push(term.to_string());
            Ok(())
        }
        Some(open) => {
            let close = term.rfind(']').ok_or_else(|| err(format!("unterminated host range: {term}")))?;
            if close < open {
                return Err(err(format!("malformed host range: {term}")));
            }
            let prefix = &term[..open];
            let suffix = &term[close + 1..];
            let ranges = &term[open + 1..close];
            for range in ranges.split(',') {
                expand_range(prefix, range, suffix, out)?;
            }
            Ok(())
        }
    }
}

fn expand_range(prefix: &str, range: &str, suffix: &str, out: &mut Vec<String>) -> Result<(), Error> {
    let range = range.trim();
    match range.split_once('-') {
        None => {
            let n: u64 = range.parse().map_err(|_| err(format!("bad host range entry: {range}")))?;
            let width = range.len();
            out.push(format!("{prefix}{:0w$}{suffix}", n, w = width));
            Ok(())
        }
        Some((lo, hi)) => {
            let width = lo.len();
            let lo: u64 = lo.parse().map_err(|_| err(format!("bad host range start: {range}")))?;
            let hi: u64 = hi.parse().map_err(|_| err(format!("bad host range end: {range}")))?;
            if lo > hi {
                return Err(err(format!("host range start exceeds end: {range}")));
            }
            for n in lo..=hi {
                out.push(format!("{prefix}{:0w$}{suffix}", n, w = width));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn expands_simple_range() {
        let names = expand_hostlist("n[0-3]").unwrap();
        assert_eq!(names, vec!["n0", "n1", "n2", "n3"]);
    }

    #[test]
    fn expands_mixed_ranges_and_singletons() {
        let names = expand_hostlist("n[0-1,4,8-9]").unwrap();
        assert_eq!(names, vec!["n0", "n1", "n4", "n8", "n9"]);
    }

    #[test]
    fn expands_bare_names_and_multiple_terms() {
        let names = expand_hostlist("login0,n[0-1],login1").unwrap();
        assert_eq!(names, vec!["login0", "n0", "n1", "login1"]);
    }

    #[test]
    fn preserves_zero_padding() {
        let names = expand_hostlist("n[008-010]").unwrap();
        assert_eq!(names, vec!["n008", "n009", "n010"]);
    }

    #[test]
    fn rejects_reversed_range() {
        assert!(expand_hostlist("n[5-2]").is_err());
    }

    #[test]
    fn compact_roundtrips_contiguous_range() {
        let names = expand_hostlist("n[0-3]").unwrap();
        let compacted = compact_hostlist(&names);
        assert_eq!(expand_hostlist(&compacted).unwrap(), names);
    }
}
