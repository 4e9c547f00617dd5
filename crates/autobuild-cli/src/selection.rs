// SPDX-License-Identifier: MIT OR Apache-2.0
//! Parses the interactive "which packages" line used by `release` and
//! `discard`: comma-separated 1-based indices, `a:b` ranges (inclusive),
//! or `*` for everything.

use anyhow::{anyhow, Result};

pub fn parse_selection(line: &str, count: usize) -> Result<Vec<usize>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }

    let mut indices = Vec::new();
    for part in line.split(',') {
        let part = part.trim();
        if part == "*" {
            return Ok((0..count).collect());
        }

        if let Some((start, end)) = part.split_once(':') {
            let start: usize = start.trim().parse()?;
            let end: usize = end.trim().parse()?;
            if start == 0 || end == 0 || start > end {
                return Err(anyhow!("invalid range `{part}`"));
            }
            for i in start..=end {
                indices.push(check(i, count)?);
            }
        } else {
            let idx: usize = part.parse()?;
            indices.push(check(idx, count)?);
        }
    }
    Ok(indices)
}

fn check(one_based: usize, count: usize) -> Result<usize> {
    if one_based == 0 || one_based > count {
        return Err(anyhow!("index {one_based} out of range (1..={count})"));
    }
    Ok(one_based - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_star_as_everything() {
        assert_eq!(parse_selection("*", 3).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn parses_comma_list() {
        assert_eq!(parse_selection("1,3", 3).unwrap(), vec![0, 2]);
    }

    #[test]
    fn parses_range() {
        assert_eq!(parse_selection("1:3", 3).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn rejects_out_of_range_index() {
        assert!(parse_selection("5", 3).is_err());
    }

    #[test]
    fn empty_line_selects_nothing() {
        assert!(parse_selection("", 3).unwrap().is_empty());
    }
}
