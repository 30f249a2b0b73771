// src/headings.rs

//! Heading detection across markup, CJK and Latin numbering conventions.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Level assigned to every non-markup heading. Nesting is only inferred
/// from `#` runs.
pub const PATTERN_HEADING_LEVEL: usize = 2;

/// A detected structural marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingOccurrence {
    /// Byte offset of the heading's first character in the source text
    pub position: usize,
    /// Nesting depth, 1 = most significant
    pub level: usize,
    /// Text following the marker, trimmed (may be empty)
    pub title: String,
    /// The exact matched heading line, stripped from the section body
    pub raw_match: String,
}

/// How a pattern family turns a match into a level and title.
enum Family {
    /// `#`..`######`: group 1 is the marker run, group 2 the title
    Markup,
    /// Fixed level; group 1 is the title
    Pattern,
}

struct HeadingPattern {
    regex: Regex,
    family: Family,
}

impl HeadingPattern {
    fn new(pattern: &str, family: Family) -> Self {
        Self {
            regex: Regex::new(pattern).expect("static heading pattern must compile"),
            family,
        }
    }
}

/// Pattern battery in precedence order. At a given offset the first
/// registered pattern wins.
static HEADING_PATTERNS: Lazy<Vec<HeadingPattern>> = Lazy::new(|| {
    vec![
        // Markup headings
        HeadingPattern::new(r"(?m)^(#{1,6})[ \t]+(.+)$", Family::Markup),
        // 第一章 / 第2節 / 第三課
        HeadingPattern::new(
            r"(?m)^第[一二三四五六七八九十百0-9]+[章節节課课][ \t\x{3000}]*[:：]?[ \t\x{3000}]*(.*)$",
            Family::Pattern,
        ),
        // 一、 / 二.
        HeadingPattern::new(
            r"(?m)^[一二三四五六七八九十]+[、.．][ \t\x{3000}]*(.+)$",
            Family::Pattern,
        ),
        // 1. / 2、
        HeadingPattern::new(r"(?m)^[0-9]+[.、][ \t\x{3000}]*(.+)$", Family::Pattern),
        // (1) / （一）
        HeadingPattern::new(
            r"(?m)^[（(][0-9一二三四五六七八九十]+[)）][ \t\x{3000}]*(.+)$",
            Family::Pattern,
        ),
        // Chapter 1 / Section 2: / Part 3.
        HeadingPattern::new(r"(?mi)^chapter[ \t]+[0-9]+[:.]?[ \t]*(.*)$", Family::Pattern),
        HeadingPattern::new(r"(?mi)^section[ \t]+[0-9]+[:.]?[ \t]*(.*)$", Family::Pattern),
        HeadingPattern::new(r"(?mi)^part[ \t]+[0-9]+[:.]?[ \t]*(.*)$", Family::Pattern),
    ]
});

/// Scan `text` for headings.
///
/// Returns occurrences sorted by position; ties keep detection order.
/// An empty result means the text has no detectable structure.
pub fn detect_headings(text: &str) -> Vec<HeadingOccurrence> {
    let mut headings = Vec::new();
    let mut seen = HashSet::new();

    for pattern in HEADING_PATTERNS.iter() {
        for caps in pattern.regex.captures_iter(text) {
            let Some(full) = caps.get(0) else { continue };
            if !seen.insert(full.start()) {
                continue;
            }

            let (level, title) = match pattern.family {
                Family::Markup => (
                    caps.get(1).map_or(1, |m| m.as_str().len()),
                    caps.get(2).map_or("", |m| m.as_str()),
                ),
                Family::Pattern => (
                    PATTERN_HEADING_LEVEL,
                    caps.get(1).map_or("", |m| m.as_str()),
                ),
            };

            headings.push(HeadingOccurrence {
                position: full.start(),
                level,
                title: title.trim().to_string(),
                raw_match: full.as_str().to_string(),
            });
        }
    }

    headings.sort_by_key(|h| h.position);
    headings
}
