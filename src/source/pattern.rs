//! Glob-style path patterns for selecting source files.
//!
//! Supported syntax, matched against paths relative to the source location:
//! - `*` matches within one path segment
//! - `**` matches any number of segments (including none when followed by `/`)
//! - `?` matches one character other than `/`
//! - `[abc]`, `[a-z]` and `[!abc]` character classes

use regex::Regex;
use snafu::prelude::*;

use crate::error::{InvalidPatternSnafu, ReaderError};

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    pattern: String,
    prefix: String,
    regex: Regex,
}

fn is_wildcard_segment(segment: &str) -> bool {
    segment.contains(['*', '?', '['])
}

fn push_class(
    regex: &mut String,
    chars: &[char],
    start: usize,
    pattern: &str,
) -> Result<usize, ReaderError> {
    let mut i = start;
    regex.push('[');
    if matches!(chars.get(i), Some('!')) {
        regex.push('^');
        i += 1;
    }

    let body_start = i;
    while let Some(&c) = chars.get(i) {
        if c == ']' && i > body_start {
            regex.push(']');
            return Ok(i + 1);
        }
        match c {
            '\\' | '[' | ']' | '^' | '&' | '~' => {
                regex.push('\\');
                regex.push(c);
            }
            // Classes never match the separator
            '/' => {}
            _ => regex.push(c),
        }
        i += 1;
    }

    InvalidPatternSnafu {
        pattern,
        message: "unclosed character class",
    }
    .fail()
}

fn translate(pattern: &str) -> Result<String, ReaderError> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut regex = String::with_capacity(pattern.len() * 2);
    regex.push('^');

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    regex.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    regex.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                regex.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                regex.push_str("[^/]");
                i += 1;
            }
            '[' => {
                i = push_class(&mut regex, &chars, i + 1, pattern)?;
            }
            c => {
                let mut buf = [0u8; 4];
                regex.push_str(&regex::escape(c.encode_utf8(&mut buf)));
                i += 1;
            }
        }
    }

    regex.push('$');
    Ok(regex)
}

impl PathPattern {
    /// Compile a pattern. Leading and trailing slashes are ignored.
    pub fn parse(pattern: &str) -> Result<Self, ReaderError> {
        let trimmed = pattern.trim().trim_matches('/');
        ensure!(
            !trimmed.is_empty(),
            InvalidPatternSnafu {
                pattern,
                message: "pattern is empty",
            }
        );

        let prefix = trimmed
            .split('/')
            .take_while(|segment| !is_wildcard_segment(segment))
            .collect::<Vec<_>>()
            .join("/");

        let regex = Regex::new(&translate(trimmed)?).map_err(|e| {
            InvalidPatternSnafu {
                pattern,
                message: e.to_string(),
            }
            .build()
        })?;

        Ok(Self {
            pattern: trimmed.to_string(),
            prefix,
            regex,
        })
    }

    /// The pattern text as given.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Longest literal directory prefix, used to narrow the listing.
    ///
    /// For a pattern without wildcards this is the whole path.
    pub fn listing_prefix(&self) -> &str {
        &self.prefix
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_segment_wildcards() {
        let pattern = PathPattern::parse("song_data/*/*/*/*.json").unwrap();
        assert_eq!(pattern.listing_prefix(), "song_data");
        assert!(pattern.matches("song_data/A/B/C/TRABCEI128F424C983.json"));
        assert!(!pattern.matches("song_data/A/B/TRABCEI128F424C983.json"));
        assert!(!pattern.matches("song_data/A/B/C/D/x.json"));
        assert!(!pattern.matches("song_data/A/B/C/x.json.bak"));
    }

    #[test]
    fn test_recursive_wildcard() {
        let pattern = PathPattern::parse("log_data/**/*.json").unwrap();
        assert_eq!(pattern.listing_prefix(), "log_data");
        assert!(pattern.matches("log_data/2018-11-01-events.json"));
        assert!(pattern.matches("log_data/2018/11/2018-11-01-events.json"));
        assert!(!pattern.matches("song_data/2018/11/a.json"));
    }

    #[test]
    fn test_question_mark_and_classes() {
        let pattern = PathPattern::parse("song_data/[A-C]/?/[!Z]/*.json").unwrap();
        assert_eq!(pattern.listing_prefix(), "song_data");
        assert!(pattern.matches("song_data/B/A/A/x.json"));
        assert!(!pattern.matches("song_data/D/A/A/x.json"));
        assert!(!pattern.matches("song_data/B/A/Z/x.json"));
        assert!(!pattern.matches("song_data/B/AA/A/x.json"));
    }

    #[test]
    fn test_literal_characters_are_escaped() {
        let pattern = PathPattern::parse("log-data/2018.11+(a).json").unwrap();
        assert_eq!(pattern.listing_prefix(), "log-data/2018.11+(a).json");
        assert!(pattern.matches("log-data/2018.11+(a).json"));
        assert!(!pattern.matches("log-data/2018x11+(a).json"));
    }

    #[test]
    fn test_leading_slash_ignored() {
        let pattern = PathPattern::parse("/log_data/*.json").unwrap();
        assert_eq!(pattern.as_str(), "log_data/*.json");
        assert!(pattern.matches("log_data/a.json"));
    }

    #[test]
    fn test_gz_suffix_must_be_matched_explicitly() {
        let pattern = PathPattern::parse("log_data/*.json*").unwrap();
        assert!(pattern.matches("log_data/a.json.gz"));
        assert!(pattern.matches("log_data/a.json"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(matches!(
            PathPattern::parse("  "),
            Err(ReaderError::InvalidPattern { .. })
        ));
        assert!(matches!(
            PathPattern::parse("song_data/[AB/*.json"),
            Err(ReaderError::InvalidPattern { .. })
        ));
    }
}
