//! Page and frame selection.
//!
//! A selection is written as comma-separated tokens, each a positive integer
//! `N` or an inclusive range `A-B`. Indices are 1-based, deduplicated, and
//! kept in order of first appearance. The reverse flag flips the final
//! sequence.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Errors from parsing or resolving a selection. Each names the token at fault.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("Invalid range token '{token}': not a positive integer or range")]
    Malformed { token: String },

    #[error("Invalid range token '{token}': start is greater than end")]
    Descending { token: String },

    #[error("Invalid range token '{token}': indices start at 1")]
    Zero { token: String },

    #[error("Invalid range token '{token}': source has only {extent} pages")]
    BeyondExtent { token: String, extent: u32 },
}

impl SelectorError {
    /// The offending token.
    pub fn token(&self) -> &str {
        match self {
            Self::Malformed { token }
            | Self::Descending { token }
            | Self::Zero { token }
            | Self::BeyondExtent { token, .. } => token,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RangeToken {
    text: String,
    start: u32,
    end: u32,
}

/// A parsed selection, not yet bound to a source extent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSelection {
    tokens: Vec<RangeToken>,
    reverse: bool,
}

impl PageSelection {
    /// Selects every page.
    pub fn all() -> Self {
        Self::default()
    }

    /// Parses selection text. Blank text selects every page.
    pub fn parse(text: &str, reverse: bool) -> Result<Self, SelectorError> {
        let mut tokens = Vec::new();
        if !text.trim().is_empty() {
            for raw in text.split(',') {
                tokens.push(parse_token(raw.trim())?);
            }
        }
        Ok(Self { tokens, reverse })
    }

    pub fn is_all(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn is_reversed(&self) -> bool {
        self.reverse
    }

    /// Expands the selection against a source of `extent` pages.
    pub fn resolve(&self, extent: u32) -> Result<Vec<u32>, SelectorError> {
        let mut indices: Vec<u32> = if self.tokens.is_empty() {
            (1..=extent).collect()
        } else {
            if let Some(token) = self.tokens.iter().find(|t| t.end > extent) {
                return Err(SelectorError::BeyondExtent {
                    token: token.text.clone(),
                    extent,
                });
            }
            let mut seen = HashSet::new();
            self.tokens
                .iter()
                .flat_map(|t| t.start..=t.end)
                .filter(|i| seen.insert(*i))
                .collect()
        };

        if self.reverse {
            indices.reverse();
        }
        Ok(indices)
    }
}

fn parse_token(token: &str) -> Result<RangeToken, SelectorError> {
    let (start, end) = match token.split_once('-') {
        Some((a, b)) => (parse_index(a.trim(), token)?, parse_index(b.trim(), token)?),
        None => {
            let index = parse_index(token, token)?;
            (index, index)
        }
    };

    if start == 0 || end == 0 {
        return Err(SelectorError::Zero {
            token: token.to_string(),
        });
    }
    if start > end {
        return Err(SelectorError::Descending {
            token: token.to_string(),
        });
    }
    Ok(RangeToken {
        text: token.to_string(),
        start,
        end,
    })
}

fn parse_index(part: &str, token: &str) -> Result<u32, SelectorError> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SelectorError::Malformed {
            token: token.to_string(),
        });
    }
    part.parse::<u32>().map_err(|_| SelectorError::Malformed {
        token: token.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_tokens() {
        let selection = PageSelection::parse("1,3,5-10,15", false).unwrap();
        assert_eq!(
            selection.resolve(20).unwrap(),
            vec![1, 3, 5, 6, 7, 8, 9, 10, 15]
        );
    }

    #[test]
    fn test_mixed_tokens_reversed() {
        let selection = PageSelection::parse("1,3,5-10,15", true).unwrap();
        assert_eq!(
            selection.resolve(20).unwrap(),
            vec![15, 10, 9, 8, 7, 6, 5, 3, 1]
        );
    }

    #[test]
    fn test_duplicates_keep_first_position() {
        let selection = PageSelection::parse("5, 1-3, 2, 5", false).unwrap();
        assert_eq!(selection.resolve(10).unwrap(), vec![5, 1, 2, 3]);
    }

    #[test]
    fn test_blank_selects_all() {
        let selection = PageSelection::parse("  ", false).unwrap();
        assert!(selection.is_all());
        assert_eq!(selection.resolve(3).unwrap(), vec![1, 2, 3]);

        let reversed = PageSelection::parse("", true).unwrap();
        assert_eq!(reversed.resolve(3).unwrap(), vec![3, 2, 1]);
    }

    #[test]
    fn test_malformed_tokens_are_named() {
        for (text, bad) in [
            ("1,a", "a"),
            ("1,,2", ""),
            ("-3", "-3"),
            ("2-", "2-"),
            ("1-2-3", "1-2-3"),
            ("1.5", "1.5"),
            ("99999999999", "99999999999"),
        ] {
            let err = PageSelection::parse(text, false).unwrap_err();
            assert_eq!(err.token(), bad, "input {:?}", text);
        }
    }

    #[test]
    fn test_descending_range() {
        let err = PageSelection::parse("1,8-3", false).unwrap_err();
        assert_eq!(
            err,
            SelectorError::Descending {
                token: "8-3".to_string()
            }
        );
    }

    #[test]
    fn test_zero_index() {
        let err = PageSelection::parse("0-2", false).unwrap_err();
        assert!(matches!(err, SelectorError::Zero { .. }));
    }

    #[test]
    fn test_beyond_extent() {
        let selection = PageSelection::parse("1,4-9", false).unwrap();
        let err = selection.resolve(6).unwrap_err();
        assert_eq!(
            err,
            SelectorError::BeyondExtent {
                token: "4-9".to_string(),
                extent: 6
            }
        );
    }
}
