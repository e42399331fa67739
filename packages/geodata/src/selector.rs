//! Selector language for geography and category parameters.
//!
//! Each raw value may hold several comma-separated tokens. A token
//! containing `...` is an inclusive range; anything else is an exact code.
//!
//! ```
//! use geodata::selector::parse_selector;
//!
//! let selector = parse_selector(&["E01000001, E01000005...E01000009"]).unwrap();
//! assert_eq!(selector.singles, vec!["E01000001"]);
//! assert_eq!(selector.ranges[0].start, "E01000005");
//! ```

use std::str::FromStr;

use geodata_models::{CodeRange, GeoType, Selector};

use crate::{GeodataError, Result};

const RANGE_SEPARATOR: &str = "...";

/// Parses raw parameter values into a [`Selector`].
///
/// Blank tokens are skipped and duplicates are kept.
///
/// # Errors
///
/// Returns [`GeodataError::MalformedRange`] if a range token does not
/// split into exactly two non-empty codes.
pub fn parse_selector<S: AsRef<str>>(values: &[S]) -> Result<Selector> {
    let mut selector = Selector::default();

    for token in tokens(values) {
        if token.contains(RANGE_SEPARATOR) {
            let parts: Vec<&str> = token.split(RANGE_SEPARATOR).map(str::trim).collect();
            match parts.as_slice() {
                [start, end] if !start.is_empty() && !end.is_empty() => {
                    selector.ranges.push(CodeRange {
                        start: (*start).to_string(),
                        end: (*end).to_string(),
                    });
                }
                _ => {
                    return Err(GeodataError::MalformedRange {
                        token: token.to_string(),
                    });
                }
            }
        } else {
            selector.singles.push(token.to_string());
        }
    }

    Ok(selector)
}

/// Returns the exact codes of `selector`, rejecting any ranges.
///
/// # Errors
///
/// Returns [`GeodataError::UnsupportedRange`] naming `param` if the
/// selector contains a range.
pub fn require_singles(selector: Selector, param: &str) -> Result<Vec<String>> {
    if selector.has_ranges() {
        return Err(GeodataError::UnsupportedRange {
            param: param.to_string(),
        });
    }
    Ok(selector.singles)
}

/// Parses comma-separated geography type names, case-insensitively.
///
/// # Errors
///
/// Returns [`GeodataError::MalformedRange`] for a range token and
/// [`GeodataError::InvalidGeotype`] for an unknown name.
pub fn parse_geotypes<S: AsRef<str>>(values: &[S]) -> Result<Vec<GeoType>> {
    let singles = require_singles(parse_selector(values)?, "geotype")?;

    singles
        .iter()
        .map(|name| {
            GeoType::from_str(name).map_err(|_| GeodataError::InvalidGeotype { name: name.clone() })
        })
        .collect()
}

fn tokens<S: AsRef<str>>(values: &[S]) -> impl Iterator<Item = &str> {
    values
        .iter()
        .flat_map(|value| value.as_ref().split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_concatenates_values() {
        let selector = parse_selector(&["A,B", " C ", "", "D,,E"]).unwrap();
        assert_eq!(selector.singles, vec!["A", "B", "C", "D", "E"]);
        assert!(selector.ranges.is_empty());
    }

    #[test]
    fn keeps_duplicates() {
        let selector = parse_selector(&["A,A", "A"]).unwrap();
        assert_eq!(selector.singles.len(), 3);
    }

    #[test]
    fn parses_ranges() {
        let selector = parse_selector(&["QS101EW0001...QS101EW0009,X"]).unwrap();
        assert_eq!(
            selector.ranges,
            vec![CodeRange {
                start: "QS101EW0001".to_string(),
                end: "QS101EW0009".to_string(),
            }]
        );
        assert_eq!(selector.singles, vec!["X"]);
    }

    #[test]
    fn reversed_range_is_accepted() {
        let selector = parse_selector(&["Z...A"]).unwrap();
        assert_eq!(selector.ranges[0].start, "Z");
        assert_eq!(selector.ranges[0].end, "A");
    }

    #[test]
    fn rejects_malformed_ranges() {
        for token in ["...B", "A...", "...", "A...B...C"] {
            let err = parse_selector(&[token]).unwrap_err();
            assert!(
                matches!(err, GeodataError::MalformedRange { .. }),
                "{token} should be malformed"
            );
        }
    }

    #[test]
    fn empty_input_is_an_empty_selector() {
        let none: [&str; 0] = [];
        assert!(parse_selector(&none).unwrap().is_empty());
        assert!(parse_selector(&[" , ,"]).unwrap().is_empty());
    }

    #[test]
    fn require_singles_rejects_ranges() {
        let selector = parse_selector(&["A...B"]).unwrap();
        let err = require_singles(selector, "cat").unwrap_err();
        assert!(matches!(err, GeodataError::UnsupportedRange { ref param } if param == "cat"));

        let selector = parse_selector(&["A,B"]).unwrap();
        assert_eq!(require_singles(selector, "cat").unwrap(), vec!["A", "B"]);
    }

    #[test]
    fn geotypes_are_case_insensitive() {
        let types = parse_geotypes(&["lad,Lsoa", "OA"]).unwrap();
        assert_eq!(types, vec![GeoType::Lad, GeoType::Lsoa, GeoType::Oa]);
    }

    #[test]
    fn unknown_geotype_is_rejected() {
        let err = parse_geotypes(&["LAD,WARD"]).unwrap_err();
        assert!(matches!(err, GeodataError::InvalidGeotype { ref name } if name == "WARD"));
    }
}
