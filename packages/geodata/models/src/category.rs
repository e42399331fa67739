//! Category code helpers.
//!
//! Category codes look like `QS402EW0012`: a table prefix made of
//! letters, digits and letters, then a fixed-width numeric suffix. The
//! suffix `1` (zero-padded to the same width) is the table's totals
//! category.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static CATEGORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z]+)([0-9]+)([A-Z]+)([0-9]+)$").unwrap_or_else(|_| unreachable!())
});

/// Errors from deriving a totals category.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CategoryCodeError {
    /// The code does not have the `LETTERS DIGITS LETTERS DIGITS` shape.
    #[error("can't parse category code '{code}'")]
    Malformed {
        /// The offending code.
        code: String,
    },

    /// The code is already its table's totals category.
    #[error("category '{code}' is already the totals category")]
    AlreadyTotals {
        /// The offending code.
        code: String,
    },
}

/// Splits a category code into its table prefix and numeric suffix.
///
/// Returns `None` if the code does not match the expected shape.
///
/// ```
/// assert_eq!(
///     geodata_models::split_category("QS402EW0012"),
///     Some(("QS402EW", "0012"))
/// );
/// ```
#[must_use]
pub fn split_category(code: &str) -> Option<(&str, &str)> {
    let caps = CATEGORY_RE.captures(code)?;
    let suffix = caps.get(4)?;
    Some((&code[..suffix.start()], suffix.as_str()))
}

/// Returns `true` if `code` parses and its numeric suffix is 1.
#[must_use]
pub fn is_totals_category(code: &str) -> bool {
    split_category(code).is_some_and(|(_, suffix)| suffix.parse::<u64>() == Ok(1))
}

/// Derives the totals category for `code` by setting its numeric suffix
/// to 1, keeping the suffix width.
///
/// `"QS402EW0012"` becomes `"QS402EW0001"`.
///
/// # Errors
///
/// * [`CategoryCodeError::Malformed`] if the code doesn't match the shape
/// * [`CategoryCodeError::AlreadyTotals`] if the code is a totals code
pub fn totals_category(code: &str) -> Result<String, CategoryCodeError> {
    let (prefix, suffix) = split_category(code).ok_or_else(|| CategoryCodeError::Malformed {
        code: code.to_string(),
    })?;

    let n: u64 = suffix.parse().map_err(|_| CategoryCodeError::Malformed {
        code: code.to_string(),
    })?;

    if n == 1 {
        return Err(CategoryCodeError::AlreadyTotals {
            code: code.to_string(),
        });
    }

    Ok(format!("{prefix}{:0width$}", 1, width = suffix.len()))
}
