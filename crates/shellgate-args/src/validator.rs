// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Positional shape validation.
//
// An expected shape is a slice of `KindSet`s, one per argument. The slice
// length is the terminator: a list validates only if it has exactly that
// many elements.

use crate::error::{ArgsError, ValidationError};
use crate::parser::{ParseOptions, parse_with};
use crate::value::{ArgumentList, KindSet};

/// Pure check of `list` against `expected`.
pub fn validate(list: &ArgumentList, expected: &[KindSet]) -> bool {
    check(list, expected).is_ok()
}

/// Like [`validate`], but reports the first mismatch.
pub fn check(list: &ArgumentList, expected: &[KindSet]) -> Result<(), ValidationError> {
    if list.len() != expected.len() {
        return Err(ValidationError::Length {
            expected: expected.len(),
            actual: list.len(),
        });
    }
    for (position, (value, kinds)) in list.iter().zip(expected).enumerate() {
        if !kinds.accepts(value.kind()) {
            return Err(ValidationError::Kind {
                position,
                expected: *kinds,
                actual: value.kind(),
            });
        }
    }
    Ok(())
}

/// Parse `text` and validate the result in one step.
pub fn parse_and_validate(
    text: &str,
    expected: &[KindSet],
    options: ParseOptions,
) -> Result<ArgumentList, ArgsError> {
    let list = parse_with(text, options)?;
    check(&list, expected)?;
    Ok(list)
}

impl ArgumentList {
    pub fn validate(&self, expected: &[KindSet]) -> bool {
        validate(self, expected)
    }
}
