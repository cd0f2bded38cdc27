// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Errors raised while parsing or validating wire-format arguments.

use thiserror::Error;

use crate::value::{Kind, KindSet};

/// A syntax error in a wire-format argument blob.
///
/// Every variant carries the byte offset into the input where the problem
/// was detected. Parsing never recovers: the first error fails the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected end of input at byte {offset}")]
    UnexpectedEnd { offset: usize },

    #[error("unexpected character {found:?} at byte {offset}")]
    UnexpectedChar { offset: usize, found: char },

    #[error("argument list must start with '[' (byte {offset})")]
    NotAnArray { offset: usize },

    #[error("unterminated string starting at byte {offset}")]
    UnterminatedString { offset: usize },

    #[error("invalid escape sequence at byte {offset}")]
    InvalidEscape { offset: usize },

    #[error("invalid unicode escape at byte {offset}")]
    InvalidUnicode { offset: usize },

    #[error("malformed number at byte {offset}")]
    InvalidNumber { offset: usize },

    #[error("number out of range at byte {offset}")]
    NumberOutOfRange { offset: usize },

    #[error("duplicate object key {name:?} at byte {offset}")]
    DuplicateKey { offset: usize, name: String },

    #[error("nesting exceeds {limit} levels at byte {offset}")]
    TooDeep { offset: usize, limit: usize },

    #[error("trailing characters after argument list at byte {offset}")]
    TrailingCharacters { offset: usize },
}

impl ParseError {
    /// Byte offset into the input where the error was detected.
    pub fn offset(&self) -> usize {
        match self {
            Self::UnexpectedEnd { offset }
            | Self::UnexpectedChar { offset, .. }
            | Self::NotAnArray { offset }
            | Self::UnterminatedString { offset }
            | Self::InvalidEscape { offset }
            | Self::InvalidUnicode { offset }
            | Self::InvalidNumber { offset }
            | Self::NumberOutOfRange { offset }
            | Self::DuplicateKey { offset, .. }
            | Self::TooDeep { offset, .. }
            | Self::TrailingCharacters { offset } => *offset,
        }
    }
}

/// A well-formed argument list that does not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("expected {expected} arguments, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("argument {position}: expected {expected}, got {actual}")]
    Kind {
        position: usize,
        expected: KindSet,
        actual: Kind,
    },

    #[error("argument {position} is missing")]
    Missing { position: usize },
}

/// Either half of argument handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgsError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Returned by [`crate::Object::insert`] when the name is already present.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("duplicate object key {0:?}")]
pub struct DuplicateKey(pub String);
