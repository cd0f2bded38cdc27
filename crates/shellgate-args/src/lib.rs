// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shellgate argument model: the value tree, the wire parser, the shape
// validator and the writer that turns trees back into wire text.

pub mod error;
pub mod parser;
pub mod validator;
pub mod value;
mod writer;

pub use error::{ArgsError, DuplicateKey, ParseError, ValidationError};
pub use parser::{MAX_DEPTH, ParseOptions, parse, parse_value, parse_with};
pub use validator::{check, parse_and_validate, validate};
pub use value::{ArgumentList, Kind, KindSet, Object, Value};
pub use writer::write_quoted;
