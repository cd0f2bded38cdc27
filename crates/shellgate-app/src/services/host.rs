// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Script host that writes one statement per line to a stream. The embedding
// script environment reads and evaluates them.

use std::io::Write;

use shellgate_core::{BridgeError, Result};
use shellgate_exec::ScriptHost;

pub struct LineHost<W: Write> {
    out: W,
}

impl<W: Write> LineHost<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl LineHost<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ScriptHost for LineHost<W> {
    fn evaluate(&mut self, statement: &str) -> Result<()> {
        writeln!(self.out, "{statement}")
            .and_then(|()| self.out.flush())
            .map_err(|e| BridgeError::Script(format!("write statement: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_statement_per_line() {
        let mut host = LineHost::new(Vec::new());
        host.evaluate("a();").expect("write");
        host.evaluate("b();").expect("write");
        assert_eq!(String::from_utf8(host.into_inner()).expect("utf8"), "a();\nb();\n");
    }
}
