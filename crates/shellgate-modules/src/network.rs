// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Network module: reports the current connection type.

use std::sync::Arc;

use shellgate_bridge::PlatformBridge;
use shellgate_core::Result;
use shellgate_exec::{CommandHandler, Invocation, Reply};

pub struct Network {
    bridge: Arc<dyn PlatformBridge>,
}

impl Network {
    pub fn new(bridge: Arc<dyn PlatformBridge>) -> Self {
        Self { bridge }
    }
}

impl CommandHandler for Network {
    fn execute(&self, invocation: Invocation<'_>) -> Result<Reply> {
        match invocation.action {
            "getConnectionInfo" => {
                invocation.args(&[])?;
                let connection = self.bridge.connection_type()?;
                tracing::debug!(%connection, "connection type read");
                Ok(Reply::success(connection.as_str()))
            }
            _ => Err(invocation.invalid_action()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBridge, Harness, payload};

    #[test]
    fn reports_the_connection_type() {
        let mut h = Harness::new();
        h.registry
            .register("Network", Network::new(Arc::new(FakeBridge::default())))
            .expect("register");
        let statement = h.reply("Network", "cb1", "getConnectionInfo", "[]");
        assert_eq!(payload(&statement).as_str(), Some("wifi"));
    }
}
