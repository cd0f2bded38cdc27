// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Decoding of script-to-native commands.
//
// Two shapes are accepted:
//   ["<callback id>","<action>","<module>","<args>"]
//   {"callbackId":"..","action":"..","service":"..","args":"[..]" or [..]}

use shellgate_args::{ArgumentList, KindSet, Object, ParseOptions, Value, check, parse_value};
use shellgate_core::{BridgeError, CallbackId, Result};

const POSITIONAL: &[KindSet] = &[
    KindSet::STRING,
    KindSet::STRING,
    KindSet::STRING,
    KindSet::STRING,
];

/// One decoded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub callback_id: CallbackId,
    pub action: String,
    pub module: String,
    /// Wire-format argument array, still unparsed.
    pub args: String,
}

impl Command {
    pub fn new(
        callback_id: impl Into<CallbackId>,
        action: impl Into<String>,
        module: impl Into<String>,
        args: impl Into<String>,
    ) -> Self {
        Self {
            callback_id: callback_id.into(),
            action: action.into(),
            module: module.into(),
            args: args.into(),
        }
    }

    pub fn from_wire(text: &str, options: ParseOptions) -> Result<Self> {
        match parse_value(text, options)? {
            Value::Array(items) => Self::from_positional(ArgumentList::new(items)),
            Value::Object(obj) => Self::from_object(&obj),
            other => Err(BridgeError::InvalidArgument(format!(
                "command must be an array or an object, got {}",
                other.kind()
            ))),
        }
    }

    fn from_positional(mut list: ArgumentList) -> Result<Self> {
        check(&list, POSITIONAL)?;
        let mut take = |position| list.take(position).into_string().unwrap_or_default();
        Ok(Self {
            callback_id: CallbackId::new(take(0)),
            action: take(1),
            module: take(2),
            args: take(3),
        })
    }

    fn from_object(obj: &Object) -> Result<Self> {
        let field = |name: &str| {
            obj.find(name, KindSet::STRING)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| BridgeError::InvalidArgument(format!("command field {name:?} missing")))
        };
        let module = field("service").or_else(|_| field("module"))?;
        let args = match obj.get("args") {
            None => "[]".to_string(),
            Some(Value::String(text)) => text.clone(),
            Some(array @ Value::Array(_)) => array.to_wire(),
            Some(other) => {
                return Err(BridgeError::InvalidArgument(format!(
                    "command args must be a string or an array, got {}",
                    other.kind()
                )));
            }
        };
        Ok(Self {
            callback_id: CallbackId::new(field("callbackId")?),
            action: field("action")?,
            module,
            args,
        })
    }

    /// Positional wire form.
    pub fn to_wire(&self) -> String {
        Value::Array(vec![
            Value::from(self.callback_id.as_str()),
            Value::from(self.action.as_str()),
            Value::from(self.module.as_str()),
            Value::from(self.args.as_str()),
        ])
        .to_wire()
    }
}
