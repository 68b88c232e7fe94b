use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{format_temperature, HvacMode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandPayload(pub String);

impl CommandPayload {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandLookupError {
    #[error("no command programmed for {path}")]
    Missing { path: String },
    #[error("command entry at {path} is not a payload")]
    NotAPayload { path: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub mode: HvacMode,
    pub fan_mode: String,
    pub swing_mode: Option<String>,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandStep {
    Transmit(CommandPayload),
    Settle(Duration),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandTable(Value);

impl CommandTable {
    pub fn new(commands: Value) -> Self {
        Self(commands)
    }

    pub fn off(&self) -> Result<CommandPayload, CommandLookupError> {
        self.lookup(&["off"])
    }

    pub fn on(&self) -> Option<CommandPayload> {
        self.lookup(&["on"]).ok()
    }

    pub fn resolve(
        &self,
        mode: HvacMode,
        fan_mode: &str,
        swing_mode: Option<&str>,
        temperature: &str,
    ) -> Result<CommandPayload, CommandLookupError> {
        match swing_mode {
            Some(swing) => self.lookup(&[mode.as_str(), fan_mode, swing, temperature]),
            None => self.lookup(&[mode.as_str(), fan_mode, temperature]),
        }
    }

    pub fn plan(
        &self,
        request: &CommandRequest,
        swing_supported: bool,
        settle: Duration,
    ) -> Result<Vec<CommandStep>, CommandLookupError> {
        if request.mode.is_off() {
            return Ok(vec![CommandStep::Transmit(self.off()?)]);
        }

        let mut steps = Vec::with_capacity(3);
        if let Some(on) = self.on() {
            steps.push(CommandStep::Transmit(on));
            if request.mode == HvacMode::On {
                return Ok(steps);
            }
            steps.push(CommandStep::Settle(settle));
        }

        let swing = if swing_supported {
            Some(request.swing_mode.as_deref().ok_or_else(|| {
                CommandLookupError::Missing {
                    path: format!("{}.{}.<swing>", request.mode, request.fan_mode),
                }
            })?)
        } else {
            None
        };

        let temperature = format_temperature(request.temperature);
        let payload = self.resolve(request.mode, &request.fan_mode, swing, &temperature)?;
        steps.push(CommandStep::Transmit(payload));
        Ok(steps)
    }

    fn lookup(&self, path: &[&str]) -> Result<CommandPayload, CommandLookupError> {
        let mut node = &self.0;
        for (depth, key) in path.iter().enumerate() {
            node = node
                .get(*key)
                .ok_or_else(|| CommandLookupError::Missing {
                    path: path[..=depth].join("."),
                })?;
        }

        match node {
            Value::String(payload) => Ok(CommandPayload(payload.clone())),
            _ => Err(CommandLookupError::NotAPayload {
                path: path.join("."),
            }),
        }
    }
}
