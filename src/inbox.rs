//! ==============================================================================
//! inbox.rs - single-slot command mailboxes for a device that only polls
//! ==============================================================================
//!
//! purpose:
//!     operators cannot reach the device; they leave a command here and the
//!     device picks it up on its next check-in.
//!
//! ```text
//!     - one slot per CommandClass, holding Option<Command>
//!     - enqueue overwrites (last writer wins, no backlog per class)
//!     - drain_all takes every pending command at once and empties the slots
//!
//!     at-most-once: a drained command is gone, whether or not the device
//!     acted on it. undelivered commands do not survive a restart.
//! ```
//!
//! relationships:
//!     - used by: coordinator.rs (under the shadow lock)
//!     - used by: http.rs (ActuatorAction parsing, ActuatorDisplay)
//!
//! ==============================================================================

use crate::error::CommandError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==============================================================================
// command vocabulary
// ==============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandClass {
    Actuator,
    CommunicationTest,
    DataRequest,
}

impl CommandClass {
    pub const ALL: [CommandClass; 3] = [
        CommandClass::Actuator,
        CommandClass::CommunicationTest,
        CommandClass::DataRequest,
    ];

    const fn slot(self) -> usize {
        match self {
            CommandClass::Actuator => 0,
            CommandClass::CommunicationTest => 1,
            CommandClass::DataRequest => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandClass::Actuator => "actuator",
            CommandClass::CommunicationTest => "communication_test",
            CommandClass::DataRequest => "data_request",
        }
    }
}

/// What the operator wants the LED to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorAction {
    On,
    Off,
    Blink,
    Toggle,
}

impl ActuatorAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActuatorAction::On => "on",
            ActuatorAction::Off => "off",
            ActuatorAction::Blink => "blink",
            ActuatorAction::Toggle => "toggle",
        }
    }
}

impl FromStr for ActuatorAction {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(ActuatorAction::On),
            "off" => Ok(ActuatorAction::Off),
            "blink" => Ok(ActuatorAction::Blink),
            "toggle" => Ok(ActuatorAction::Toggle),
            _ => Err(CommandError::UnknownAction(s.to_string())),
        }
    }
}

impl fmt::Display for ActuatorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Actuator(ActuatorAction),
    CommunicationTest,
    DataRequest,
}

impl Command {
    pub fn class(&self) -> CommandClass {
        match self {
            Command::Actuator(_) => CommandClass::Actuator,
            Command::CommunicationTest => CommandClass::CommunicationTest,
            Command::DataRequest => CommandClass::DataRequest,
        }
    }
}

/// The commands handed to the device on one check-in. Classes with nothing
/// pending are left out of the JSON entirely.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DrainedCommands {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actuator: Option<ActuatorAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub communication_test: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_request: Option<bool>,
}

impl DrainedCommands {
    pub fn is_empty(&self) -> bool {
        self.actuator.is_none() && self.communication_test.is_none() && self.data_request.is_none()
    }

    pub fn classes(&self) -> Vec<CommandClass> {
        let mut classes = Vec::new();
        if self.actuator.is_some() {
            classes.push(CommandClass::Actuator);
        }
        if self.communication_test.is_some() {
            classes.push(CommandClass::CommunicationTest);
        }
        if self.data_request.is_some() {
            classes.push(CommandClass::DataRequest);
        }
        classes
    }

    fn put(&mut self, command: Command) {
        match command {
            Command::Actuator(action) => self.actuator = Some(action),
            Command::CommunicationTest => self.communication_test = Some(true),
            Command::DataRequest => self.data_request = Some(true),
        }
    }
}

// ==============================================================================
// the inbox
// ==============================================================================

#[derive(Clone, Debug, Default)]
pub struct CommandInbox {
    slots: [Option<Command>; CommandClass::ALL.len()],
}

impl CommandInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a command in its class slot. Returns the command it displaced,
    /// which will now never be delivered.
    pub fn enqueue(&mut self, command: Command) -> Option<Command> {
        self.slots[command.class().slot()].replace(command)
    }

    /// Take every pending command and leave all slots empty.
    pub fn drain_all(&mut self) -> DrainedCommands {
        let mut drained = DrainedCommands::default();
        for slot in self.slots.iter_mut() {
            if let Some(command) = slot.take() {
                drained.put(command);
            }
        }
        drained
    }

    /// Look without consuming.
    pub fn peek(&self, class: CommandClass) -> Option<&Command> {
        self.slots[class.slot()].as_ref()
    }

    pub fn pending(&self) -> Vec<CommandClass> {
        CommandClass::ALL
            .into_iter()
            .filter(|class| self.peek(*class).is_some())
            .collect()
    }
}

// ==============================================================================
// actuator display state
// ==============================================================================
// what the dashboard shows for the led. it tracks operator intent, not
// confirmed device state: the device never reports its led back.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LedStatus {
    On,
    Off,
    Blinking,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ActuatorDisplay {
    pub led_state: bool,
    pub led_status: LedStatus,
}

impl Default for ActuatorDisplay {
    fn default() -> Self {
        Self { led_state: false, led_status: LedStatus::Off }
    }
}

impl ActuatorDisplay {
    pub fn apply(&mut self, action: ActuatorAction) {
        (self.led_state, self.led_status) = match action {
            ActuatorAction::On => (true, LedStatus::On),
            ActuatorAction::Off => (false, LedStatus::Off),
            ActuatorAction::Blink => (true, LedStatus::Blinking),
            ActuatorAction::Toggle => {
                let on = !self.led_state;
                (on, if on { LedStatus::On } else { LedStatus::Off })
            }
        };
    }
}
