//! Inbound push messages (machine state, new camera pictures).

mod message;

pub use message::{MachineState, MessageError, NewImageEvent, PluginMessage, PLUGIN_NAME};
