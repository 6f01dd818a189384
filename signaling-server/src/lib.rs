/*!
Signaling relay for [gant-meet](../gant_meet/index.html) calls.

Peers connect over a WebSocket, join a named room and exchange offers, answers and
ICE candidates through the relay until their media flows directly between browsers.
The relay only knows who is connected and who sits in which room.
*/

#![warn(clippy::pedantic, clippy::unwrap_used, clippy::dbg_macro)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod registry;
pub mod relay;
pub mod router;
pub mod server;

pub type Result<T> = anyhow::Result<T>;
