//! Client-side join adapter for Conclave sessions.
//!
//! Given a connected [`SessionTransport`] and a [`LocalTerminal`],
//! [`JoinedSession`] negotiates the join handshake, wires the terminal to
//! the remote stream, forwards window resizes in both directions,
//! interprets the control keys (`Ctrl-C` leaves, `t` force-terminates),
//! and, when the server demands MFA presence and the local mode is
//! moderator, runs the presence challenge loop against a
//! [`PresenceAuthClient`].

mod error;
mod presence;
mod session;
mod terminal;
mod transport;

pub use error::ClientError;
pub use presence::PresenceAuthClient;
pub use session::{expand_modes, JoinOptions, JoinedSession};
pub use terminal::LocalTerminal;
pub use transport::{ClientHandshake, ServerHandshake, SessionTransport};
