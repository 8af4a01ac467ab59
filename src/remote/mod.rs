//! Remote session channel.
//!
//! A session is two single-slot mailboxes under a shared id: `control`
//! carries the latest [`RemoteCommand`], `answer` the latest
//! [`BroadcastAnswer`]. Writes overwrite, observers see only the newest
//! value. The server hosts the slots in a [`SessionHub`]; devices reach them
//! through a [`SessionChannel`].

pub mod channel;
pub mod controller;
pub mod listener;
pub mod mailbox;
pub mod primary;
pub mod session;
pub mod sse;

pub use self::channel::{HttpSessionChannel, LocalSessionChannel, SessionChannel};
pub use self::controller::{RemoteController, RemoteStatus};
pub use self::listener::{CommandDeduper, CommandHandler, RemoteControlListener};
pub use self::mailbox::Mailbox;
pub use self::primary::{CaptureDriver, run_primary};
pub use self::session::{BroadcastAnswer, CommandAction, RemoteCommand, SessionHub, SessionSlots};
