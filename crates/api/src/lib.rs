//! Backend bridge: a pooled HTTP session, sensory sends with bounded retry,
//! command polling and dispatch to registered handlers.

pub mod bridge;
pub mod dispatch;
pub mod session;

pub use bridge::{ApiBridge, COMMAND_POLL_PATH, SENSORY_PATH, STATUS_PATH};
pub use dispatch::{
    async_handler_fn, handler_fn, AsyncFnHandler, CallbackRegistry, CommandHandler,
    DispatchOutcome, FnHandler,
};
pub use session::{build_http_client, TransportSession};
