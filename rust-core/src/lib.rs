// Points-currency chat commands for a streaming-bot host.
// The host owns the user database, the ledger, chat delivery and permissions;
// everything here talks to it through the capability traits in `host`.

pub mod command;
pub mod error;
pub mod host;
pub mod math;
#[cfg(feature = "overlay")]
pub mod overlay;
pub mod raffle;
pub mod routing;
pub mod scripts;
pub mod settings;

/// Name of the websocket event the donate script broadcasts.
pub const EVENT_DONATION: &str = "EVENT_DONATION";

// Time is injected through `host::Clock`; the core never reads the wall clock.

/*
Intentionally avoids:
- async
- global mutable state
- direct chat or ledger IO (all of it goes through `host`)
*/
