//! rollnet-devnet - Local rollup devnet orchestration.
//!
//! This crate brings up an L1 simulator, deploys the rollup contracts to it,
//! starts an L2 node anchored to the resulting L1 state, and launches the
//! dependent stack on top. See [`Stack::run`] for the stage order.

mod endpoint;
pub mod events;
pub mod genesis;
mod key;
mod lifecycle;
mod probe;
mod process;
pub mod rpc;
pub mod services;
mod stack;
mod stage;

pub use endpoint::{BoundListener, Endpoint, EndpointAllocator, ListenerState};
pub use events::{EventListener, LoggingListener, SelectiveListener};
pub use key::{FUNDING_ETH, ONE_ETH_WEI, TestKey, funding_amount};
pub use lifecycle::{CleanupFailure, Lifecycle, ReleaseReport};
pub use process::{ProcessSpec, Supervised, Supervisor};
pub use stack::{CONFIG_FILENAME, Devnet, L2_GENESIS_NUMBER, RunOutcome, Stack, StackConfig};
pub use stage::{Cancelled, Stage, cancellable, is_cancelled};
