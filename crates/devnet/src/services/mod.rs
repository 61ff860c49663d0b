//! Services the devnet is built from.
//!
//! Each service is in its own submodule with:
//! - `cmd.rs` - Command builder for the service's arguments
//! - `mod.rs` - Config, Handler, and start logic

pub mod anvil;
pub mod forge;
pub mod l2_node;
pub mod op_stack;

// Re-export commonly used types
pub use anvil::{ANVIL_CHAIN_ID, AnvilConfig, AnvilHandler};
pub use forge::ForgeConfig;
pub use l2_node::{
    ExternalL2Node, L2_CHAIN_ID, L2Genesis, L2Listeners, L2Node, L2NodeDeps, L2Stores,
    TxAdapters,
};
pub use op_stack::{DependentStack, LaunchContext, OpStack, ServiceBinary, StackInputs};
