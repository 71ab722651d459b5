//! mochi-core: command dispatch, permissions and the legacy QQ packet codec
//! behind the mochi chat bot.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//!
//! use mochi_core::command::{
//!     register_builtin_commands, CollectingSender, CommandExecutor, CommandOwner,
//!     CommandRegistry,
//! };
//! use mochi_core::permission::PermissionService;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let permissions = Arc::new(PermissionService::new());
//! let registry = Arc::new(CommandRegistry::new("/"));
//! let owner = CommandOwner::console(&permissions)?;
//! register_builtin_commands(&registry, &permissions, &owner, Arc::new(AtomicBool::new(false)))?;
//!
//! let executor = CommandExecutor::new(registry, permissions);
//! let sender = Arc::new(CollectingSender::console());
//! let result = executor.execute_command(sender.clone(), "/help", true).await;
//! assert!(result.is_success());
//! println!("{}", sender.transcript());
//! # Ok(())
//! # }
//! ```
//!
//! Protocol decoding is independent of the command side:
//!
//! ```no_run
//! use mochi_core::protocol::{decode_frame, KeyRing, TeaKey};
//!
//! # fn run(raw: &[u8], key: TeaKey) {
//! match decode_frame(raw, &KeyRing::uniform(key)) {
//!     Ok(packet) => println!("{:?}", packet),
//!     Err(failure) => eprintln!("{}", failure),
//! }
//! # }
//! ```

pub mod command;
pub mod config;
pub mod message;
pub mod permission;
pub mod protocol;

pub use command::{CommandExecuteResult, CommandExecutor, CommandRegistry};
pub use config::{Config, ConfigError};
pub use message::{MessageChain, MessageElement};
pub use permission::{PermissionId, PermissionService, PermitteeId};
pub use protocol::{ServerPacket, decode_frame};
