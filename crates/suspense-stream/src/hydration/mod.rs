pub mod boot;
pub mod client;
pub mod scripts;

pub use boot::{BootLatch, BootOutcome};
pub use client::{ClientMirror, SyncRecord};
pub use scripts::{BOOT_DIRECTIVE, SyncKind, boot_script, cache_sync_node, cache_sync_script};
