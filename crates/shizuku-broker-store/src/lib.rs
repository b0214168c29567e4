//! # Shizuku Broker Store
//!
//! Encrypted persistent storage for grant records and audit events.
//!
//! ## Storage layout
//!
//! Each platform user gets two files under the base directory:
//!
//! ```text
//!   {base}/grants_u{user}.json   (sealed)
//!   {base}/audit_u{user}.json    (sealed)
//! ```
//!
//! Each file is a CBOR envelope (format tag, nonce, ciphertext) sealing a
//! JSON plaintext `{"version":1,"grants":[...]}` or
//! `{"version":1,"events":[...]}` with ChaCha20-Poly1305 keyed by the
//! platform master key.
//!
//! ## Error posture
//!
//! Missing files, decryption failures, and parse failures all read as empty
//! state; write failures are logged and swallowed. The in-memory engines
//! stay consistent and reissue state on the next transition.

pub mod error;
pub mod store;
pub mod vault;

pub use error::{Result, StoreError};
pub use store::{PermissionStore, MAX_AUDIT_ENTRIES};
pub use vault::{MasterKey, SealFormat, SealedEnvelope};
