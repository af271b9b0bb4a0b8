//! WS-Security plugins: username tokens, signatures, and composition.

pub mod compose;
pub mod signature;
pub mod username;
pub mod utils;

pub use compose::Compose;
pub use signature::{
    BinarySignature, BinarySignatureTimestamp, MemorySignature, Signature, TokenSigner,
};
pub use username::{PasswordType, UsernameToken};
pub use utils::get_security_header;
