//! Token claims and the signing/verification codec.

mod claims;
mod codec;

pub use claims::{TokenClaims, TokenKind};
pub use codec::{RejectReason, TokenCodec, Verification};
