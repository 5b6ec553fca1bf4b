//! Stateless request handlers over the shared key material and registry

mod issuance;
mod signing;
mod verification;

pub use issuance::{IssuanceEngine, IssuancePolicy};
pub use signing::{SignatureRecord, SigningEngine, SigningMetadata};
pub use verification::{VerificationEngine, VerificationResult};
