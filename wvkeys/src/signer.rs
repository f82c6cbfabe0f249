//! Request signing capability.

use crate::Result;

/// Signs license request bodies.
///
/// The key source hands over the exact serialized request bytes and never
/// re-encodes them: the server verifies the signature over the same bytes
/// it finds in the `request` field of the signed envelope. Each fetch
/// attempt signs afresh, so a signer with internal freshness rules stays
/// correct across retries.
///
/// A signature failure is fatal: the fetch stops before any network
/// traffic and surfaces [`Error::Internal`](crate::Error::Internal).
pub trait RequestSigner: Send + Sync {
    /// Signer identity sent alongside the signature.
    fn name(&self) -> &str;

    /// Produces a signature over `request`.
    fn generate_signature(&self, request: &[u8]) -> Result<Vec<u8>>;
}
