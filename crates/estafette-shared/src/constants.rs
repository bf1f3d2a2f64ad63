/// Default TCP port the server listens on.
pub const DEFAULT_PORT: u16 = 7777;

/// RSA modulus size in bits for the per-connection key pairs.
pub const RSA_KEY_BITS: usize = 2048;

/// Length in bytes of the RSA-wrapped symmetric key at the head of every
/// envelope. Equal to the modulus size; both ends split the wire buffer at
/// this offset, so it is a protocol constant rather than a derived value.
pub const WRAPPED_KEY_SIZE: usize = RSA_KEY_BITS / 8;

/// XChaCha20-Poly1305 nonce size in bytes.
pub const NONCE_SIZE: usize = 24;

/// Symmetric key size in bytes (XChaCha20-Poly1305).
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Maximum length of a single wire frame (length prefix excluded).
pub const MAX_FRAME_SIZE: usize = 262_144;

/// Fixed salt mixed into session-token derivation.
pub const TOKEN_SALT: &str = "estafette-session-token-v1";

/// BLAKE3 derivation context for password hashing.
pub const KDF_CONTEXT_PASSWORD: &str = "estafette-password-v1";
