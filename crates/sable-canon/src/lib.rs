//! # sable-canon
//!
//! Byte-stable canonical JSON serialization and content-hash integrity
//! checking for SABLE bundle payloads.
//!
//! ## Module Roles
//!
//! | Module | Responsibility | Public Entry Points |
//! |---|---|---|
//! | `canon` | Deterministic JSON encoding | [`canonicalize`], [`write_canonical`] |
//! | `integrity` | Content hashing and verification | [`hash_bytes`], [`hash_json`], [`verify`], [`ContentHash`] |
//!
//! ## Contract
//!
//! The canonical form is the wire format consumed by [`hash_json`]: object
//! keys in ascending code-point order, arrays in insertion order, no
//! whitespace, integral floats collapsed to integer form, non-finite floats
//! encoded as `null`. Two values hash equal exactly when their canonical
//! encodings are byte-identical.
//!
//! ```no_run
//! use sable_canon::{canonicalize, hash_json, HashAlgorithm};
//! use serde_json::json;
//!
//! let doc = json!({"b": 1, "a": [3, 2, 1], "c": null});
//! assert_eq!(canonicalize(&doc), r#"{"a":[3,2,1],"b":1,"c":null}"#);
//!
//! let digest = hash_json(&doc, HashAlgorithm::Sha256);
//! assert!(digest.to_string().starts_with("sha-256:"));
//! ```

pub mod canon;
pub mod integrity;

pub use canon::{canonicalize, write_canonical};
pub use integrity::{
    hash_bytes, hash_json, hash_string, verify, ContentHash, HashAlgorithm, IntegrityError,
};
