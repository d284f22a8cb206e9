//! Config Codec
//!
//! Structured specs are stored as opaque text inside Config and Node rows.
//! Every spec type round-trips through [`Codec`]: `marshal` on the write
//! path, `unmarshal` whenever a handler needs the structured value back.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::domain::config::{KubernetesSpec, NetworkSpec, RuntimeSpec};
use crate::domain::node::NodeAuth;

/// Errors raised while encoding or decoding a stored spec
#[derive(Debug, Error)]
pub enum CodecError {
    /// Nothing was stored where a spec was expected
    #[error("{kind} is empty")]
    Empty { kind: &'static str },

    /// Stored text could not be decoded
    #[error("failed to decode {kind}: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Value could not be encoded
    #[error("failed to encode {kind}: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Round-trip contract between a structured spec and its stored text
pub trait Codec: Serialize + DeserializeOwned + Sized {
    /// Name used in error messages
    const KIND: &'static str;

    fn marshal(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(|source| CodecError::Encode {
            kind: Self::KIND,
            source,
        })
    }

    fn unmarshal(raw: &str) -> Result<Self, CodecError> {
        if raw.trim().is_empty() {
            return Err(CodecError::Empty { kind: Self::KIND });
        }

        serde_json::from_str(raw).map_err(|source| CodecError::Decode {
            kind: Self::KIND,
            source,
        })
    }
}

impl Codec for KubernetesSpec {
    const KIND: &'static str = "kubernetes spec";
}

impl Codec for NetworkSpec {
    const KIND: &'static str = "network spec";
}

impl Codec for RuntimeSpec {
    const KIND: &'static str = "runtime spec";
}

impl Codec for NodeAuth {
    const KIND: &'static str = "node auth";
}
