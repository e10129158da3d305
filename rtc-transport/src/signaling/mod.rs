//! JSON envelope for relaying candidates over a text signaling channel.
//!
//! The transport does not depend on this format. It lets an owner route a
//! candidate received from the remote peer to the transport of the same name.


use crate::candidate::Candidate;
use serde::{Deserialize, Serialize};
use shared::error::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportSignal {
    pub transport_name: String,
    pub candidate: Candidate,
}

impl TransportSignal {
    pub fn new(transport_name: impl Into<String>, candidate: Candidate) -> Self {
        Self {
            transport_name: transport_name.into(),
            candidate,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::ErrMalformedSignal(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let signal: Self =
            serde_json::from_str(json).map_err(|e| Error::ErrMalformedSignal(e.to_string()))?;
        if signal.transport_name.is_empty() {
            return Err(Error::ErrMalformedSignal("empty transport name".to_owned()));
        }
        signal.candidate.validate()?;
        Ok(signal)
    }
}
