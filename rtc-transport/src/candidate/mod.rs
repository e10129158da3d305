
use serde::{Deserialize, Serialize};
use shared::TransportProtocol;
use shared::error::*;
use shared::util::generate_crypto_random_string;
use std::fmt;
use std::net::SocketAddr;

const RUNES_CANDIDATE_ID_FOUNDATION: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789/+";
const RUNES_ALPHA: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

const LEN_UFRAG: usize = 16;
const LEN_PWD: usize = 32;

pub(crate) const DEFAULT_LOCAL_PREFERENCE: u16 = 65535;

/// The only component a stream transport uses.
pub const COMPONENT_RTP: u16 = 1;

/// Represents the type of candidate `CandidateType` enum.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateType {
    #[default]
    #[serde(rename = "unspecified")]
    Unspecified,
    #[serde(rename = "host")]
    Host,
    #[serde(rename = "srflx")]
    ServerReflexive,
    #[serde(rename = "prflx")]
    PeerReflexive,
    #[serde(rename = "relay")]
    Relay,
}

// String makes CandidateType printable
impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            CandidateType::Host => "host",
            CandidateType::ServerReflexive => "srflx",
            CandidateType::PeerReflexive => "prflx",
            CandidateType::Relay => "relay",
            CandidateType::Unspecified => "Unknown candidate type",
        };
        write!(f, "{s}")
    }
}

impl CandidateType {
    /// Returns the preference weight of a `CandidateType`.
    ///
    /// 4.1.2.2.  Guidelines for Choosing Type and Local Preferences
    /// The RECOMMENDED values are 126 for host candidates, 100
    /// for server reflexive candidates, 110 for peer reflexive candidates,
    /// and 0 for relayed candidates.
    #[must_use]
    pub const fn preference(self) -> u16 {
        match self {
            Self::Host => 126,
            Self::PeerReflexive => 110,
            Self::ServerReflexive => 100,
            Self::Relay | CandidateType::Unspecified => 0,
        }
    }

    /// Whether gathering this type needs a STUN or relay server.
    #[must_use]
    pub const fn is_server_assisted(self) -> bool {
        matches!(self, Self::ServerReflexive | Self::Relay)
    }
}

/// <https://tools.ietf.org/html/rfc5245#section-15.1>
/// candidate-id = "candidate" ":" foundation
/// foundation   = 1*32ice-char
/// ice-char     = ALPHA / DIGIT / "+" / "/"
pub fn generate_cand_id() -> String {
    format!(
        "candidate:{}",
        generate_crypto_random_string(32, RUNES_CANDIDATE_ID_FOUNDATION)
    )
}

/// Generates an ICE user fragment.
pub fn generate_ufrag() -> String {
    generate_crypto_random_string(LEN_UFRAG, RUNES_ALPHA)
}

/// Generates an ICE password.
pub fn generate_pwd() -> String {
    generate_crypto_random_string(LEN_PWD, RUNES_ALPHA)
}

/// The config required to create a new `Candidate`.
#[derive(Default)]
pub struct CandidateConfig {
    pub candidate_id: String,
    pub candidate_type: CandidateType,
    pub protocol: TransportProtocol,
    pub address: Option<SocketAddr>,
    pub related_address: Option<SocketAddr>,
    pub component: u16,
    pub priority: u32,
    pub foundation: String,
    pub username: String,
    pub password: String,
    pub generation: u32,
}

impl CandidateConfig {
    /// Creates a new candidate, filling in id, foundation, priority and
    /// credentials when they were left empty.
    pub fn new_candidate(self) -> Result<Candidate> {
        let address = self.address.ok_or(Error::ErrNoSuchAddress)?;
        if address.port() == 0 {
            return Err(Error::ErrInvalidPortNumber);
        }
        if self.candidate_type == CandidateType::Unspecified {
            return Err(Error::ErrUnknownCandidateType);
        }

        let component = if self.component == 0 {
            COMPONENT_RTP
        } else {
            self.component
        };

        let mut c = Candidate {
            id: if self.candidate_id.is_empty() {
                generate_cand_id()
            } else {
                self.candidate_id
            },
            candidate_type: self.candidate_type,
            protocol: self.protocol,
            address,
            related_address: self.related_address,
            component,
            priority: self.priority,
            foundation: self.foundation,
            username: self.username,
            password: self.password,
            generation: self.generation,
        };

        if c.priority == 0 {
            c.priority = c.compute_priority();
        }
        if c.foundation.is_empty() {
            c.foundation = generate_crypto_random_string(8, RUNES_CANDIDATE_ID_FOUNDATION);
        }
        if c.username.is_empty() {
            c.username = generate_ufrag();
        }
        if c.password.is_empty() {
            c.password = generate_pwd();
        }

        Ok(c)
    }
}

/// One transport address offered during connectivity establishment.
///
/// Candidates are plain values: they are produced by the local ICE channel,
/// relayed to the remote peer by the owner's signaling channel and fed back in
/// on the other side.
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub(crate) id: String,
    #[serde(rename = "type")]
    pub(crate) candidate_type: CandidateType,
    pub(crate) protocol: TransportProtocol,
    pub(crate) address: SocketAddr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) related_address: Option<SocketAddr>,
    pub(crate) component: u16,
    pub(crate) priority: u32,
    pub(crate) foundation: String,
    pub(crate) username: String,
    pub(crate) password: String,
    #[serde(default)]
    pub(crate) generation: u32,
}

// String makes the Candidate printable
impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(related_address) = self.related_address {
            write!(
                f,
                "{} {} {} related {}",
                self.protocol, self.candidate_type, self.address, related_address,
            )
        } else {
            write!(f, "{} {} {}", self.protocol, self.candidate_type, self.address)
        }
    }
}

impl Candidate {
    /// Shorthand for a UDP host candidate on `address`.
    pub fn host(address: SocketAddr) -> Result<Self> {
        CandidateConfig {
            candidate_type: CandidateType::Host,
            address: Some(address),
            ..Default::default()
        }
        .new_candidate()
    }

    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    pub fn candidate_type(&self) -> CandidateType {
        self.candidate_type
    }

    pub fn protocol(&self) -> TransportProtocol {
        self.protocol
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// For server reflexive and relayed candidates, the base address they were
    /// derived from.
    pub fn related_address(&self) -> Option<SocketAddr> {
        self.related_address
    }

    pub fn component(&self) -> u16 {
        self.component
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn foundation(&self) -> &str {
        self.foundation.as_str()
    }

    pub fn username(&self) -> &str {
        self.username.as_str()
    }

    pub fn password(&self) -> &str {
        self.password.as_str()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Checks a candidate that did not come from [`CandidateConfig`], such as
    /// one deserialized from a remote peer's signal.
    pub fn validate(&self) -> Result<()> {
        if self.address.port() == 0 {
            return Err(Error::ErrInvalidPortNumber);
        }
        if self.candidate_type == CandidateType::Unspecified {
            return Err(Error::ErrUnknownCandidateType);
        }
        Ok(())
    }

    /// Two candidates are the same transport address if type, protocol and
    /// address match; ids and credentials are ignored.
    pub fn equal(&self, other: &Candidate) -> bool {
        self.candidate_type == other.candidate_type
            && self.protocol == other.protocol
            && self.address == other.address
            && self.related_address == other.related_address
    }

    fn compute_priority(&self) -> u32 {
        // The local preference MUST be an integer from 0 (lowest preference) to
        // 65535 (highest preference) inclusive. When there is only a single IP
        // address, this value SHOULD be set to 65535.
        (1 << 24) * u32::from(self.candidate_type.preference())
            + (1 << 8) * u32::from(DEFAULT_LOCAL_PREFERENCE)
            + (256 - u32::from(self.component))
    }
}
