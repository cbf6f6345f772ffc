//! # Core Ledger Identifiers
//!
//! Identifiers and tags shared by every ledger crate.
//!
//! ## Clusters
//!
//! - **Parties**: `MemberId`, `Caller`
//! - **Currencies**: `Currency` (closed tag over RP, SP, TBC, SH)
//! - **Records**: `EntryId`, `AllocationId`, `ConversionId`, `TransactionId`,
//!   `EventId`, `PurchaseId`
//! - **Allocation targets**: `TargetType`, `TargetId`, `AllocationTarget`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::TypeError;

/// Free-form structured metadata attached to ledger records.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// PARTIES
// =============================================================================

/// Member identifier as yielded by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    /// Wrap an authenticated member identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MemberId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The authenticated party invoking a ledger operation.
///
/// Session verification happens outside the ledger; by the time a call
/// arrives here the member and their admin flag are trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub member_id: MemberId,
    pub is_admin: bool,
}

impl Caller {
    /// A regular member.
    pub fn member(member_id: impl Into<MemberId>) -> Self {
        Self {
            member_id: member_id.into(),
            is_admin: false,
        }
    }

    /// A platform administrator.
    pub fn admin(member_id: impl Into<MemberId>) -> Self {
        Self {
            member_id: member_id.into(),
            is_admin: true,
        }
    }
}

// =============================================================================
// CURRENCIES
// =============================================================================

/// The closed set of point types held by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Reward Points: earned for contribution, spent only by burning.
    Rp,
    /// Support Points: governance signal, allocated and reclaimed.
    Sp,
    /// Timebank Credits: obtained from RP, moved through escrow.
    Tbc,
    /// Social Horizon: minted by burning RP during issuance events.
    Sh,
}

impl Currency {
    /// Every currency, in lock order.
    pub const ALL: [Currency; 4] = [Currency::Rp, Currency::Sp, Currency::Tbc, Currency::Sh];

    /// Short ticker used in logs and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Rp => "RP",
            Currency::Sp => "SP",
            Currency::Tbc => "TBC",
            Currency::Sh => "SH",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RP" => Ok(Currency::Rp),
            "SP" => Ok(Currency::Sp),
            "TBC" => Ok(Currency::Tbc),
            "SH" => Ok(Currency::Sh),
            _ => Err(TypeError::UnknownCurrency(s.to_string())),
        }
    }
}

// =============================================================================
// RECORD IDENTIFIERS
// =============================================================================

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|_| TypeError::InvalidId {
                        kind: stringify!($name),
                        value: s.to_string(),
                    })
            }
        }
    };
}

record_id!(
    /// Transaction log entry identifier.
    EntryId
);
record_id!(
    /// Support point allocation identifier.
    AllocationId
);
record_id!(
    /// RP to TBC conversion record identifier.
    ConversionId
);
record_id!(
    /// Escrowed timebank transaction identifier.
    TransactionId
);
record_id!(
    /// Timebank service offering identifier.
    ServiceId
);
record_id!(
    /// Social Horizon issuance event identifier.
    EventId
);
record_id!(
    /// Social Horizon purchase identifier.
    PurchaseId
);

// =============================================================================
// ALLOCATION TARGETS
// =============================================================================

/// Kind of thing support points are allocated to (`proposal`, `forum_topic`, ...).
///
/// Stored lowercase; only ASCII letters, digits and underscores are accepted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetType(String);

impl TargetType {
    /// Parse and normalise a target type.
    pub fn new(value: &str) -> Result<Self, TypeError> {
        let normalised = value.trim().to_ascii_lowercase();
        let well_formed = !normalised.is_empty()
            && normalised
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if well_formed {
            Ok(Self(normalised))
        } else {
            Err(TypeError::InvalidTargetType(value.to_string()))
        }
    }

    pub fn proposal() -> Self {
        Self("proposal".to_string())
    }

    pub fn topic() -> Self {
        Self("topic".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TargetType {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<TargetType> for String {
    fn from(value: TargetType) -> Self {
        value.0
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the allocation target within its type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A fully-qualified allocation target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AllocationTarget {
    pub target_type: TargetType,
    pub target_id: TargetId,
}

impl AllocationTarget {
    pub fn new(target_type: TargetType, target_id: impl Into<TargetId>) -> Self {
        Self {
            target_type,
            target_id: target_id.into(),
        }
    }

    /// Shorthand for a proposal target.
    pub fn proposal(target_id: impl Into<TargetId>) -> Self {
        Self::new(TargetType::proposal(), target_id)
    }
}

impl fmt::Display for AllocationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target_type, self.target_id)
    }
}
