//! Type-safe identifiers.
//!
//! Districts are identified by the small integer id assigned by the city
//! (`kecamatan_id` on the wire). Everything generated locally -- streaming
//! clients, incident and resident rows -- uses UUID v7 (time-ordered).

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Identifier of one open broadcast stream connection.
    ClientId
}

define_id! {
    /// Identifier of an incident row in a district database.
    IncidentId
}

define_id! {
    /// Identifier of a resident row in a district database.
    ResidentId
}

/// Identifier of a district (`kecamatan_id`).
///
/// Assigned by the city when a district is registered in the sync
/// configuration. It is the unique key of both aggregate tables.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(transparent)]
#[ts(export, export_to = "bindings/")]
pub struct DistrictId(pub u32);

impl DistrictId {
    /// Return the raw numeric id.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The id widened to the `BIGINT` column type used in `PostgreSQL`.
    pub fn as_i64(self) -> i64 {
        i64::from(self.0)
    }
}

impl core::fmt::Display for DistrictId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for DistrictId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl TryFrom<i64> for DistrictId {
    type Error = core::num::TryFromIntError;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        u32::try_from(id).map(Self)
    }
}
