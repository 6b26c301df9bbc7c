//! 64-bit profiling identifiers.
//!
//! Two flavors share the [`Guid`] representation. *Dynamic* guids come from a
//! monotonic sequence and are unique within a process run; they identify
//! entities and events created at runtime. *Static* guids are a deterministic
//! hash of a string, so independently-built components agree on the guid of a
//! well-known name without coordination. Bit 63 marks static guids, keeping
//! the two spaces disjoint.

#[cfg(test)]
mod test;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Marker bit separating the static guid space from the dynamic one.
const STATIC_GUID_BIT: u64 = 1 << 63;

/// 64-bit opaque identifier referenced by timeline records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Guid(pub u64);

impl Guid {
    /// Whether this guid was derived from a string hash.
    pub fn is_static(self) -> bool {
        self.0 & STATIC_GUID_BIT != 0
    }
}

impl From<u64> for Guid {
    fn from(raw: u64) -> Guid {
        Guid(raw)
    }
}

impl From<Guid> for u64 {
    fn from(guid: Guid) -> u64 {
        guid.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Produces dynamic (sequential) and static (string-hashed) guids.
///
/// The service owns one process-wide generator; tests reset it explicitly via
/// [`reset`][GuidGenerator::reset].
pub struct GuidGenerator {
    sequence: AtomicU64,
}

impl GuidGenerator {
    pub fn new() -> GuidGenerator {
        GuidGenerator {
            sequence: AtomicU64::new(0),
        }
    }

    /// Returns the next dynamic guid in the sequence.
    ///
    /// Never collides within a run: the sequence is a single atomic counter
    /// and the static marker bit is kept clear.
    pub fn next_guid(&self) -> Guid {
        Guid(self.sequence.fetch_add(1, Ordering::Relaxed) & !STATIC_GUID_BIT)
    }

    /// Derives the static guid for `text`.
    ///
    /// Same string, same guid, on every run and in every process.
    pub fn static_guid(&self, text: &str) -> Guid {
        static_guid(text)
    }

    /// Restarts the dynamic sequence. Only valid during a full service reset.
    pub fn reset(&self) {
        self.sequence.store(0, Ordering::Relaxed);
    }
}

impl Default for GuidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives the static guid for `text` without a generator at hand.
///
/// Well-known timeline labels are declared through this at first use.
pub fn static_guid(text: &str) -> Guid {
    Guid(fnv1a(text.as_bytes()) | STATIC_GUID_BIT)
}

// FNV-1a, 64 bit. Stable across platforms and runs, which DefaultHasher does
// not promise across Rust releases.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET_BASIS;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
