//! # Remote References
//!
//! The leaf primitive: an address into a foreign process plus a validity
//! predicate, and the single capability the core consumes from its
//! environment, a read that never fails destructively.
//!
//! ```text
//!   RemoteRef { address }  ──valid iff──>  address > RESERVED_LOW_THRESHOLD
//!
//!   RemoteMemory::read_into(address, buf) -> bool
//!        │
//!        └── GraphReader::read::<T>()  ──fault──>  T::zeroed()
//! ```

use serde::{Deserialize, Serialize};
use sightline_shared::constants::RESERVED_LOW_THRESHOLD;

/// An address-only handle into the remote graph.
///
/// A `RemoteRef` is a location, not a resource. The remote process owns the
/// memory behind it and may invalidate it between any two reads.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RemoteRef {
    /// Raw address in the remote process.
    pub address: u64,
}

impl RemoteRef {
    /// The canonical invalid reference.
    pub const INVALID: Self = Self::new(0);

    /// Wraps a raw address.
    #[inline]
    #[must_use]
    pub const fn new(address: u64) -> Self {
        Self { address }
    }

    /// True when the address clears the reserved low range.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.address > RESERVED_LOW_THRESHOLD
    }

    /// Address of a field `offset` bytes into the referenced object.
    #[inline]
    #[must_use]
    pub const fn field(self, offset: u64) -> u64 {
        self.address.wrapping_add(offset)
    }
}

impl From<u64> for RemoteRef {
    fn from(address: u64) -> Self {
        Self::new(address)
    }
}

impl std::fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.address)
    }
}

/// Raw read access to a foreign address space.
///
/// Implementations must be safe to call concurrently from several threads and
/// must never panic: any fault (unmapped page, access violation, the target
/// exiting mid-read) is reported as `false`.
pub trait RemoteMemory: Send + Sync {
    /// Fills `buf` with the bytes at `address`.
    ///
    /// Returns `false` on any fault. The contents of `buf` are unspecified
    /// after a failed read; callers zero it.
    fn read_into(&self, address: u64, buf: &mut [u8]) -> bool;
}

impl<M: RemoteMemory + ?Sized> RemoteMemory for std::sync::Arc<M> {
    fn read_into(&self, address: u64, buf: &mut [u8]) -> bool {
        (**self).read_into(address, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_threshold() {
        assert!(!RemoteRef::INVALID.is_valid());
        assert!(!RemoteRef::new(RESERVED_LOW_THRESHOLD).is_valid());
        assert!(RemoteRef::new(RESERVED_LOW_THRESHOLD + 1).is_valid());
    }

    #[test]
    fn test_field_wraps() {
        let r = RemoteRef::new(u64::MAX);
        assert_eq!(r.field(2), 1);
        assert_eq!(RemoteRef::new(0x2000_0000).field(0x10), 0x2000_0010);
    }

    #[test]
    fn test_display_is_hex() {
        assert_eq!(RemoteRef::new(0x1234_5678).to_string(), "0x12345678");
    }
}
