//! Document identifier.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique identifier for a document.
///
/// Document IDs are 12-byte values laid out as:
/// - 4 bytes: big-endian seconds since the Unix epoch
/// - 5 bytes: per-process random component
/// - 3 bytes: big-endian monotonically increasing counter
///
/// The timestamp prefix makes generated IDs chronologically ordered,
/// so byte-wise comparison sorts documents by creation time.
///
/// The all-zero value is the distinguished [`DocumentId::EMPTY`], used
/// as the persisted image of an absent single-reference.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId([u8; 12]);

/// Per-process generation state: a random 5-byte machine/process
/// component and a counter with a random starting point.
struct Generator {
    process: [u8; 5],
    counter: AtomicU32,
}

fn generator() -> &'static Generator {
    static GENERATOR: OnceLock<Generator> = OnceLock::new();
    GENERATOR.get_or_init(|| Generator {
        process: rand::random(),
        counter: AtomicU32::new(rand::random::<u32>() & 0x00FF_FFFF),
    })
}

impl DocumentId {
    /// The distinguished empty identity.
    pub const EMPTY: Self = Self([0u8; 12]);

    /// Creates a document ID from raw bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Generates a new document ID.
    ///
    /// IDs generated by the same process are unique; IDs generated at
    /// least one second apart are strictly ordered.
    #[must_use]
    pub fn generate() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32;
        let gen = generator();
        let count = gen.counter.fetch_add(1, Ordering::Relaxed) & 0x00FF_FFFF;

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&gen.process);
        bytes[9..12].copy_from_slice(&count.to_be_bytes()[1..4]);
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }

    /// Creates a document ID from a slice.
    ///
    /// Returns `None` if the slice is not exactly 12 bytes.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() == 12 {
            let mut bytes = [0u8; 12];
            bytes.copy_from_slice(slice);
            Some(Self(bytes))
        } else {
            None
        }
    }

    /// Parses a document ID from its 24-character hex representation.
    #[must_use]
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 24 || !hex.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 12];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).ok()?;
            bytes[i] = u8::from_str_radix(pair, 16).ok()?;
        }
        Some(Self(bytes))
    }

    /// Returns true if this is the distinguished empty identity.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; 12]
    }

    /// Returns the embedded creation timestamp as seconds since the
    /// Unix epoch.
    #[must_use]
    pub fn timestamp_secs(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({self})")
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 12]> for DocumentId {
    fn from(bytes: [u8; 12]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<DocumentId> for [u8; 12] {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}
