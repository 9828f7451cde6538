use std::fmt;

/// Length of the asset GUID half of an identifier.
pub const GUID_LEN: usize = 16;
/// Length of the content-hash half of an identifier.
pub const HASH_LEN: usize = 16;
/// Length of a full identifier on the wire: GUID followed by hash.
pub const ID_LEN: usize = GUID_LEN + HASH_LEN;

/// Which of the three per-asset artifacts a request refers to.
///
/// The wire tag is a single byte; each variant maps to its own file
/// extension on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Variant {
    /// `'a'` - the binary payload, stored as `.bin`.
    Bin,
    /// `'i'` - the metadata blob, stored as `.info`.
    Info,
    /// `'r'` - the optional resource blob, stored as `.resource`.
    Resource,
}

impl Variant {
    /// Parses a wire tag. Anything outside `a`/`i`/`r` is a protocol error
    /// and yields `None`.
    pub fn from_tag(tag: u8) -> Option<Variant> {
        match tag {
            b'a' => Some(Variant::Bin),
            b'i' => Some(Variant::Info),
            b'r' => Some(Variant::Resource),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Variant::Bin => b'a',
            Variant::Info => b'i',
            Variant::Resource => b'r',
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Variant::Bin => "bin",
            Variant::Info => "info",
            Variant::Resource => "resource",
        }
    }
}

/// A 32-byte asset identifier: 16-byte GUID concatenated with a 16-byte
/// content hash. Both halves are opaque binary and render as lowercase hex
/// in filenames and logs.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetId([u8; ID_LEN]);

impl AssetId {
    pub fn new(raw: [u8; ID_LEN]) -> AssetId {
        AssetId(raw)
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    pub fn guid_hex(&self) -> String {
        hex::encode(&self.0[..GUID_LEN])
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(&self.0[GUID_LEN..])
    }

    /// Two-character sharding directory: the first hex byte of the GUID.
    pub fn shard(&self) -> String {
        hex::encode(&self.0[..1])
    }

    /// On-disk base name plus extension, `<guid>-<hash>.<ext>`.
    pub fn file_name(&self, variant: Variant) -> String {
        format!(
            "{}-{}.{}",
            self.guid_hex(),
            self.hash_hex(),
            variant.extension()
        )
    }

    /// Memory-tier owner key: the 66-character `<guid>-<hash><tag>` string.
    pub fn mem_key(&self, variant: Variant) -> String {
        format!(
            "{}-{}{}",
            self.guid_hex(),
            self.hash_hex(),
            variant.tag() as char
        )
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.guid_hex(), self.hash_hex())
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({self})")
    }
}
