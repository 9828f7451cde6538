//! Field-level codecs for the cache wire protocol.
//!
//! The protocol carries no length prefixes on commands, so every syntactic
//! element has a fixed width and the reader must consume exactly that many
//! bytes. All framing therefore rests on two primitives: `read_exact` on
//! the way in and `write_all` on the way out, both looping until the full
//! field has moved or the transport fails. Sizes travel as 16 lowercase
//! ASCII hex characters encoding an 8-byte big-endian value; the handshake
//! uses 2 hex characters from the client and 8 from the server.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::CacheError;
use crate::id::{AssetId, Variant, ID_LEN};

/// Client half of the handshake: 2 ASCII hex characters.
pub const VERSION_REQUEST_LEN: usize = 2;
/// Server half of the handshake: the version echoed as 8 ASCII hex characters.
pub const VERSION_REPLY_LEN: usize = 8;
/// Width of a size field on the wire.
pub const SIZE_FIELD_LEN: usize = 16;

/// Response marker for a cache hit.
pub const HIT: u8 = b'+';
/// Response marker for a cache miss.
pub const MISS: u8 = b'-';

/// Parses the client's 2-hex-character version field. Parse failures are
/// not rejected; garbage decodes to 0 and echoes as `00000000`.
pub fn decode_version(field: &[u8; VERSION_REQUEST_LEN]) -> u32 {
    std::str::from_utf8(field)
        .ok()
        .and_then(|text| u32::from_str_radix(text, 16).ok())
        .unwrap_or(0)
}

pub fn encode_version(version: u32) -> [u8; VERSION_REPLY_LEN] {
    let mut out = [0u8; VERSION_REPLY_LEN];
    out.copy_from_slice(format!("{version:08x}").as_bytes());
    out
}

pub fn encode_size(size: u64) -> [u8; SIZE_FIELD_LEN] {
    let mut out = [0u8; SIZE_FIELD_LEN];
    out.copy_from_slice(format!("{size:016x}").as_bytes());
    out
}

pub fn decode_size(field: &[u8; SIZE_FIELD_LEN]) -> Result<u64, CacheError> {
    let text = std::str::from_utf8(field).map_err(|_| CacheError::BadSize)?;
    u64::from_str_radix(text, 16).map_err(|_| CacheError::BadSize)
}

/// Reads the 32-byte `guid|hash` identifier that follows `ts` and `g<v>`.
pub async fn read_id<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<AssetId> {
    let mut raw = [0u8; ID_LEN];
    reader.read_exact(&mut raw).await?;
    Ok(AssetId::new(raw))
}

/// Reads and parses the 16-hex-character size field of a PUT declaration.
pub async fn read_size<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u64, CacheError> {
    let mut field = [0u8; SIZE_FIELD_LEN];
    reader.read_exact(&mut field).await?;
    decode_size(&field)
}

/// Hit response header: `+<v>` + 16-hex size + the echoed 32-byte id.
/// Payload bytes follow separately.
pub fn hit_header(
    variant: Variant,
    size: u64,
    id: &AssetId,
) -> [u8; 2 + SIZE_FIELD_LEN + ID_LEN] {
    let mut out = [0u8; 2 + SIZE_FIELD_LEN + ID_LEN];
    out[0] = HIT;
    out[1] = variant.tag();
    out[2..2 + SIZE_FIELD_LEN].copy_from_slice(&encode_size(size));
    out[2 + SIZE_FIELD_LEN..].copy_from_slice(id.as_bytes());
    out
}

/// Miss response header: `-<v>` + the echoed 32-byte id. Nothing follows.
pub fn miss_header(variant: Variant, id: &AssetId) -> [u8; 2 + ID_LEN] {
    let mut out = [0u8; 2 + ID_LEN];
    out[0] = MISS;
    out[1] = variant.tag();
    out[2..].copy_from_slice(id.as_bytes());
    out
}
