use anyhow::{bail, Context, Result};
use flate2::{Decompress, FlushDecompress, Status};

use crate::macho::load::{Section, Segment};
use crate::macho::read::File;
use crate::macho::{round_up, ByteOrder};

/// Prefix marking a zlib-compressed debug section; the 12-byte header
/// is "ZLIB" followed by the big-endian uncompressed length.
const COMPRESSED_PREFIX: &str = "__z";
const ZLIB_HEADER_SIZE: u64 = 12;

impl File<'_> {
    /// Size of the section once uncompressed, header included. Sections
    /// without the "__z" name prefix or the "ZLIB" marker report their
    /// declared size.
    ///
    /// # Errors
    /// Fails when a compressed section is too short to hold its header.
    pub fn section_uncompressed_size(&self, s: &Section) -> Result<u64> {
        if !s.name.starts_with(COMPRESSED_PREFIX) {
            return Ok(s.size);
        }
        let view = self.section_data(s);
        if (view.len() as u64) < ZLIB_HEADER_SIZE {
            bail!("malformed compressed section {}: truncated header", s.name);
        }
        if &view[..4] == b"ZLIB" {
            return Ok(ZLIB_HEADER_SIZE + ByteOrder::Big.u64(&view[4..]));
        }
        Ok(s.size)
    }

    /// Writes the section's uncompressed form at the front of `dest`
    /// and returns the number of bytes written. An uncompressed section
    /// is copied verbatim; a compressed one keeps its 12-byte header
    /// followed by the inflated payload, so exactly
    /// [`Self::section_uncompressed_size`] bytes are produced. `dest`
    /// must be at least that long.
    ///
    /// # Errors
    /// Fails when the deflate stream is corrupt or does not produce the
    /// length its header declares.
    pub fn put_uncompressed_data(&self, s: &Section, dest: &mut [u8]) -> Result<u64> {
        let view = self.section_data(s);
        if !s.name.starts_with(COMPRESSED_PREFIX) {
            dest[..view.len()].copy_from_slice(view);
            return Ok(view.len() as u64);
        }
        let total = self.section_uncompressed_size(s)?;
        if &view[..4] != b"ZLIB" {
            dest[..view.len()].copy_from_slice(view);
            return Ok(view.len() as u64);
        }

        let header = ZLIB_HEADER_SIZE as usize;
        let inflated = (total - ZLIB_HEADER_SIZE) as usize;
        dest[..header].copy_from_slice(&view[..header]);
        let mut decoder = Decompress::new(true);
        let status = decoder
            .decompress(
                &view[header..],
                &mut dest[header..header + inflated],
                FlushDecompress::Finish,
            )
            .with_context(|| format!("invalid zlib data in section {}", s.name))?;
        if !matches!(status, Status::StreamEnd) || decoder.total_out() != inflated as u64 {
            bail!(
                "section {} inflated to {} bytes, header declared {}",
                s.name,
                decoder.total_out(),
                inflated
            );
        }
        Ok(total)
    }

    /// Sum of the segment's sections' uncompressed sizes, rounded up to
    /// the power-of-two `align`.
    ///
    /// # Errors
    /// Propagates any malformed compressed-section header.
    pub fn segment_uncompressed_size(&self, seg: &Segment, align: u64) -> Result<u64> {
        let mut sz = 0;
        for i in seg.firstsect..seg.firstsect + seg.nsect {
            sz += self.section_uncompressed_size(&self.toc.sections[i as usize])?;
        }
        Ok(round_up(sz, align))
    }
}
