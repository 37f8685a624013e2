// SPDX-License-Identifier: GPL-3.0-or-later

use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::flash_cfg::SpiFlashCfg;
use super::{check_crc, check_magic, read_exact, BlobError, FLASH_CFG_MAGIC};

/// Flash parameters as persisted in the boot header. `crc32` covers `cfg` only.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct BootFlashCfg {
    pub magic_code: U32,
    pub cfg: SpiFlashCfg,
    pub crc32: U32,
}

const _: () = assert!(std::mem::size_of::<BootFlashCfg>() == BootFlashCfg::SIZE);

impl BootFlashCfg {
    pub const SIZE: usize = 92;

    pub fn new(cfg: SpiFlashCfg) -> Self {
        Self::with_magic(FLASH_CFG_MAGIC, cfg)
    }

    pub fn with_magic(magic: u32, cfg: SpiFlashCfg) -> Self {
        let crc32 = crc32fast::hash(cfg.as_bytes());
        Self {
            magic_code: U32::new(magic),
            cfg,
            crc32: U32::new(crc32),
        }
    }

    pub fn computed_crc32(&self) -> u32 {
        crc32fast::hash(self.cfg.as_bytes())
    }

    pub fn verify(&self) -> Result<(), BlobError> {
        self.verify_with_magic(FLASH_CFG_MAGIC)
    }

    /// Rejects the blob on magic mismatch, CRC mismatch or an unknown I/O mode, in that order.
    pub fn verify_with_magic(&self, expected: u32) -> Result<(), BlobError> {
        check_magic("flash cfg", expected, self.magic_code.get())?;
        check_crc("flash cfg", self.crc32.get(), self.computed_crc32())?;
        self.cfg.io_mode()?;
        Ok(())
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, BlobError> {
        Self::parse_with_magic(bytes, FLASH_CFG_MAGIC)
    }

    pub fn parse_with_magic(bytes: &[u8], magic: u32) -> Result<Self, BlobError> {
        let blob: Self = read_exact("flash cfg", bytes)?;
        blob.verify_with_magic(magic)?;
        Ok(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};
    use pretty_assertions::assert_eq;
    use crate::flash_cfg::{w25q32, FlashCfgError};

    #[test]
    fn layout_is_stable() {
        assert_eq!(size_of::<BootFlashCfg>(), 92);
        assert_eq!(offset_of!(BootFlashCfg, cfg), 4);
        assert_eq!(offset_of!(BootFlashCfg, crc32), 88);
    }

    #[test]
    fn crc_covers_the_embedded_record_only() {
        let blob = BootFlashCfg::new(w25q32());
        let bytes = blob.as_bytes();
        assert_eq!(&bytes[..4], b"FCFG");
        assert_eq!(blob.crc32.get(), crc32fast::hash(&bytes[4..88]));
        assert_eq!(&bytes[88..], &blob.crc32.get().to_le_bytes());
    }

    #[test]
    fn parses_what_it_wrote() {
        let blob = BootFlashCfg::new(w25q32());
        let parsed = BootFlashCfg::parse(blob.as_bytes()).unwrap();
        assert_eq!(parsed, blob);
    }

    #[test]
    fn accepts_custom_magic_and_rejects_flipped_byte() {
        const MAGIC: u32 = 0x4642_504C;
        let blob = BootFlashCfg::with_magic(MAGIC, w25q32());
        assert_eq!(BootFlashCfg::parse_with_magic(blob.as_bytes(), MAGIC), Ok(blob));

        let mut bytes = blob.as_bytes().to_vec();
        bytes[4 + 20] ^= 0x01;
        let tampered = BootFlashCfg::read_from_bytes(&bytes[..]).unwrap();
        assert_ne!(tampered.computed_crc32(), blob.crc32.get());
        assert_eq!(BootFlashCfg::parse_with_magic(&bytes, MAGIC), Err(BlobError::Crc {
            what: "flash cfg",
            stored: blob.crc32.get(),
            computed: tampered.computed_crc32(),
        }));
    }

    #[test]
    fn rejects_wrong_magic_before_crc() {
        let mut blob = BootFlashCfg::new(w25q32());
        blob.magic_code = U32::new(0xdead_beef);
        blob.crc32 = U32::new(0);
        assert_eq!(blob.verify(), Err(BlobError::Magic {
            what: "flash cfg", expected: FLASH_CFG_MAGIC, found: 0xdead_beef,
        }));
    }

    #[test]
    fn rejects_truncated_blob() {
        let blob = BootFlashCfg::new(w25q32());
        assert_eq!(BootFlashCfg::parse(&blob.as_bytes()[..91]), Err(BlobError::Length {
            what: "flash cfg", expected: 92, actual: 91,
        }));
    }

    #[test]
    fn rejects_unknown_io_mode_with_valid_crc() {
        let mut cfg = w25q32();
        cfg.io_mode = 7;
        let blob = BootFlashCfg::new(cfg);
        assert_eq!(blob.verify(), Err(BlobError::FlashCfg(FlashCfgError::IoMode(7))));
    }
}
