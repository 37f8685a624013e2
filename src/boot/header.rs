// SPDX-License-Identifier: GPL-3.0-or-later

use std::mem::offset_of;

use bitfield::bitfield;
use sha2::{Digest, Sha256};
use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::{check_crc, check_magic, read_exact, BlobError, BootClkCfg, BootFlashCfg, BOOT_HEADER_MAGIC};

bitfield! {
    /// Boot options word of the boot header.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    pub struct BootCfg(u32);
    impl Debug;
    pub u8, sign, set_sign: 1, 0;
    pub u8, encrypt_type, set_encrypt_type: 3, 2;
    pub u8, key_sel, set_key_sel: 5, 4;
    /// Image is a single blob of `img_len` bytes rather than segments
    pub no_segment, set_no_segment: 8;
    pub cache_enable, set_cache_enable: 9;
    pub not_load_to_bootrom, set_not_load_to_bootrom: 10;
    pub aes_region_lock, set_aes_region_lock: 11;
    pub u8, cache_way_disable, set_cache_way_disable: 15, 12;
    pub crc_ignore, set_crc_ignore: 16;
    pub hash_ignore, set_hash_ignore: 17;
    pub halt_cpu1, set_halt_cpu1: 18;
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct BootHeader {
    pub magic_code: U32,
    pub revision: U32,
    pub flash_cfg: BootFlashCfg,
    pub clk_cfg: BootClkCfg,
    pub boot_cfg: U32,
    /// Image length, or segment count when `no_segment` is clear
    pub img_len: U32,
    pub boot_entry: U32,
    /// RAM address or flash offset
    pub img_start: U32,
    pub hash: [u8; 32],
    pub boot2_pt_table_0: U32,
    pub boot2_pt_table_1: U32,
    pub crc32: U32,
}

const _: () = assert!(std::mem::size_of::<BootHeader>() == BootHeader::SIZE);

impl BootHeader {
    pub const SIZE: usize = 176;

    /// Sealed header with revision 1 and every other field cleared.
    pub fn new(flash_cfg: BootFlashCfg, clk_cfg: BootClkCfg) -> Self {
        let mut header = Self {
            magic_code: U32::new(BOOT_HEADER_MAGIC),
            revision: U32::new(1),
            flash_cfg,
            clk_cfg,
            boot_cfg: U32::ZERO,
            img_len: U32::ZERO,
            boot_entry: U32::ZERO,
            img_start: U32::ZERO,
            hash: [0; 32],
            boot2_pt_table_0: U32::ZERO,
            boot2_pt_table_1: U32::ZERO,
            crc32: U32::ZERO,
        };
        header.seal();
        header
    }

    pub fn boot_cfg(&self) -> BootCfg {
        BootCfg(self.boot_cfg.get())
    }

    pub fn set_boot_cfg(&mut self, boot_cfg: BootCfg) {
        self.boot_cfg = U32::new(boot_cfg.0);
    }

    /// Points the header at `firmware`: its length and, unless hash checking is off, its SHA-256.
    /// Only flat images can be described, so `no_segment` must be set.
    pub fn set_image(&mut self, firmware: &[u8]) -> Result<(), BlobError> {
        if !self.boot_cfg().no_segment() {
            return Err(BlobError::SegmentedImage);
        }
        let len = u32::try_from(firmware.len())
            .map_err(|_| BlobError::ImageTooLarge(firmware.len()))?;
        self.img_len = U32::new(len);
        self.hash = if self.boot_cfg().hash_ignore() {
            [0; 32]
        } else {
            Sha256::digest(firmware).into()
        };
        Ok(())
    }

    pub fn computed_crc32(&self) -> u32 {
        crc32fast::hash(&self.as_bytes()[..offset_of!(BootHeader, crc32)])
    }

    /// Recomputes the header CRC after the fields were edited.
    pub fn seal(&mut self) {
        self.crc32 = U32::new(self.computed_crc32());
    }

    pub fn verify(&self) -> Result<(), BlobError> {
        check_magic("boot header", BOOT_HEADER_MAGIC, self.magic_code.get())?;
        if !self.boot_cfg().crc_ignore() {
            check_crc("boot header", self.crc32.get(), self.computed_crc32())?;
        }
        self.flash_cfg.verify()?;
        self.clk_cfg.verify()
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, BlobError> {
        let header: Self = read_exact("boot header", bytes)?;
        header.verify()?;
        Ok(header)
    }

    pub fn verify_image(&self, firmware: &[u8]) -> Result<(), BlobError> {
        let boot_cfg = self.boot_cfg();
        if boot_cfg.no_segment() && self.img_len.get() as usize != firmware.len() {
            return Err(BlobError::ImageLength { declared: self.img_len.get(), actual: firmware.len() });
        }
        if !boot_cfg.hash_ignore() && Sha256::digest(firmware)[..] != self.hash[..] {
            return Err(BlobError::ImageHash);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::boot::xtal40m;
    use crate::flash_cfg::w25q32;

    fn header() -> BootHeader {
        let mut header = BootHeader::new(BootFlashCfg::new(w25q32()), BootClkCfg::new(xtal40m()));
        let mut boot_cfg = BootCfg(0);
        boot_cfg.set_no_segment(true);
        boot_cfg.set_cache_enable(true);
        header.set_boot_cfg(boot_cfg);
        header.boot_entry = U32::new(0x2300_0000);
        header.img_start = U32::new(0x2000);
        header.seal();
        header
    }

    #[test]
    fn layout_is_stable() {
        assert_eq!(std::mem::size_of::<BootHeader>(), 176);
        assert_eq!(offset_of!(BootHeader, flash_cfg), 8);
        assert_eq!(offset_of!(BootHeader, clk_cfg), 100);
        assert_eq!(offset_of!(BootHeader, boot_cfg), 116);
        assert_eq!(offset_of!(BootHeader, hash), 132);
        assert_eq!(offset_of!(BootHeader, crc32), 172);
    }

    #[test]
    fn boot_cfg_bits() {
        let mut cfg = BootCfg(0);
        cfg.set_sign(2);
        cfg.set_encrypt_type(1);
        cfg.set_cache_way_disable(0xf);
        cfg.set_crc_ignore(true);
        cfg.set_halt_cpu1(true);
        assert_eq!(cfg.0, 0b10 | 0b01 << 2 | 0xf << 12 | 1 << 16 | 1 << 18);
        assert_eq!(cfg.sign(), 2);
        assert!(!cfg.hash_ignore());
        assert_eq!(BootCfg(1 << 8).no_segment(), true);
    }

    #[test]
    fn parses_sealed_header() {
        let header = header();
        let bytes = header.as_bytes();
        assert_eq!(&bytes[..4], b"BFNP");
        assert_eq!(&bytes[8..12], b"FCFG");
        assert_eq!(&bytes[100..104], b"PCFG");
        assert_eq!(BootHeader::parse(bytes), Ok(header));
    }

    #[test]
    fn edits_need_sealing() {
        let mut header = header();
        header.boot_entry = U32::new(0x2200_0000);
        assert!(matches!(header.verify(), Err(BlobError::Crc { what: "boot header", .. })));
        header.seal();
        assert_eq!(header.verify(), Ok(()));
    }

    #[test]
    fn crc_ignore_skips_header_crc_only() {
        let mut header = header();
        let mut boot_cfg = header.boot_cfg();
        boot_cfg.set_crc_ignore(true);
        header.set_boot_cfg(boot_cfg);
        assert_eq!(header.verify(), Ok(()));

        header.flash_cfg.cfg.fast_read_cmd = 0x03;
        assert!(matches!(header.verify(), Err(BlobError::Crc { what: "flash cfg", .. })));
    }

    #[test]
    fn covers_firmware() {
        let firmware = b"\x13\x00\x00\x00firmware".to_vec();
        let mut header = header();
        header.set_image(&firmware).unwrap();
        header.seal();

        assert_eq!(header.img_len.get(), 12);
        assert_eq!(header.verify_image(&firmware), Ok(()));

        let mut other = firmware.clone();
        other[4] = b'F';
        assert_eq!(header.verify_image(&other), Err(BlobError::ImageHash));
        assert_eq!(header.verify_image(&firmware[..8]), Err(BlobError::ImageLength {
            declared: 12, actual: 8,
        }));
    }

    #[test]
    fn segmented_header_cannot_describe_firmware() {
        let mut header = header();
        let mut boot_cfg = header.boot_cfg();
        boot_cfg.set_no_segment(false);
        header.set_boot_cfg(boot_cfg);
        header.seal();

        assert_eq!(header.set_image(b"firmware"), Err(BlobError::SegmentedImage));
        assert_eq!(header.img_len.get(), 0);
        assert_eq!(header.verify(), Ok(()));
    }

    #[test]
    fn hash_ignore_leaves_hash_empty() {
        let mut header = header();
        let mut boot_cfg = header.boot_cfg();
        boot_cfg.set_hash_ignore(true);
        header.set_boot_cfg(boot_cfg);
        header.set_image(b"firmware").unwrap();
        assert_eq!(header.hash, [0; 32]);
        assert_eq!(header.verify_image(b"FIRMWARE"), Ok(()));
    }
}
