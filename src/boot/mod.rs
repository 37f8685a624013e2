// SPDX-License-Identifier: GPL-3.0-or-later

//! Sections of the boot header, each guarded by a magic code and a CRC32.

mod clock;
mod flash;
mod header;

pub use clock::{BootClkCfg, SysClkCfg, XtalType};
#[cfg(test)]
pub(crate) use clock::xtal40m;
pub use flash::BootFlashCfg;
pub use header::{BootCfg, BootHeader};

use std::mem::size_of;

use thiserror::Error;
use zerocopy::FromBytes;

use crate::flash_cfg::FlashCfgError;

pub const FLASH_CFG_MAGIC: u32 = u32::from_le_bytes(*b"FCFG");
pub const CLK_CFG_MAGIC: u32 = u32::from_le_bytes(*b"PCFG");
pub const BOOT_HEADER_MAGIC: u32 = u32::from_le_bytes(*b"BFNP");

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlobError {
    #[error("{what} is {actual} bytes, expected {expected}")]
    Length { what: &'static str, expected: usize, actual: usize },
    #[error("{what} magic 0x{found:08x} does not match 0x{expected:08x}")]
    Magic { what: &'static str, expected: u32, found: u32 },
    #[error("{what} crc32 0x{stored:08x} does not match computed 0x{computed:08x}")]
    Crc { what: &'static str, stored: u32, computed: u32 },
    #[error(transparent)]
    FlashCfg(#[from] FlashCfgError),
    #[error("image of {0} bytes does not fit the header")]
    ImageTooLarge(usize),
    #[error("image is {actual} bytes, header declares {declared}")]
    ImageLength { declared: u32, actual: usize },
    #[error("image sha256 does not match the header")]
    ImageHash,
    #[error("img_start=0x{0:x} overlaps the boot header")]
    ImageOverlapsHeader(u32),
    #[error("img_len counts segments when no_segment is clear, a flat firmware cannot be described")]
    SegmentedImage,
}

/// Renders a magic code the way it appears in flash, e.g. `FCFG`.
pub fn magic_str(magic: u32) -> String {
    String::from_utf8_lossy(&magic.to_le_bytes()).into_owned()
}

fn check_magic(what: &'static str, expected: u32, found: u32) -> Result<(), BlobError> {
    if found == expected {
        Ok(())
    } else {
        Err(BlobError::Magic { what, expected, found })
    }
}

fn check_crc(what: &'static str, stored: u32, computed: u32) -> Result<(), BlobError> {
    if stored == computed {
        Ok(())
    } else {
        Err(BlobError::Crc { what, stored, computed })
    }
}

fn read_exact<T: FromBytes>(what: &'static str, bytes: &[u8]) -> Result<T, BlobError> {
    let length_err = || BlobError::Length { what, expected: size_of::<T>(), actual: bytes.len() };
    if bytes.len() != size_of::<T>() {
        return Err(length_err());
    }
    T::read_from_bytes(bytes).map_err(|_| length_err())
}
