// SPDX-License-Identifier: GPL-3.0-or-later

use serde::{Deserialize, Serialize};
use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::{check_crc, check_magic, read_exact, BlobError, CLK_CFG_MAGIC};

/// Crystal fitted on the board, as encoded in `xtal_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
         num_enum::TryFromPrimitive, num_enum::IntoPrimitive)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum XtalType {
    None = 0,
    #[serde(rename = "24m")]
    Mhz24 = 1,
    #[serde(rename = "32m")]
    Mhz32 = 2,
    #[serde(rename = "38.4m")]
    Mhz38_4 = 3,
    #[serde(rename = "40m")]
    Mhz40 = 4,
    #[serde(rename = "26m")]
    Mhz26 = 5,
    Rc32m = 6,
}

impl XtalType {
    pub fn freq_hz(self) -> Option<u32> {
        match self {
            XtalType::None => None,
            XtalType::Mhz24 => Some(24_000_000),
            XtalType::Mhz32 | XtalType::Rc32m => Some(32_000_000),
            XtalType::Mhz38_4 => Some(38_400_000),
            XtalType::Mhz40 => Some(40_000_000),
            XtalType::Mhz26 => Some(26_000_000),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct SysClkCfg {
    pub xtal_type: u8,
    pub pll_clk: u8,
    pub hclk_div: u8,
    pub bclk_div: u8,
    pub flash_clk_type: u8,
    pub flash_clk_div: u8,
    pub rsvd: [u8; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct BootClkCfg {
    pub magic_code: U32,
    pub cfg: SysClkCfg,
    pub crc32: U32,
}

const _: () = assert!(std::mem::size_of::<SysClkCfg>() == 8);
const _: () = assert!(std::mem::size_of::<BootClkCfg>() == BootClkCfg::SIZE);

impl SysClkCfg {
    pub fn xtal_type(&self) -> Option<XtalType> {
        XtalType::try_from(self.xtal_type).ok()
    }
}

impl BootClkCfg {
    pub const SIZE: usize = 16;

    pub fn new(cfg: SysClkCfg) -> Self {
        Self {
            magic_code: U32::new(CLK_CFG_MAGIC),
            cfg,
            crc32: U32::new(crc32fast::hash(cfg.as_bytes())),
        }
    }

    pub fn computed_crc32(&self) -> u32 {
        crc32fast::hash(self.cfg.as_bytes())
    }

    pub fn verify(&self) -> Result<(), BlobError> {
        check_magic("clock cfg", CLK_CFG_MAGIC, self.magic_code.get())?;
        check_crc("clock cfg", self.crc32.get(), self.computed_crc32())
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, BlobError> {
        let blob: Self = read_exact("clock cfg", bytes)?;
        blob.verify()?;
        Ok(blob)
    }
}

/// 40 MHz crystal, 160 MHz PLL.
#[cfg(test)]
pub fn xtal40m() -> SysClkCfg {
    SysClkCfg {
        xtal_type: XtalType::Mhz40.into(),
        pll_clk: 4,
        hclk_div: 0,
        bclk_div: 1,
        flash_clk_type: 1,
        flash_clk_div: 1,
        rsvd: [0; 2],
    }
}
