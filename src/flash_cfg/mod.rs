// SPDX-License-Identifier: GPL-3.0-or-later

//! Command set and timing of an SPI NOR flash chip, in the 84-byte layout
//! the boot ROM reads from the boot header.

mod io_mode;

pub use io_mode::IoMode;

use std::mem::size_of;

use thiserror::Error;
use zerocopy::byteorder::little_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Number of entries in the raw register command buffers.
pub const REG_CMD_SLOTS: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlashCfgError {
    #[error("io_mode={0} is not a known I/O mode")]
    IoMode(u8),
    #[error("{field}={value} must be below {limit}")]
    OutOfRange { field: &'static str, value: u8, limit: u8 },
    #[error("{field}={value} exceeds {max}")]
    TooLong { field: &'static str, value: u8, max: u8 },
    #[error("page_size={0} must be a non-zero power of two")]
    PageSize(u16),
    #[error("sector_size must not be zero")]
    SectorSize,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct SpiFlashCfg {
    pub io_mode: u8,
    /// bit0: continuous read supported, bit1: read mode cfg
    pub continuous_read_support: u8,
    pub clock_delay: u8,
    pub clock_invert: u8,

    pub reset_enable_cmd: u8,
    pub reset_cmd: u8,

    pub exit_continuous_read_cmd: u8,
    pub exit_continuous_read_cmd_size: u8,

    pub jedec_id_cmd: u8,
    pub jedec_id_cmd_dmy_clk: u8,
    pub qpi_jedec_id_cmd: u8,
    pub qpi_jedec_id_cmd_dmy_clk: u8,

    /// In KiB
    pub sector_size: u8,
    pub manufacturer_id: u8,
    pub page_size: U16,

    pub chip_erase_cmd: u8,
    pub sector_erase_cmd: u8,
    pub block32k_erase_cmd: u8,
    pub block64k_erase_cmd: u8,

    pub write_enable_cmd: u8,
    pub page_program_cmd: u8,
    pub qio_page_program_cmd: u8,
    pub qio_page_program_addr_mode: u8,

    pub fast_read_cmd: u8,
    pub fast_read_cmd_dmy_clk: u8,
    pub qpi_fast_read_cmd: u8,
    pub qpi_fast_read_cmd_dmy_clk: u8,
    pub fast_read_do_cmd: u8,
    pub fast_read_do_cmd_dmy_clk: u8,
    pub fast_read_dio_cmd: u8,
    pub fast_read_dio_cmd_dmy_clk: u8,
    pub fast_read_qo_cmd: u8,
    pub fast_read_qo_cmd_dmy_clk: u8,
    pub fast_read_qio_cmd: u8,
    pub fast_read_qio_cmd_dmy_clk: u8,
    pub qpi_fast_read_qio_cmd: u8,
    pub qpi_fast_read_qio_cmd_dmy_clk: u8,

    pub qpi_page_program_cmd: u8,

    /// Write enable for the volatile status register
    pub write_vreg_enable_cmd: u8,

    pub write_enable_reg_idx: u8,
    pub quad_enable_reg_idx: u8,
    pub busy_reg_idx: u8,
    pub write_enable_bit_pos: u8,
    pub quad_enable_bit_pos: u8,
    pub busy_bit_pos: u8,
    pub write_enable_reg_write_len: u8,
    pub write_enable_reg_read_len: u8,
    pub quad_enable_reg_write_len: u8,
    pub quad_enable_reg_read_len: u8,

    pub release_power_down_cmd: u8,
    pub busy_reg_read_len: u8,

    pub read_reg_cmd: [u8; REG_CMD_SLOTS],
    pub write_reg_cmd: [u8; REG_CMD_SLOTS],

    pub enter_qpi_cmd: u8,
    pub exit_qpi_cmd: u8,

    pub continuous_read_mode_cfg: u8,
    pub continuous_read_mode_exit_cfg: u8,

    pub burst_wrap_cmd: u8,
    pub burst_wrap_cmd_dmy_clk: u8,
    pub burst_wrap_data_mode: u8,
    pub burst_wrap_data: u8,

    pub disable_burst_wrap_cmd: u8,
    pub disable_burst_wrap_cmd_dmy_clk: u8,
    pub disable_burst_wrap_data_mode: u8,
    pub disable_burst_wrap_data: u8,

    // Durations in chip specific units
    pub sector_erase_time: U16,
    pub block32k_erase_time: U16,
    pub block64k_erase_time: U16,
    pub page_program_time: U16,
    pub chip_erase_time: U16,

    pub release_power_down_delay: u8,
    pub quad_enable_data: u8,
}

const _: () = assert!(size_of::<SpiFlashCfg>() == SpiFlashCfg::SIZE);

impl SpiFlashCfg {
    pub const SIZE: usize = 84;

    pub fn io_mode(&self) -> Result<IoMode, FlashCfgError> {
        IoMode::try_from(self.io_mode).map_err(|e| FlashCfgError::IoMode(e.number))
    }

    pub fn sector_size_bytes(&self) -> u32 {
        self.sector_size as u32 * 1024
    }

    /// Checks the invariants the boot ROM assumes but the layout cannot express.
    pub fn validate(&self) -> Result<(), FlashCfgError> {
        self.io_mode()?;

        for (field, value) in [
            ("write_enable_bit_pos", self.write_enable_bit_pos),
            ("quad_enable_bit_pos", self.quad_enable_bit_pos),
            ("busy_bit_pos", self.busy_bit_pos),
        ] {
            check_below(field, value, 8)?;
        }

        for (field, value) in [
            ("write_enable_reg_idx", self.write_enable_reg_idx),
            ("quad_enable_reg_idx", self.quad_enable_reg_idx),
            ("busy_reg_idx", self.busy_reg_idx),
        ] {
            check_below(field, value, REG_CMD_SLOTS as u8)?;
        }

        for (field, value) in [
            ("write_enable_reg_write_len", self.write_enable_reg_write_len),
            ("write_enable_reg_read_len", self.write_enable_reg_read_len),
            ("quad_enable_reg_write_len", self.quad_enable_reg_write_len),
            ("quad_enable_reg_read_len", self.quad_enable_reg_read_len),
            ("busy_reg_read_len", self.busy_reg_read_len),
        ] {
            if value as usize > REG_CMD_SLOTS {
                return Err(FlashCfgError::TooLong { field, value, max: REG_CMD_SLOTS as u8 });
            }
        }

        let page_size = self.page_size.get();
        if !page_size.is_power_of_two() {
            return Err(FlashCfgError::PageSize(page_size));
        }

        if self.sector_size == 0 {
            return Err(FlashCfgError::SectorSize);
        }

        Ok(())
    }
}

fn check_below(field: &'static str, value: u8, limit: u8) -> Result<(), FlashCfgError> {
    if value < limit {
        Ok(())
    } else {
        Err(FlashCfgError::OutOfRange { field, value, limit })
    }
}

/// Winbond W25Q32 parameters, shared by the tests of the records embedding this one.
#[cfg(test)]
pub fn w25q32() -> SpiFlashCfg {
    use zerocopy::FromZeros;

    let mut c = SpiFlashCfg::new_zeroed();
    c.io_mode = IoMode::QuadIo.into();
    c.continuous_read_support = 1;
    c.clock_delay = 1;
    c.reset_enable_cmd = 0x66;
    c.reset_cmd = 0x99;
    c.exit_continuous_read_cmd = 0xff;
    c.exit_continuous_read_cmd_size = 3;
    c.jedec_id_cmd = 0x9f;
    c.qpi_jedec_id_cmd = 0x9f;
    c.sector_size = 4;
    c.manufacturer_id = 0xef;
    c.page_size = U16::new(256);
    c.chip_erase_cmd = 0xc7;
    c.sector_erase_cmd = 0x20;
    c.block32k_erase_cmd = 0x52;
    c.block64k_erase_cmd = 0xd8;
    c.write_enable_cmd = 0x06;
    c.page_program_cmd = 0x02;
    c.qio_page_program_cmd = 0x32;
    c.fast_read_cmd = 0x0b;
    c.fast_read_cmd_dmy_clk = 1;
    c.qpi_fast_read_cmd = 0x0b;
    c.qpi_fast_read_cmd_dmy_clk = 1;
    c.fast_read_do_cmd = 0x3b;
    c.fast_read_do_cmd_dmy_clk = 1;
    c.fast_read_dio_cmd = 0xbb;
    c.fast_read_qo_cmd = 0x6b;
    c.fast_read_qo_cmd_dmy_clk = 1;
    c.fast_read_qio_cmd = 0xeb;
    c.fast_read_qio_cmd_dmy_clk = 2;
    c.qpi_fast_read_qio_cmd = 0xeb;
    c.qpi_fast_read_qio_cmd_dmy_clk = 2;
    c.qpi_page_program_cmd = 0x02;
    c.write_vreg_enable_cmd = 0x50;
    c.quad_enable_reg_idx = 1;
    c.write_enable_bit_pos = 1;
    c.quad_enable_bit_pos = 1;
    c.write_enable_reg_write_len = 2;
    c.write_enable_reg_read_len = 1;
    c.quad_enable_reg_write_len = 2;
    c.quad_enable_reg_read_len = 1;
    c.release_power_down_cmd = 0xab;
    c.busy_reg_read_len = 1;
    c.read_reg_cmd = [0x05, 0x35, 0, 0];
    c.write_reg_cmd = [0x01, 0x01, 0, 0];
    c.enter_qpi_cmd = 0x38;
    c.exit_qpi_cmd = 0xff;
    c.continuous_read_mode_cfg = 0x20;
    c.continuous_read_mode_exit_cfg = 0xff;
    c.burst_wrap_cmd = 0x77;
    c.burst_wrap_cmd_dmy_clk = 3;
    c.burst_wrap_data_mode = 2;
    c.burst_wrap_data = 0x40;
    c.disable_burst_wrap_cmd = 0x77;
    c.disable_burst_wrap_cmd_dmy_clk = 3;
    c.disable_burst_wrap_data_mode = 2;
    c.disable_burst_wrap_data = 0xf0;
    c.sector_erase_time = U16::new(300);
    c.block32k_erase_time = U16::new(1200);
    c.block64k_erase_time = U16::new(1200);
    c.page_program_time = U16::new(5);
    c.chip_erase_time = U16::new(33000);
    c.release_power_down_delay = 20;
    c
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;
    use pretty_assertions::assert_eq;

    #[test]
    fn layout_is_stable() {
        assert_eq!(size_of::<SpiFlashCfg>(), 84);
        assert_eq!(offset_of!(SpiFlashCfg, page_size), 14);
        assert_eq!(offset_of!(SpiFlashCfg, fast_read_cmd), 24);
        assert_eq!(offset_of!(SpiFlashCfg, qpi_page_program_cmd), 38);
        assert_eq!(offset_of!(SpiFlashCfg, read_reg_cmd), 52);
        assert_eq!(offset_of!(SpiFlashCfg, write_reg_cmd), 56);
        assert_eq!(offset_of!(SpiFlashCfg, sector_erase_time), 72);
        assert_eq!(offset_of!(SpiFlashCfg, quad_enable_data), 83);
    }

    #[test]
    fn multi_byte_fields_are_little_endian() {
        let cfg = w25q32();
        let bytes = cfg.as_bytes();
        assert_eq!(&bytes[14..16], &[0x00, 0x01]);
        assert_eq!(&bytes[80..82], &33000u16.to_le_bytes());
    }

    #[test]
    fn parses_back_field_for_field() {
        let cfg = w25q32();
        let parsed = SpiFlashCfg::read_from_bytes(cfg.as_bytes()).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.page_size.get(), 256);
        assert_eq!(parsed.read_reg_cmd, [0x05, 0x35, 0, 0]);
    }

    #[test]
    fn sample_is_valid() {
        let cfg = w25q32();
        assert_eq!(cfg.validate(), Ok(()));
        assert_eq!(cfg.io_mode(), Ok(IoMode::QuadIo));
        assert_eq!(cfg.sector_size_bytes(), 4096);
    }

    #[test]
    fn rejects_unknown_io_mode() {
        let mut cfg = w25q32();
        cfg.io_mode = 0x11;
        assert_eq!(cfg.io_mode(), Err(FlashCfgError::IoMode(0x11)));
        assert_eq!(cfg.validate(), Err(FlashCfgError::IoMode(0x11)));
    }

    #[test]
    fn rejects_bit_position_past_register() {
        let mut cfg = w25q32();
        cfg.busy_bit_pos = 8;
        assert_eq!(cfg.validate(), Err(FlashCfgError::OutOfRange {
            field: "busy_bit_pos", value: 8, limit: 8,
        }));
    }

    #[test]
    fn rejects_register_index_past_buffer() {
        let mut cfg = w25q32();
        cfg.quad_enable_reg_idx = 4;
        assert_eq!(cfg.validate(), Err(FlashCfgError::OutOfRange {
            field: "quad_enable_reg_idx", value: 4, limit: 4,
        }));
    }

    #[test]
    fn rejects_long_register_access() {
        let mut cfg = w25q32();
        cfg.quad_enable_reg_write_len = 5;
        assert_eq!(cfg.validate(), Err(FlashCfgError::TooLong {
            field: "quad_enable_reg_write_len", value: 5, max: 4,
        }));
    }

    #[test]
    fn rejects_bad_geometry() {
        let mut cfg = w25q32();
        cfg.page_size = U16::new(0);
        assert_eq!(cfg.validate(), Err(FlashCfgError::PageSize(0)));
        cfg.page_size = U16::new(300);
        assert_eq!(cfg.validate(), Err(FlashCfgError::PageSize(300)));

        let mut cfg = w25q32();
        cfg.sector_size = 0;
        assert_eq!(cfg.validate(), Err(FlashCfgError::SectorSize));
    }
}
