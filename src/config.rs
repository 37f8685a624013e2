// SPDX-License-Identifier: GPL-3.0-or-later

use std::convert::TryFrom;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use zerocopy::byteorder::little_endian::{U16, U32};

use crate::boot::{BootCfg, BootClkCfg, BootFlashCfg, BootHeader, SysClkCfg, XtalType, FLASH_CFG_MAGIC};
use crate::flash_cfg::{IoMode, SpiFlashCfg, REG_CMD_SLOTS};
use crate::util::read_file_str;

/// Field names follow `SpiFlashCfg`. The key names of the vendor flash ini
/// files are accepted as aliases.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FlashConfig {
    /// `FCFG` when absent
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "flashcfg_magic_code")]
    pub magic_code: Option<u32>,

    pub io_mode: IoMode,
    #[serde(alias = "cont_read_support")]
    pub continuous_read_support: u8,
    #[serde(alias = "sfctrl_clk_delay")]
    pub clock_delay: u8,
    #[serde(alias = "sfctrl_clk_invert")]
    pub clock_invert: u8,

    #[serde(alias = "reset_en_cmd")]
    pub reset_enable_cmd: u8,
    pub reset_cmd: u8,
    #[serde(alias = "exit_contread_cmd")]
    pub exit_continuous_read_cmd: u8,
    #[serde(alias = "exit_contread_cmd_size")]
    pub exit_continuous_read_cmd_size: u8,

    #[serde(alias = "jedecid_cmd")]
    pub jedec_id_cmd: u8,
    #[serde(alias = "jedecid_cmd_dmy_clk")]
    pub jedec_id_cmd_dmy_clk: u8,
    #[serde(alias = "qpi_jedecid_cmd")]
    pub qpi_jedec_id_cmd: u8,
    #[serde(alias = "qpi_jedecid_dmy_clk")]
    pub qpi_jedec_id_cmd_dmy_clk: u8,

    pub sector_size: u8,
    #[serde(alias = "mfg_id")]
    pub manufacturer_id: u8,
    pub page_size: u16,

    pub chip_erase_cmd: u8,
    pub sector_erase_cmd: u8,
    #[serde(alias = "blk32k_erase_cmd")]
    pub block32k_erase_cmd: u8,
    #[serde(alias = "blk64k_erase_cmd")]
    pub block64k_erase_cmd: u8,

    pub write_enable_cmd: u8,
    #[serde(alias = "page_prog_cmd")]
    pub page_program_cmd: u8,
    #[serde(alias = "qpage_prog_cmd")]
    pub qio_page_program_cmd: u8,
    #[serde(alias = "qual_page_prog_addr_mode")]
    pub qio_page_program_addr_mode: u8,

    pub fast_read_cmd: u8,
    #[serde(alias = "fast_read_dmy_clk")]
    pub fast_read_cmd_dmy_clk: u8,
    pub qpi_fast_read_cmd: u8,
    #[serde(alias = "qpi_fast_read_dmy_clk")]
    pub qpi_fast_read_cmd_dmy_clk: u8,
    pub fast_read_do_cmd: u8,
    #[serde(alias = "fast_read_do_dmy_clk")]
    pub fast_read_do_cmd_dmy_clk: u8,
    pub fast_read_dio_cmd: u8,
    #[serde(alias = "fast_read_dio_dmy_clk")]
    pub fast_read_dio_cmd_dmy_clk: u8,
    pub fast_read_qo_cmd: u8,
    #[serde(alias = "fast_read_qo_dmy_clk")]
    pub fast_read_qo_cmd_dmy_clk: u8,
    pub fast_read_qio_cmd: u8,
    #[serde(alias = "fast_read_qio_dmy_clk")]
    pub fast_read_qio_cmd_dmy_clk: u8,
    pub qpi_fast_read_qio_cmd: u8,
    #[serde(alias = "qpi_fast_read_qio_dmy_clk")]
    pub qpi_fast_read_qio_cmd_dmy_clk: u8,

    #[serde(alias = "qpi_page_prog_cmd")]
    pub qpi_page_program_cmd: u8,
    pub write_vreg_enable_cmd: u8,

    #[serde(alias = "wel_reg_index")]
    pub write_enable_reg_idx: u8,
    #[serde(alias = "qe_reg_index")]
    pub quad_enable_reg_idx: u8,
    #[serde(alias = "busy_reg_index")]
    pub busy_reg_idx: u8,
    #[serde(alias = "wel_bit_pos")]
    pub write_enable_bit_pos: u8,
    #[serde(alias = "qe_bit_pos")]
    pub quad_enable_bit_pos: u8,
    pub busy_bit_pos: u8,
    #[serde(alias = "wel_reg_write_len")]
    pub write_enable_reg_write_len: u8,
    #[serde(alias = "wel_reg_read_len")]
    pub write_enable_reg_read_len: u8,
    #[serde(alias = "qe_reg_write_len")]
    pub quad_enable_reg_write_len: u8,
    #[serde(alias = "qe_reg_read_len")]
    pub quad_enable_reg_read_len: u8,

    #[serde(alias = "release_power_down")]
    pub release_power_down_cmd: u8,
    pub busy_reg_read_len: u8,

    /// Up to 4 commands, missing trailing slots are zero
    pub read_reg_cmd: Vec<u8>,
    pub write_reg_cmd: Vec<u8>,

    pub enter_qpi_cmd: u8,
    pub exit_qpi_cmd: u8,

    #[serde(alias = "cont_read_code")]
    pub continuous_read_mode_cfg: u8,
    #[serde(alias = "cont_read_exit_code")]
    pub continuous_read_mode_exit_cfg: u8,

    pub burst_wrap_cmd: u8,
    #[serde(alias = "burst_wrap_dmy_clk")]
    pub burst_wrap_cmd_dmy_clk: u8,
    pub burst_wrap_data_mode: u8,
    #[serde(alias = "burst_wrap_code")]
    pub burst_wrap_data: u8,

    #[serde(alias = "de_burst_wrap_cmd")]
    pub disable_burst_wrap_cmd: u8,
    #[serde(alias = "de_burst_wrap_cmd_dmy_clk")]
    pub disable_burst_wrap_cmd_dmy_clk: u8,
    #[serde(alias = "de_burst_wrap_code_mode")]
    pub disable_burst_wrap_data_mode: u8,
    #[serde(alias = "de_burst_wrap_code")]
    pub disable_burst_wrap_data: u8,

    pub sector_erase_time: u16,
    #[serde(alias = "blk32k_erase_time")]
    pub block32k_erase_time: u16,
    #[serde(alias = "blk64k_erase_time")]
    pub block64k_erase_time: u16,
    #[serde(alias = "page_prog_time")]
    pub page_program_time: u16,
    pub chip_erase_time: u16,

    #[serde(alias = "power_down_delay")]
    pub release_power_down_delay: u8,
    #[serde(alias = "qe_data")]
    pub quad_enable_data: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClockConfig {
    pub xtal_type: XtalType,
    pub pll_clk: u8,
    pub hclk_div: u8,
    pub bclk_div: u8,
    pub flash_clk_type: u8,
    pub flash_clk_div: u8,
    #[serde(default, skip_serializing_if = "is_zeroed")]
    pub rsvd: [u8; 2],
}

fn is_zeroed(bytes: &[u8; 2]) -> bool {
    bytes.iter().all(|&b| b == 0)
}

fn default_revision() -> u32 {
    1
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BootConfig {
    #[serde(default = "default_revision")]
    pub revision: u32,

    #[serde(default)]
    pub sign: u8,
    #[serde(default)]
    pub encrypt_type: u8,
    #[serde(default)]
    pub key_sel: u8,
    #[serde(default = "yes")]
    pub no_segment: bool,
    #[serde(default)]
    pub cache_enable: bool,
    #[serde(default, alias = "notload_in_bootrom")]
    pub not_load_to_bootrom: bool,
    #[serde(default)]
    pub aes_region_lock: bool,
    #[serde(default)]
    pub cache_way_disable: u8,
    #[serde(default)]
    pub crc_ignore: bool,
    #[serde(default)]
    pub hash_ignore: bool,
    #[serde(default, alias = "halt_ap")]
    pub halt_cpu1: bool,

    /// Overwritten when the header is built for a firmware file
    #[serde(default)]
    pub img_len: u32,
    #[serde(alias = "bootentry")]
    pub boot_entry: u32,
    pub img_start: u32,
    /// SHA-256 of the image as 8 little-endian words
    #[serde(default)]
    pub hash: [u32; 8],
    #[serde(default)]
    pub boot2_pt_table_0: u32,
    #[serde(default)]
    pub boot2_pt_table_1: u32,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub flash: FlashConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock: Option<ClockConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot: Option<BootConfig>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        serde_yaml::from_str(&read_file_str(path)?)
            .with_context(|| format!("Failed to parse {}", path))
    }

    pub fn boot_flash_cfg(&self) -> Result<BootFlashCfg> {
        BootFlashCfg::try_from(&self.flash)
    }

    pub fn boot_header(&self) -> Result<BootHeader> {
        let (clock, boot) = match (&self.clock, &self.boot) {
            (Some(clock), Some(boot)) => (clock, boot),
            _ => bail!("A boot header needs both the `clock` and `boot` sections"),
        };

        let mut header = BootHeader::new(self.boot_flash_cfg()?, BootClkCfg::from(clock));
        header.revision = U32::new(boot.revision);
        header.set_boot_cfg(boot.boot_cfg()?);
        header.img_len = U32::new(boot.img_len);
        header.boot_entry = U32::new(boot.boot_entry);
        header.img_start = U32::new(boot.img_start);
        for (chunk, word) in header.hash.chunks_exact_mut(4).zip(boot.hash) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        header.boot2_pt_table_0 = U32::new(boot.boot2_pt_table_0);
        header.boot2_pt_table_1 = U32::new(boot.boot2_pt_table_1);
        header.seal();
        Ok(header)
    }

    pub fn from_flash_cfg(blob: &BootFlashCfg) -> Result<Self> {
        Ok(Self { flash: FlashConfig::try_from(blob)?, clock: None, boot: None })
    }

    pub fn from_boot_header(header: &BootHeader) -> Result<Self> {
        Ok(Self {
            flash: FlashConfig::try_from(&header.flash_cfg)?,
            clock: Some(ClockConfig::try_from(&header.clk_cfg)?),
            boot: Some(BootConfig::from(header)),
        })
    }
}

fn reg_cmds(field: &str, cmds: &[u8]) -> Result<[u8; REG_CMD_SLOTS]> {
    if cmds.len() > REG_CMD_SLOTS {
        bail!("{} holds at most {} commands, got {}", field, REG_CMD_SLOTS, cmds.len());
    }
    let mut buf = [0; REG_CMD_SLOTS];
    buf[..cmds.len()].copy_from_slice(cmds);
    Ok(buf)
}

fn trim_reg_cmds(buf: &[u8; REG_CMD_SLOTS]) -> Vec<u8> {
    let len = buf.iter().rposition(|&c| c != 0).map_or(0, |i| i + 1);
    buf[..len].to_vec()
}

impl TryFrom<&FlashConfig> for SpiFlashCfg {
    type Error = anyhow::Error;

    fn try_from(c: &FlashConfig) -> Result<Self> {
        let cfg = Self {
            io_mode: c.io_mode.into(),
            continuous_read_support: c.continuous_read_support,
            clock_delay: c.clock_delay,
            clock_invert: c.clock_invert,
            reset_enable_cmd: c.reset_enable_cmd,
            reset_cmd: c.reset_cmd,
            exit_continuous_read_cmd: c.exit_continuous_read_cmd,
            exit_continuous_read_cmd_size: c.exit_continuous_read_cmd_size,
            jedec_id_cmd: c.jedec_id_cmd,
            jedec_id_cmd_dmy_clk: c.jedec_id_cmd_dmy_clk,
            qpi_jedec_id_cmd: c.qpi_jedec_id_cmd,
            qpi_jedec_id_cmd_dmy_clk: c.qpi_jedec_id_cmd_dmy_clk,
            sector_size: c.sector_size,
            manufacturer_id: c.manufacturer_id,
            page_size: U16::new(c.page_size),
            chip_erase_cmd: c.chip_erase_cmd,
            sector_erase_cmd: c.sector_erase_cmd,
            block32k_erase_cmd: c.block32k_erase_cmd,
            block64k_erase_cmd: c.block64k_erase_cmd,
            write_enable_cmd: c.write_enable_cmd,
            page_program_cmd: c.page_program_cmd,
            qio_page_program_cmd: c.qio_page_program_cmd,
            qio_page_program_addr_mode: c.qio_page_program_addr_mode,
            fast_read_cmd: c.fast_read_cmd,
            fast_read_cmd_dmy_clk: c.fast_read_cmd_dmy_clk,
            qpi_fast_read_cmd: c.qpi_fast_read_cmd,
            qpi_fast_read_cmd_dmy_clk: c.qpi_fast_read_cmd_dmy_clk,
            fast_read_do_cmd: c.fast_read_do_cmd,
            fast_read_do_cmd_dmy_clk: c.fast_read_do_cmd_dmy_clk,
            fast_read_dio_cmd: c.fast_read_dio_cmd,
            fast_read_dio_cmd_dmy_clk: c.fast_read_dio_cmd_dmy_clk,
            fast_read_qo_cmd: c.fast_read_qo_cmd,
            fast_read_qo_cmd_dmy_clk: c.fast_read_qo_cmd_dmy_clk,
            fast_read_qio_cmd: c.fast_read_qio_cmd,
            fast_read_qio_cmd_dmy_clk: c.fast_read_qio_cmd_dmy_clk,
            qpi_fast_read_qio_cmd: c.qpi_fast_read_qio_cmd,
            qpi_fast_read_qio_cmd_dmy_clk: c.qpi_fast_read_qio_cmd_dmy_clk,
            qpi_page_program_cmd: c.qpi_page_program_cmd,
            write_vreg_enable_cmd: c.write_vreg_enable_cmd,
            write_enable_reg_idx: c.write_enable_reg_idx,
            quad_enable_reg_idx: c.quad_enable_reg_idx,
            busy_reg_idx: c.busy_reg_idx,
            write_enable_bit_pos: c.write_enable_bit_pos,
            quad_enable_bit_pos: c.quad_enable_bit_pos,
            busy_bit_pos: c.busy_bit_pos,
            write_enable_reg_write_len: c.write_enable_reg_write_len,
            write_enable_reg_read_len: c.write_enable_reg_read_len,
            quad_enable_reg_write_len: c.quad_enable_reg_write_len,
            quad_enable_reg_read_len: c.quad_enable_reg_read_len,
            release_power_down_cmd: c.release_power_down_cmd,
            busy_reg_read_len: c.busy_reg_read_len,
            read_reg_cmd: reg_cmds("read_reg_cmd", &c.read_reg_cmd)?,
            write_reg_cmd: reg_cmds("write_reg_cmd", &c.write_reg_cmd)?,
            enter_qpi_cmd: c.enter_qpi_cmd,
            exit_qpi_cmd: c.exit_qpi_cmd,
            continuous_read_mode_cfg: c.continuous_read_mode_cfg,
            continuous_read_mode_exit_cfg: c.continuous_read_mode_exit_cfg,
            burst_wrap_cmd: c.burst_wrap_cmd,
            burst_wrap_cmd_dmy_clk: c.burst_wrap_cmd_dmy_clk,
            burst_wrap_data_mode: c.burst_wrap_data_mode,
            burst_wrap_data: c.burst_wrap_data,
            disable_burst_wrap_cmd: c.disable_burst_wrap_cmd,
            disable_burst_wrap_cmd_dmy_clk: c.disable_burst_wrap_cmd_dmy_clk,
            disable_burst_wrap_data_mode: c.disable_burst_wrap_data_mode,
            disable_burst_wrap_data: c.disable_burst_wrap_data,
            sector_erase_time: U16::new(c.sector_erase_time),
            block32k_erase_time: U16::new(c.block32k_erase_time),
            block64k_erase_time: U16::new(c.block64k_erase_time),
            page_program_time: U16::new(c.page_program_time),
            chip_erase_time: U16::new(c.chip_erase_time),
            release_power_down_delay: c.release_power_down_delay,
            quad_enable_data: c.quad_enable_data,
        };

        cfg.validate().context("Invalid flash parameters")?;
        Ok(cfg)
    }
}

impl TryFrom<&FlashConfig> for BootFlashCfg {
    type Error = anyhow::Error;

    fn try_from(c: &FlashConfig) -> Result<Self> {
        let cfg = SpiFlashCfg::try_from(c)?;
        Ok(match c.magic_code {
            Some(magic) => Self::with_magic(magic, cfg),
            None => Self::new(cfg),
        })
    }
}

impl TryFrom<&BootFlashCfg> for FlashConfig {
    type Error = anyhow::Error;

    fn try_from(blob: &BootFlashCfg) -> Result<Self> {
        let c = &blob.cfg;
        Ok(Self {
            magic_code: Some(blob.magic_code.get()).filter(|&magic| magic != FLASH_CFG_MAGIC),
            io_mode: c.io_mode()?,
            continuous_read_support: c.continuous_read_support,
            clock_delay: c.clock_delay,
            clock_invert: c.clock_invert,
            reset_enable_cmd: c.reset_enable_cmd,
            reset_cmd: c.reset_cmd,
            exit_continuous_read_cmd: c.exit_continuous_read_cmd,
            exit_continuous_read_cmd_size: c.exit_continuous_read_cmd_size,
            jedec_id_cmd: c.jedec_id_cmd,
            jedec_id_cmd_dmy_clk: c.jedec_id_cmd_dmy_clk,
            qpi_jedec_id_cmd: c.qpi_jedec_id_cmd,
            qpi_jedec_id_cmd_dmy_clk: c.qpi_jedec_id_cmd_dmy_clk,
            sector_size: c.sector_size,
            manufacturer_id: c.manufacturer_id,
            page_size: c.page_size.get(),
            chip_erase_cmd: c.chip_erase_cmd,
            sector_erase_cmd: c.sector_erase_cmd,
            block32k_erase_cmd: c.block32k_erase_cmd,
            block64k_erase_cmd: c.block64k_erase_cmd,
            write_enable_cmd: c.write_enable_cmd,
            page_program_cmd: c.page_program_cmd,
            qio_page_program_cmd: c.qio_page_program_cmd,
            qio_page_program_addr_mode: c.qio_page_program_addr_mode,
            fast_read_cmd: c.fast_read_cmd,
            fast_read_cmd_dmy_clk: c.fast_read_cmd_dmy_clk,
            qpi_fast_read_cmd: c.qpi_fast_read_cmd,
            qpi_fast_read_cmd_dmy_clk: c.qpi_fast_read_cmd_dmy_clk,
            fast_read_do_cmd: c.fast_read_do_cmd,
            fast_read_do_cmd_dmy_clk: c.fast_read_do_cmd_dmy_clk,
            fast_read_dio_cmd: c.fast_read_dio_cmd,
            fast_read_dio_cmd_dmy_clk: c.fast_read_dio_cmd_dmy_clk,
            fast_read_qo_cmd: c.fast_read_qo_cmd,
            fast_read_qo_cmd_dmy_clk: c.fast_read_qo_cmd_dmy_clk,
            fast_read_qio_cmd: c.fast_read_qio_cmd,
            fast_read_qio_cmd_dmy_clk: c.fast_read_qio_cmd_dmy_clk,
            qpi_fast_read_qio_cmd: c.qpi_fast_read_qio_cmd,
            qpi_fast_read_qio_cmd_dmy_clk: c.qpi_fast_read_qio_cmd_dmy_clk,
            qpi_page_program_cmd: c.qpi_page_program_cmd,
            write_vreg_enable_cmd: c.write_vreg_enable_cmd,
            write_enable_reg_idx: c.write_enable_reg_idx,
            quad_enable_reg_idx: c.quad_enable_reg_idx,
            busy_reg_idx: c.busy_reg_idx,
            write_enable_bit_pos: c.write_enable_bit_pos,
            quad_enable_bit_pos: c.quad_enable_bit_pos,
            busy_bit_pos: c.busy_bit_pos,
            write_enable_reg_write_len: c.write_enable_reg_write_len,
            write_enable_reg_read_len: c.write_enable_reg_read_len,
            quad_enable_reg_write_len: c.quad_enable_reg_write_len,
            quad_enable_reg_read_len: c.quad_enable_reg_read_len,
            release_power_down_cmd: c.release_power_down_cmd,
            busy_reg_read_len: c.busy_reg_read_len,
            read_reg_cmd: trim_reg_cmds(&c.read_reg_cmd),
            write_reg_cmd: trim_reg_cmds(&c.write_reg_cmd),
            enter_qpi_cmd: c.enter_qpi_cmd,
            exit_qpi_cmd: c.exit_qpi_cmd,
            continuous_read_mode_cfg: c.continuous_read_mode_cfg,
            continuous_read_mode_exit_cfg: c.continuous_read_mode_exit_cfg,
            burst_wrap_cmd: c.burst_wrap_cmd,
            burst_wrap_cmd_dmy_clk: c.burst_wrap_cmd_dmy_clk,
            burst_wrap_data_mode: c.burst_wrap_data_mode,
            burst_wrap_data: c.burst_wrap_data,
            disable_burst_wrap_cmd: c.disable_burst_wrap_cmd,
            disable_burst_wrap_cmd_dmy_clk: c.disable_burst_wrap_cmd_dmy_clk,
            disable_burst_wrap_data_mode: c.disable_burst_wrap_data_mode,
            disable_burst_wrap_data: c.disable_burst_wrap_data,
            sector_erase_time: c.sector_erase_time.get(),
            block32k_erase_time: c.block32k_erase_time.get(),
            block64k_erase_time: c.block64k_erase_time.get(),
            page_program_time: c.page_program_time.get(),
            chip_erase_time: c.chip_erase_time.get(),
            release_power_down_delay: c.release_power_down_delay,
            quad_enable_data: c.quad_enable_data,
        })
    }
}

impl From<&ClockConfig> for BootClkCfg {
    fn from(c: &ClockConfig) -> Self {
        Self::new(SysClkCfg {
            xtal_type: c.xtal_type.into(),
            pll_clk: c.pll_clk,
            hclk_div: c.hclk_div,
            bclk_div: c.bclk_div,
            flash_clk_type: c.flash_clk_type,
            flash_clk_div: c.flash_clk_div,
            rsvd: c.rsvd,
        })
    }
}

impl TryFrom<&BootClkCfg> for ClockConfig {
    type Error = anyhow::Error;

    fn try_from(blob: &BootClkCfg) -> Result<Self> {
        let c = &blob.cfg;
        let xtal_type = c.xtal_type()
            .with_context(|| format!("Unknown xtal_type={}", c.xtal_type))?;
        Ok(Self {
            xtal_type,
            pll_clk: c.pll_clk,
            hclk_div: c.hclk_div,
            bclk_div: c.bclk_div,
            flash_clk_type: c.flash_clk_type,
            flash_clk_div: c.flash_clk_div,
            rsvd: c.rsvd,
        })
    }
}

impl BootConfig {
    pub fn boot_cfg(&self) -> Result<BootCfg> {
        for (field, value, bits) in [
            ("sign", self.sign, 2),
            ("encrypt_type", self.encrypt_type, 2),
            ("key_sel", self.key_sel, 2),
            ("cache_way_disable", self.cache_way_disable, 4),
        ] {
            if value >> bits != 0 {
                bail!("{}={} does not fit in {} bits", field, value, bits);
            }
        }

        let mut cfg = BootCfg::default();
        cfg.set_sign(self.sign);
        cfg.set_encrypt_type(self.encrypt_type);
        cfg.set_key_sel(self.key_sel);
        cfg.set_no_segment(self.no_segment);
        cfg.set_cache_enable(self.cache_enable);
        cfg.set_not_load_to_bootrom(self.not_load_to_bootrom);
        cfg.set_aes_region_lock(self.aes_region_lock);
        cfg.set_cache_way_disable(self.cache_way_disable);
        cfg.set_crc_ignore(self.crc_ignore);
        cfg.set_hash_ignore(self.hash_ignore);
        cfg.set_halt_cpu1(self.halt_cpu1);
        Ok(cfg)
    }
}

impl From<&BootHeader> for BootConfig {
    fn from(header: &BootHeader) -> Self {
        let cfg = header.boot_cfg();
        let mut hash = [0u32; 8];
        for (word, chunk) in hash.iter_mut().zip(header.hash.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }

        Self {
            revision: header.revision.get(),
            sign: cfg.sign(),
            encrypt_type: cfg.encrypt_type(),
            key_sel: cfg.key_sel(),
            no_segment: cfg.no_segment(),
            cache_enable: cfg.cache_enable(),
            not_load_to_bootrom: cfg.not_load_to_bootrom(),
            aes_region_lock: cfg.aes_region_lock(),
            cache_way_disable: cfg.cache_way_disable(),
            crc_ignore: cfg.crc_ignore(),
            hash_ignore: cfg.hash_ignore(),
            halt_cpu1: cfg.halt_cpu1(),
            img_len: header.img_len.get(),
            boot_entry: header.boot_entry.get(),
            img_start: header.img_start.get(),
            hash,
            boot2_pt_table_0: header.boot2_pt_table_0.get(),
            boot2_pt_table_1: header.boot2_pt_table_1.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::boot::xtal40m;
    use crate::flash_cfg::{w25q32, FlashCfgError};

    const W25Q32JV: &str = include_str!("../configs/w25q32jv.yaml");

    fn sample() -> Config {
        serde_yaml::from_str(W25Q32JV).unwrap()
    }

    #[test]
    fn sample_config_describes_w25q32() {
        let config = sample();
        let blob = config.boot_flash_cfg().unwrap();
        assert_eq!(blob, BootFlashCfg::new(w25q32()));

        let header = config.boot_header().unwrap();
        assert_eq!(header.clk_cfg, BootClkCfg::new(xtal40m()));
        assert_eq!(header.img_start.get(), 0x2000);
        assert!(header.boot_cfg().no_segment());
        assert_eq!(header.verify(), Ok(()));
    }

    #[test]
    fn decodes_back_to_the_same_config() {
        let config = sample();
        let header = config.boot_header().unwrap();
        assert_eq!(Config::from_boot_header(&header).unwrap(), config);

        let flash_only = Config::from_flash_cfg(&header.flash_cfg).unwrap();
        assert_eq!(flash_only.flash, config.flash);
        assert_eq!(flash_only.clock, None);
    }

    #[test]
    fn yaml_output_parses_again() {
        let config = sample();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn accepts_vendor_key_names() {
        let yaml = W25Q32JV
            .replace("block32k_erase_cmd:", "blk32k_erase_cmd:")
            .replace("manufacturer_id:", "mfg_id:")
            .replace("quad_enable_bit_pos:", "qe_bit_pos:")
            .replace("boot_entry:", "bootentry:");
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config, sample());
    }

    #[test]
    fn rejects_unknown_keys() {
        let yaml = W25Q32JV.replace("reset_cmd:", "reset_command:");
        assert!(serde_yaml::from_str::<Config>(&yaml).is_err());
    }

    #[test]
    fn rejects_invalid_flash_parameters() {
        let mut config = sample();
        config.flash.busy_bit_pos = 9;
        let err = config.boot_flash_cfg().unwrap_err();
        assert_eq!(err.downcast_ref::<FlashCfgError>(), Some(&FlashCfgError::OutOfRange {
            field: "busy_bit_pos", value: 9, limit: 8,
        }));
    }

    #[test]
    fn rejects_too_many_register_commands() {
        let mut config = sample();
        config.flash.read_reg_cmd = vec![0x05, 0x35, 0x15, 0x00, 0x00];
        assert!(config.boot_flash_cfg().is_err());
    }

    #[test]
    fn pads_register_commands() {
        let mut config = sample();
        config.flash.write_reg_cmd = vec![0x01];
        let blob = config.boot_flash_cfg().unwrap();
        assert_eq!(blob.cfg.write_reg_cmd, [0x01, 0, 0, 0]);
    }

    #[test]
    fn header_needs_clock_and_boot_sections() {
        let mut config = sample();
        config.clock = None;
        assert!(config.boot_flash_cfg().is_ok());
        assert!(config.boot_header().is_err());
    }

    #[test]
    fn rejects_boot_fields_wider_than_their_bits() {
        let mut config = sample();
        config.boot.as_mut().unwrap().cache_way_disable = 0x10;
        assert!(config.boot_header().is_err());
    }

    #[test]
    fn custom_flash_magic() {
        let yaml = W25Q32JV.replace("flash:\n", "flash:\n  magic_code: 0x4642504C\n");
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        let blob = config.boot_flash_cfg().unwrap();
        assert_eq!(blob.magic_code.get(), 0x4642_504C);
        assert_eq!(blob.verify_with_magic(0x4642_504C), Ok(()));
        assert_eq!(Config::from_flash_cfg(&blob).unwrap().flash.magic_code, Some(0x4642_504C));
    }

    #[test]
    fn default_flash_magic_is_left_out() {
        let config = sample();
        assert_eq!(config.flash.magic_code, None);
        let blob = config.boot_flash_cfg().unwrap();
        assert_eq!(blob.magic_code.get(), FLASH_CFG_MAGIC);
        assert_eq!(Config::from_flash_cfg(&blob).unwrap().flash.magic_code, None);
        assert!(!serde_yaml::to_string(&config).unwrap().contains("magic_code"));
    }

    #[test]
    fn reserved_clock_bytes_survive_a_dump() {
        let mut header = sample().boot_header().unwrap();
        let mut clk = header.clk_cfg.cfg;
        clk.rsvd = [0x5a, 0x01];
        header.clk_cfg = BootClkCfg::new(clk);
        header.seal();

        let dumped = Config::from_boot_header(&header).unwrap();
        assert_eq!(dumped.clock.as_ref().unwrap().rsvd, [0x5a, 0x01]);

        let yaml = serde_yaml::to_string(&dumped).unwrap();
        let rebuilt: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(rebuilt.boot_header().unwrap(), header);
    }
}
