// SPDX-License-Identifier: GPL-3.0-or-later

//! Boot flash configuration records of BL60x/BL70x chips: the SPI flash
//! parameter block, the boot header embedding it, their YAML description
//! and the UART ISP frames that carry them to the boot ROM.

#[macro_use]
extern crate log;

pub mod boot;
pub mod config;
pub mod flash_cfg;
pub mod isp;
pub mod util;
