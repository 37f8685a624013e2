// SPDX-License-Identifier: GPL-3.0-or-later

use serde::{Deserialize, Serialize};

/// SPI bus width and direction used for read operations.
///
/// Stored as a plain enumeration in the whole `io_mode` byte. The older
/// `interface:4, unwrap:1` nibble packing is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
         num_enum::TryFromPrimitive, num_enum::IntoPrimitive)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum IoMode {
    Normal = 0,
    DualOutput = 1,
    QuadOutput = 2,
    DualIo = 3,
    QuadIo = 4,
}

impl IoMode {
    /// Number of data lines carrying read data.
    pub fn data_lines(self) -> u8 {
        match self {
            IoMode::Normal => 1,
            IoMode::DualOutput | IoMode::DualIo => 2,
            IoMode::QuadOutput | IoMode::QuadIo => 4,
        }
    }

    /// Whether the address phase also uses the wide bus.
    pub fn wide_address(self) -> bool {
        matches!(self, IoMode::DualIo | IoMode::QuadIo)
    }
}
