// SPDX-License-Identifier: GPL-3.0-or-later

//! Frames of the boot ROM's UART in-system-programming protocol.
//!
//! A command is `id, checksum, len (u16 LE), payload`. Only the flash erase
//! and write commands carry a checksum, the others send zero. The ROM
//! answers `OK` with an optional payload, `PD` while a long operation is
//! still running, or `FL` followed by a little-endian error code.

use thiserror::Error;
use zerocopy::IntoBytes;

use crate::boot::BootHeader;

pub const SEGMENT_HEADER_SIZE: usize = 16;
pub const MAX_SEGMENT_DATA: usize = 4096;
pub const MAX_FLASH_WRITE: usize = 8000;

/// Chunk sizes used when streaming a whole file.
const SEGMENT_DATA_CHUNK: usize = 4080;
const FLASH_WRITE_CHUNK: usize = 2048;

const HANDSHAKE_BYTE: u8 = 0x55;

#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::TryFromPrimitive, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum CommandId {
    GetBootInfo = 0x10,
    LoadBootHeader = 0x11,
    LoadSegmentHeader = 0x17,
    LoadSegmentData = 0x18,
    CheckImage = 0x19,
    FlashErase = 0x30,
    FlashWrite = 0x31,
    ReadJedecId = 0x36,
    FlashWriteCheck = 0x3a,
    FlashXipReadSha = 0x3e,
    EfuseReadMacAddr = 0x42,
    MemWrite = 0x50,
    XipReadStart = 0x60,
    XipReadFinish = 0x61,
}

impl CommandId {
    pub fn checksummed(self) -> bool {
        matches!(self, CommandId::FlashErase | CommandId::FlashWrite)
    }
}

/// Error codes reported by the ROM in a `FL` response. The high byte is the
/// class (flash, command, image), the low byte a 1-based index in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, num_enum::TryFromPrimitive)]
#[repr(u16)]
pub enum RomError {
    #[error("flash init failed")]
    FlashInit = 0x0001,
    #[error("bad flash erase parameters")]
    FlashEraseParam = 0x0002,
    #[error("flash erase failed")]
    FlashErase = 0x0003,
    #[error("bad flash write parameters")]
    FlashWriteParam = 0x0004,
    #[error("bad flash write address")]
    FlashWriteAddr = 0x0005,
    #[error("flash write failed")]
    FlashWrite = 0x0006,
    #[error("bad flash boot parameters")]
    FlashBootParam = 0x0007,
    #[error("flash set parameters failed")]
    FlashSetParam = 0x0008,
    #[error("flash status register read failed")]
    FlashReadStatusReg = 0x0009,
    #[error("flash status register write failed")]
    FlashWriteStatusReg = 0x000a,

    #[error("unknown command id")]
    CmdId = 0x0101,
    #[error("bad command length")]
    CmdLen = 0x0102,
    #[error("command checksum mismatch")]
    CmdCrc = 0x0103,
    #[error("command out of sequence")]
    CmdSeq = 0x0104,

    #[error("bad boot header length")]
    BootHeaderLen = 0x0201,
    #[error("boot header not loaded")]
    BootHeaderNotLoaded = 0x0202,
    #[error("bad boot header magic")]
    BootHeaderMagic = 0x0203,
    #[error("boot header crc mismatch")]
    BootHeaderCrc = 0x0204,
    #[error("encryption type does not fit the chip")]
    BootHeaderEncryptNotFit = 0x0205,
    #[error("signature type does not fit the chip")]
    BootHeaderSignNotFit = 0x0206,
    #[error("bad segment count")]
    SegmentCount = 0x0207,
    #[error("bad AES IV length")]
    AesIvLen = 0x0208,
    #[error("AES IV crc mismatch")]
    AesIvCrc = 0x0209,
    #[error("bad public key length")]
    PkLen = 0x020a,
}

impl RomError {
    pub fn code(self) -> u16 {
        self as u16
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IspError {
    #[error("{id:?} payload is {len} bytes, at most {max} allowed")]
    PayloadTooLong { id: CommandId, len: usize, max: usize },
    #[error("{id:?} payload is {actual} bytes, expected {expected}")]
    PayloadLength { id: CommandId, expected: usize, actual: usize },
    #[error("flash write of {len} bytes at 0x{start:08x} wraps the address space")]
    AddressOverflow { start: u32, len: usize },
    #[error("boot ROM reported {0}")]
    Rom(#[from] RomError),
    #[error("boot ROM reported unknown error 0x{0:04x}")]
    UnknownRom(u16),
    #[error("invalid response {0:02x?}")]
    InvalidResponse(Vec<u8>),
    #[error("no final response from the boot ROM")]
    NoResponse,
}

/// Sum of all bytes, truncated to 8 bits.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |sum: u8, &b| sum.wrapping_add(b))
}

/// Sync pattern lasting about 5 ms at `baudrate`, for the ROM's autobaud.
pub fn handshake(baudrate: u32) -> Vec<u8> {
    vec![HANDSHAKE_BYTE; baudrate as usize / 2000]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    id: CommandId,
    payload: Vec<u8>,
}

impl Command {
    pub fn new(id: CommandId, payload: Vec<u8>) -> Result<Self, IspError> {
        let max = u16::MAX as usize;
        if payload.len() > max {
            return Err(IspError::PayloadTooLong { id, len: payload.len(), max });
        }
        Ok(Self { id, payload })
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn bare(id: CommandId) -> Self {
        Self { id, payload: Vec::new() }
    }

    pub fn get_boot_info() -> Self { Self::bare(CommandId::GetBootInfo) }
    pub fn check_image() -> Self { Self::bare(CommandId::CheckImage) }
    pub fn read_jedec_id() -> Self { Self::bare(CommandId::ReadJedecId) }
    pub fn flash_write_check() -> Self { Self::bare(CommandId::FlashWriteCheck) }
    pub fn xip_read_start() -> Self { Self::bare(CommandId::XipReadStart) }
    pub fn xip_read_finish() -> Self { Self::bare(CommandId::XipReadFinish) }
    pub fn efuse_read_mac_addr() -> Self { Self::bare(CommandId::EfuseReadMacAddr) }

    pub fn load_boot_header(header: &BootHeader) -> Self {
        Self { id: CommandId::LoadBootHeader, payload: header.as_bytes().to_vec() }
    }

    pub fn load_segment_header(segment_header: &[u8]) -> Result<Self, IspError> {
        let id = CommandId::LoadSegmentHeader;
        if segment_header.len() != SEGMENT_HEADER_SIZE {
            return Err(IspError::PayloadLength {
                id, expected: SEGMENT_HEADER_SIZE, actual: segment_header.len(),
            });
        }
        Ok(Self { id, payload: segment_header.to_vec() })
    }

    pub fn load_segment_data(data: &[u8]) -> Result<Self, IspError> {
        let id = CommandId::LoadSegmentData;
        if data.len() > MAX_SEGMENT_DATA {
            return Err(IspError::PayloadTooLong { id, len: data.len(), max: MAX_SEGMENT_DATA });
        }
        Ok(Self { id, payload: data.to_vec() })
    }

    pub fn mem_write(addr: u32, value: u32) -> Self {
        let payload = [addr.to_le_bytes(), value.to_le_bytes()].concat();
        Self { id: CommandId::MemWrite, payload }
    }

    /// Erases `start..=end`.
    pub fn flash_erase(start: u32, end: u32) -> Self {
        let payload = [start.to_le_bytes(), end.to_le_bytes()].concat();
        Self { id: CommandId::FlashErase, payload }
    }

    pub fn flash_write(start: u32, data: &[u8]) -> Result<Self, IspError> {
        let id = CommandId::FlashWrite;
        if data.len() > MAX_FLASH_WRITE {
            return Err(IspError::PayloadTooLong { id, len: data.len(), max: MAX_FLASH_WRITE });
        }
        let mut payload = Vec::with_capacity(4 + data.len());
        payload.extend_from_slice(&start.to_le_bytes());
        payload.extend_from_slice(data);
        Ok(Self { id, payload })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // Payload length is bounded by every constructor
        let len = (self.payload.len() as u16).to_le_bytes();
        let sum = if self.id.checksummed() {
            checksum(&len).wrapping_add(checksum(&self.payload))
        } else {
            0
        };

        let mut frame = Vec::with_capacity(4 + self.payload.len());
        frame.push(self.id.into());
        frame.push(sum);
        frame.extend_from_slice(&len);
        frame.extend_from_slice(&self.payload);
        trace!("{:?} frame len={} checksum=0x{:02x}", self.id, frame.len(), sum);
        frame
    }
}

/// Splits an image into `LoadSegmentData` commands.
pub fn segment_data(data: &[u8]) -> Vec<Command> {
    data.chunks(SEGMENT_DATA_CHUNK)
        .map(|chunk| Command { id: CommandId::LoadSegmentData, payload: chunk.to_vec() })
        .collect()
}

/// Splits `data` into consecutive `FlashWrite` commands starting at `start`.
pub fn flash_write_all(start: u32, data: &[u8]) -> Result<Vec<Command>, IspError> {
    let overflow = || IspError::AddressOverflow { start, len: data.len() };
    u32::try_from(data.len()).ok()
        .and_then(|len| start.checked_add(len))
        .ok_or_else(overflow)?;

    data.chunks(FLASH_WRITE_CHUNK)
        .enumerate()
        .map(|(i, chunk)| {
            let addr = start + (i * FLASH_WRITE_CHUNK) as u32;
            Command::flash_write(addr, chunk)
        })
        .collect()
}

#[derive(Debug, PartialEq, Eq)]
pub enum Response<'a> {
    Ok(&'a [u8]),
    Pending,
}

pub fn parse_response(bytes: &[u8]) -> Result<Response<'_>, IspError> {
    debug!("Response: {:02x?}", bytes);
    match bytes {
        [b'O', b'K', rest @ ..] => Ok(Response::Ok(rest)),
        [b'P', b'D', ..] => Ok(Response::Pending),
        [b'F', b'L', lsb, msb, ..] => {
            let code = u16::from_le_bytes([*lsb, *msb]);
            Err(match RomError::try_from(code) {
                Ok(err) => IspError::Rom(err),
                Err(_) => IspError::UnknownRom(code),
            })
        }
        _ => Err(IspError::InvalidResponse(bytes.to_vec())),
    }
}

/// Skips `PD` responses and returns the payload of the first `OK`.
pub fn settle<'a, I>(responses: I) -> Result<&'a [u8], IspError>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    for response in responses {
        match parse_response(response)? {
            Response::Ok(payload) => return Ok(payload),
            Response::Pending => debug!("Pending..."),
        }
    }
    Err(IspError::NoResponse)
}
