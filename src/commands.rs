// SPDX-License-Identifier: GPL-3.0-or-later

use anyhow::{bail, Context, Result};
use zerocopy::IntoBytes;

use bootflash_cfg::boot::{magic_str, BlobError, BootFlashCfg, BootHeader};
use bootflash_cfg::config::Config;
use bootflash_cfg::util::{self, hex_str};
use crate::{BuildArgs, InspectArgs};

/// Fill between the boot header and the firmware, as left by an erase.
const ERASED: u8 = 0xff;

/// Largest SPI NOR the boot ROM can map, an image must fit in it.
const MAX_FLASH_SIZE: usize = 16 << 20;

#[derive(Debug, PartialEq, Eq)]
pub enum Blob {
    FlashCfg(BootFlashCfg),
    Header(BootHeader),
    /// Boot header followed by the firmware at `img_start`
    Image { header: BootHeader, firmware_len: usize },
}

impl Blob {
    pub fn to_config(&self) -> Result<Config> {
        match self {
            Blob::FlashCfg(blob) => Config::from_flash_cfg(blob),
            Blob::Header(header) | Blob::Image { header, .. } => Config::from_boot_header(header),
        }
    }
}

pub fn build_blob(config: &Config, firmware: Option<&[u8]>, flash_cfg_only: bool, image: bool) -> Result<Vec<u8>> {
    if flash_cfg_only {
        if firmware.is_some() || image {
            bail!("A flash cfg blob cannot carry firmware");
        }
        let blob = config.boot_flash_cfg()?;
        log_flash_cfg(&blob);
        return Ok(blob.as_bytes().to_vec());
    }

    let mut header = config.boot_header()?;
    if let Some(firmware) = firmware {
        header.set_image(firmware)?;
        header.seal();
    }
    log_header(&header);

    let mut out = header.as_bytes().to_vec();

    if image {
        let firmware = firmware.context("Building an image needs a firmware file")?;
        let start = header.img_start.get() as usize;
        if start < out.len() {
            return Err(BlobError::ImageOverlapsHeader(header.img_start.get()).into());
        }
        if start.saturating_add(firmware.len()) > MAX_FLASH_SIZE {
            bail!("img_start=0x{:x} with {} bytes of firmware does not fit in {} MiB of flash",
                start, firmware.len(), MAX_FLASH_SIZE >> 20);
        }
        debug!("Placing {} bytes of firmware at offset=0x{:x}", firmware.len(), start);
        out.resize(start, ERASED);
        out.extend_from_slice(firmware);
    }

    Ok(out)
}

/// Identifies the blob by its size and validates it.
pub fn decode(bytes: &[u8], flash_magic: Option<u32>) -> Result<Blob> {
    if bytes.len() == BootFlashCfg::SIZE {
        let blob = match flash_magic {
            Some(magic) => BootFlashCfg::parse_with_magic(bytes, magic)?,
            None => BootFlashCfg::parse(bytes)?,
        };
        return Ok(Blob::FlashCfg(blob));
    }

    if bytes.len() < BootHeader::SIZE {
        bail!("{} bytes is neither a flash cfg ({} bytes) nor a boot header ({} bytes)",
            bytes.len(), BootFlashCfg::SIZE, BootHeader::SIZE);
    }

    let header = BootHeader::parse(&bytes[..BootHeader::SIZE])?;
    if bytes.len() == BootHeader::SIZE {
        return Ok(Blob::Header(header));
    }

    if !header.boot_cfg().no_segment() {
        return Err(BlobError::SegmentedImage.into());
    }

    let start = header.img_start.get() as usize;
    if start < BootHeader::SIZE {
        return Err(BlobError::ImageOverlapsHeader(header.img_start.get()).into());
    }
    let len = header.img_len.get() as usize;
    let firmware = start.checked_add(len)
        .and_then(|end| bytes.get(start..end))
        .with_context(|| format!("Image ends before img_start=0x{:x} + img_len=0x{:x}", start, len))?;
    header.verify_image(firmware)?;

    Ok(Blob::Image { header, firmware_len: len })
}

fn log_flash_cfg(blob: &BootFlashCfg) {
    let cfg = &blob.cfg;
    info!("flash cfg magic={} crc32=0x{:08x}", magic_str(blob.magic_code.get()), blob.crc32.get());
    debug!("manufacturer_id=0x{:02x} page_size={} sector_size={}",
        cfg.manufacturer_id, cfg.page_size.get(), cfg.sector_size_bytes());
    if let Ok(mode) = cfg.io_mode() {
        debug!("io_mode={:?} data_lines={} wide_address={}", mode, mode.data_lines(), mode.wide_address());
    }
    trace!("flash cfg bytes={}", hex_str(blob.as_bytes()));
}

fn log_header(header: &BootHeader) {
    info!("boot header magic={} revision={} crc32=0x{:08x}",
        magic_str(header.magic_code.get()), header.revision.get(), header.crc32.get());
    log_flash_cfg(&header.flash_cfg);

    let clk = &header.clk_cfg.cfg;
    match clk.xtal_type().and_then(|x| x.freq_hz()) {
        Some(hz) => debug!("clock cfg xtal={}Hz pll_clk={}", hz, clk.pll_clk),
        None => debug!("clock cfg xtal_type={} pll_clk={}", clk.xtal_type, clk.pll_clk),
    }

    debug!("boot_cfg={:?}", header.boot_cfg());
    debug!("img_len=0x{:x} boot_entry=0x{:08x} img_start=0x{:x} hash={}",
        header.img_len.get(), header.boot_entry.get(), header.img_start.get(), hex_str(&header.hash));
}

pub fn build(args: &BuildArgs) -> Result<()> {
    let config = Config::load(&args.config)?;
    let firmware = args.firmware.as_deref().map(util::read_file).transpose()?;

    let out = build_blob(&config, firmware.as_deref(), args.flash_cfg_only, args.image)
        .with_context(|| format!("Failed to build from {}", args.config))?;

    util::write_file(&args.output, &out)?;
    info!("Wrote {} bytes to {}", out.len(), args.output);
    Ok(())
}

fn load_blob(args: &InspectArgs) -> Result<Blob> {
    let bytes = util::read_file(&args.input)?;
    decode(&bytes, args.magic)
        .with_context(|| format!("{} rejected", args.input))
}

pub fn dump(args: &InspectArgs) -> Result<()> {
    let blob = load_blob(args)?;
    let yaml = serde_yaml::to_string(&blob.to_config()?)?;
    print!("{}", yaml);
    Ok(())
}

pub fn verify(args: &InspectArgs) -> Result<()> {
    match load_blob(args)? {
        Blob::FlashCfg(blob) => log_flash_cfg(&blob),
        Blob::Header(header) => log_header(&header),
        Blob::Image { header, firmware_len } => {
            log_header(&header);
            info!("firmware of {} bytes matches the header", firmware_len);
        }
    }
    info!("{} OK", args.input);
    Ok(())
}
