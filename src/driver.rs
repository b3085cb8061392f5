//! The info / extract / convert driver: thin orchestration atop
//! [`crate::parse`], operating purely on in-memory byte slices. All actual
//! file I/O (reading the input image, writing extracted files or a
//! converted image) happens in `main.rs`; this module never touches a
//! filesystem.

use anyhow::{bail, ensure, Context, Result};

use crate::metapart::{parse_soft_version, parse_support_list, SoftVersion};
use crate::parse::{parse_flash_partition_table, ParsedImage};
use crate::partition::{FlashPartition, ImagePartition};

/// A rendered summary of an image's contents, as printed by `info` mode.
pub struct ImageInfo {
	pub dialect: String,
	pub vendor_banner: Option<String>,
	pub partitions: Vec<(String, u32, u32)>,
	pub soft_version: Option<SoftVersion>,
	pub support_list: Option<String>,
	pub flash_table: Option<Vec<FlashPartition>>,
}

/// Inspect an image: dialect, vendor banner (when present), embedded
/// partition table, `soft-version`, `support-list`, and the nested flash
/// table (when a `partition-table` embedded partition exists).
pub fn run_info(data: &[u8]) -> Result<ImageInfo> {
	let parsed = ParsedImage::parse(data)?;

	let vendor_banner = if parsed.dialect.to_string() == "Vendor" {
		let len = u32::from_be_bytes(data[0x14..0x18].try_into().unwrap()) as usize;
		let banner = &data[0x18..0x18 + len];
		let trimmed = banner.split(|&b| b == 0).next().unwrap_or(banner);
		Some(String::from_utf8_lossy(trimmed).into_owned())
	} else {
		None
	};

	let partitions = parsed
		.entries
		.iter()
		.map(|e| (e.name.clone(), e.base, e.size))
		.collect();

	let soft_version = match parsed.partition_bytes("soft-version") {
		Some(bytes) => Some(parse_soft_version(bytes)?),
		None => None,
	};
	let support_list = match parsed.partition_bytes("support-list") {
		Some(bytes) => Some(parse_support_list(bytes)?),
		None => None,
	};
	let flash_table = match parsed.partition_bytes("partition-table") {
		Some(bytes) => Some(parse_flash_partition_table(bytes)?),
		None => None,
	};

	Ok(ImageInfo {
		dialect: parsed.dialect.to_string(),
		vendor_banner,
		partitions,
		soft_version,
		support_list,
		flash_table,
	})
}

/// Copy every embedded partition's payload bytes out of `data`, returning
/// `(name, bytes)` pairs. The caller (`main.rs`) writes each to a file
/// named after the partition in the destination directory.
pub fn run_extract(data: &[u8]) -> Result<Vec<ImagePartition>> {
	let parsed = ParsedImage::parse(data)?;
	parsed
		.entries
		.iter()
		.map(|e| {
			let bytes = parsed
				.partition_bytes(&e.name)
				.with_context(|| format!("Embedded partition '{}' extends past the end of the image", e.name))?;
			Ok(ImagePartition::new(e.name.clone(), bytes.to_vec()))
		})
		.collect()
}

/// Rewrite a vendor image into a sysupgrade layout.
///
/// `os-image` anchors the window at offset 0. Every other embedded
/// partition that also names a flash-table entry at or after `os-image`'s
/// flash base (`file-system`, and anything past it such as `support-list`)
/// is relocated to its own flash-relative offset, with `0xFF` filling the
/// gaps — the same windowing [`crate::assemble::build_image`] uses when
/// building a sysupgrade image directly, so converting a factory image and
/// building a sysupgrade image from the same payloads agree byte-for-byte.
pub fn run_convert(data: &[u8]) -> Result<Vec<u8>> {
	let parsed = ParsedImage::parse(data)?;

	parsed
		.partition_bytes("os-image")
		.context("Image has no embedded 'os-image' partition to convert")?;
	parsed
		.partition_bytes("file-system")
		.context("Image has no embedded 'file-system' partition to convert")?;
	let partition_table = parsed
		.partition_bytes("partition-table")
		.context("Image has no embedded 'partition-table' partition to convert")?;

	let flash = parse_flash_partition_table(partition_table)?;
	let flash_os_image = flash
		.iter()
		.find(|p| p.name == "os-image")
		.context("Flash table has no 'os-image' entry")?;

	let mut windowed: Vec<(&FlashPartition, &[u8])> = flash
		.iter()
		.filter(|fp| fp.base >= flash_os_image.base)
		.filter_map(|fp| parsed.partition_bytes(&fp.name).map(|bytes| (fp, bytes)))
		.collect();
	if windowed.is_empty() {
		bail!("No embedded partition maps onto the flash table's sysupgrade window");
	}
	windowed.sort_by_key(|(fp, _)| fp.base);

	let (last_flash, last_payload) = windowed.last().expect("checked non-empty above");
	let out_len = (last_flash.base - flash_os_image.base) as usize + last_payload.len();
	let mut out = vec![0xFFu8; out_len];
	for (fp, payload) in &windowed {
		ensure!(
			payload.len() as u32 <= fp.size,
			"Embedded partition '{}' ({} bytes) exceeds its flash partition ({} bytes)",
			fp.name,
			payload.len(),
			fp.size
		);
		let offset = (fp.base - flash_os_image.base) as usize;
		out[offset..offset + payload.len()].copy_from_slice(payload);
	}
	Ok(out)
}
