//! The image assembler.
//!
//! Turns a resolved [`BoardProfile`], a kernel image and a root-filesystem
//! image into either a factory SafeLoader container or a sysupgrade slice.
//! Everything here operates on in-memory byte buffers; nothing touches the
//! filesystem (see `main.rs` for the only place that does).

use anyhow::{bail, ensure, Context, Result};
use md5::{Digest, Md5};

use crate::epoch::BuildEpoch;
use crate::metapart::{build_extra_para, build_partition_table, build_soft_version, build_support_list};
use crate::partition::{FlashPartition, ImagePartition};
use crate::registry::BoardProfile;

/// The 16-byte salt prepended to the MD5 hash input of every factory
/// image. Not a secret — it is a fixed constant the stock bootloader also
/// uses to validate the envelope.
const MD5_SALT: [u8; 16] = [
	0x7A, 0x2B, 0x15, 0xED, 0x9B, 0x98, 0x59, 0x6D, 0xE5, 0x04, 0xAB, 0x44, 0xAC, 0x2A, 0x9F, 0x4E,
];

/// jffs2 end-of-filesystem sentinel appended to a padded root-filesystem
/// payload.
const JFFS2_EOF_MARKER: [u8; 4] = [0xDE, 0xAD, 0xC0, 0xDE];

const FACTORY_PREAMBLE_LEN: usize = 20;
const FACTORY_HEADER_LEN: usize = 4096;
const IMAGE_PARTITION_TABLE_LEN: usize = 2048;
/// `0x1014 + 0x800` = `0x1814`: offset of the first payload byte in a
/// factory image, right after the 2048-byte image partition table.
const FACTORY_PAYLOAD_OFFSET: usize = FACTORY_PREAMBLE_LEN + FACTORY_HEADER_LEN + IMAGE_PARTITION_TABLE_LEN;
/// Vendor banner window: the 4096-byte header minus its 4-byte length field.
const VENDOR_BANNER_LEN: usize = FACTORY_HEADER_LEN - 4;
const ALIGN_64K: u32 = 0x10000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BuildMode {
	Factory,
	Sysupgrade,
}

/// Everything the assembler needs for one build.
pub struct BuildOptions<'a> {
	pub board: &'a BoardProfile,
	pub kernel: &'a [u8],
	pub rootfs: &'a [u8],
	pub mode: BuildMode,
	pub jffs2_eof: bool,
	pub revision: Option<u32>,
	pub epoch: BuildEpoch,
}

fn align_up(value: u32, align: u32) -> u32 {
	(value + align - 1) / align * align
}

/// Step 1 of the assembler: compute the dynamic `os-image`/`file-system`
/// split against the profile's `firmware` region, without mutating the
/// profile. Returns a freshly derived flash list; the registry's own
/// `&'static [FlashPartition]` is left untouched so the same profile can
/// drive multiple builds in one process.
fn derive_flash_layout(board: &BoardProfile, kernel_len: u32, factory: bool) -> Result<Vec<FlashPartition>> {
	let Some(firmware_idx) = board.flash_index("firmware") else {
		return Ok(board.flash.to_vec());
	};
	let firmware = board.flash[firmware_idx];
	ensure!(
		kernel_len <= firmware.size,
		"Kernel image ({} bytes) exceeds the '{}' flash partition ({} bytes)",
		kernel_len,
		firmware.name,
		firmware.size
	);

	let os_image_base = firmware.base;
	let file_system_base_raw = firmware.base + kernel_len;
	let file_system_base = if factory {
		align_up(file_system_base_raw, ALIGN_64K)
	} else {
		file_system_base_raw
	};
	let file_system_size = (firmware.base + firmware.size).saturating_sub(file_system_base);

	let mut derived = Vec::with_capacity(board.flash.len() + 1);
	derived.extend_from_slice(&board.flash[..firmware_idx]);
	derived.push(FlashPartition::new("os-image", os_image_base, kernel_len));
	derived.push(FlashPartition::new("file-system", file_system_base, file_system_size));
	derived.extend_from_slice(&board.flash[firmware_idx + 1..]);
	Ok(derived)
}

/// Step 2: pad the root-filesystem payload with a jffs2 end-of-filesystem
/// marker when requested.
fn apply_jffs2_padding(rootfs: &[u8], file_system: Option<&FlashPartition>) -> Vec<u8> {
	let target_len = match file_system {
		Some(fs) => (align_up(rootfs.len() as u32 + fs.base, ALIGN_64K) + 4 - fs.base) as usize,
		None => align_up(rootfs.len() as u32, ALIGN_64K) as usize + 4,
	};
	let mut padded = rootfs.to_vec();
	padded.resize(target_len, 0xFF);
	let tail = padded.len() - 4;
	padded[tail..].copy_from_slice(&JFFS2_EOF_MARKER);
	padded
}

/// Steps 1–3: derive the flash layout, build every embedded partition in
/// the fixed materialisation order, and return them alongside the derived
/// flash list (the sysupgrade emitter needs both).
fn materialise(opts: &BuildOptions) -> Result<(Vec<FlashPartition>, Vec<ImagePartition>)> {
	let board = opts.board;
	let names = board.resolved_partition_names();
	let factory = opts.mode == BuildMode::Factory;
	let flash = derive_flash_layout(board, opts.kernel.len() as u32, factory)?;

	let file_system_flash = flash.iter().find(|p| p.name == "file-system");
	let rootfs_payload = if opts.jffs2_eof {
		apply_jffs2_padding(opts.rootfs, file_system_flash)
	} else {
		opts.rootfs.to_vec()
	};

	let partition_table = build_partition_table(&flash)?;
	let soft_version = build_soft_version(
		&board.software_version,
		board.compat_level,
		opts.revision,
		opts.epoch,
		board.padding_policy,
	);
	let support_list = build_support_list(board.support_list, board.padding_policy);

	let mut partitions = vec![
		ImagePartition::new(names.partition_table, partition_table),
		ImagePartition::new(names.soft_version, soft_version),
		ImagePartition::new(names.support_list, support_list),
		ImagePartition::new(names.os_image, opts.kernel.to_vec()),
		ImagePartition::new(names.file_system, rootfs_payload),
	];
	if let Some(marker) = board.extra_para {
		partitions.push(ImagePartition::new(names.extra_para, build_extra_para(marker, board.padding_policy)));
	}
	Ok((flash, partitions))
}

/// Build either a factory or a sysupgrade image, per `opts.mode`.
pub fn build_image(opts: &BuildOptions) -> Result<Vec<u8>> {
	let (flash, partitions) = materialise(opts)?;
	match opts.mode {
		BuildMode::Factory => build_factory(opts.board, &partitions),
		BuildMode::Sysupgrade => build_sysupgrade(opts.board, &flash, &partitions),
	}
}

/// Step 4, factory emit: preamble, MD5 placeholder, vendor block, image
/// partition table, concatenated payloads; then the MD5 envelope is
/// computed over the finished buffer and written back in.
fn build_factory(board: &BoardProfile, partitions: &[ImagePartition]) -> Result<Vec<u8>> {
	let table = build_image_partition_table(partitions)?;

	let payload_total: usize = partitions.iter().map(|p| p.data.len()).sum();
	let total_len = FACTORY_PAYLOAD_OFFSET + payload_total;

	let mut out = vec![0u8; total_len];
	out[0..4].copy_from_slice(&(total_len as u32).to_be_bytes());
	// out[4..20] (MD5) is filled in last.

	let banner = board.vendor_banner.unwrap_or("");
	out[20..24].copy_from_slice(&(banner.len() as u32).to_be_bytes());
	ensure!(
		banner.len() <= VENDOR_BANNER_LEN,
		"Vendor banner ({} bytes) does not fit in the {}-byte header window",
		banner.len(),
		VENDOR_BANNER_LEN
	);
	out[24..24 + banner.len()].copy_from_slice(banner.as_bytes());
	let table_start = FACTORY_PAYLOAD_OFFSET - IMAGE_PARTITION_TABLE_LEN;
	for b in &mut out[24 + banner.len()..table_start] {
		*b = 0xFF;
	}

	out[table_start..table_start + IMAGE_PARTITION_TABLE_LEN].copy_from_slice(&table);

	let mut cursor = FACTORY_PAYLOAD_OFFSET;
	for part in partitions {
		out[cursor..cursor + part.data.len()].copy_from_slice(&part.data);
		cursor += part.data.len();
	}

	let mut hasher = Md5::new();
	hasher.update(MD5_SALT);
	hasher.update(&out[20..]);
	out[4..20].copy_from_slice(&hasher.finalize());

	Ok(out)
}

/// Build the 2048-byte image partition table: `fwup-ptn <name> base
/// 0x<base:5hex> size 0x<size:5hex>\t\r\n` per payload, bases accumulating
/// from 0x800 (the table's own footprint).
fn build_image_partition_table(partitions: &[ImagePartition]) -> Result<[u8; IMAGE_PARTITION_TABLE_LEN]> {
	let mut body = Vec::new();
	let mut cursor = IMAGE_PARTITION_TABLE_LEN as u32;
	for part in partitions {
		body.extend_from_slice(
			format!(
				"fwup-ptn {} base 0x{:05x} size 0x{:05x}\t\r\n",
				part.name,
				cursor,
				part.data.len()
			)
			.as_bytes(),
		);
		cursor += part.data.len() as u32;
	}
	body.push(0);
	if body.len() > IMAGE_PARTITION_TABLE_LEN {
		bail!(
			"Image partition table does not fit in {} bytes (needs {})",
			IMAGE_PARTITION_TABLE_LEN,
			body.len()
		);
	}
	let mut table = [0xFFu8; IMAGE_PARTITION_TABLE_LEN];
	table[..body.len()].copy_from_slice(&body);
	Ok(table)
}

/// Map a *flash-table* partition name (always the literal
/// `"os-image"`/`"file-system"` the dynamic split produces, see
/// [`derive_flash_layout`]) onto the corresponding *embedded-container*
/// partition name, applying the profile's `resolved_partition_names()`
/// overrides. Flash partitions outside the five well-known names (`art`,
/// `config`, `fs-uboot`, ...) pass through unchanged and simply won't match
/// any embedded payload.
fn resolve_flash_payload_name<'a>(names: &crate::registry::PartitionNames, flash_name: &'a str) -> &'a str {
	match flash_name {
		"partition-table" => names.partition_table,
		"soft-version" => names.soft_version,
		"os-image" => names.os_image,
		"support-list" => names.support_list,
		"file-system" => names.file_system,
		other => other,
	}
}

/// Sysupgrade emit: a contiguous slice of flash between
/// `first_sysupgrade_partition` and `last_sysupgrade_partition`, with every
/// matching payload copied to its absolute flash offset.
fn build_sysupgrade(board: &BoardProfile, flash: &[FlashPartition], partitions: &[ImagePartition]) -> Result<Vec<u8>> {
	let names = board.resolved_partition_names();

	let first_idx = flash
		.iter()
		.position(|p| p.name == board.first_sysupgrade_partition)
		.with_context(|| format!("Sysupgrade start partition '{}' not found in flash table", board.first_sysupgrade_partition))?;
	let last_idx = flash
		.iter()
		.position(|p| p.name == board.last_sysupgrade_partition)
		.with_context(|| format!("Sysupgrade end partition '{}' not found in flash table", board.last_sysupgrade_partition))?;
	ensure!(
		first_idx < last_idx,
		"Sysupgrade start partition '{}' must precede end partition '{}' in flash order",
		board.first_sysupgrade_partition,
		board.last_sysupgrade_partition
	);

	let first = &flash[first_idx];
	let last = &flash[last_idx];
	let last_payload_name = resolve_flash_payload_name(&names, board.last_sysupgrade_partition);
	let last_payload = partitions
		.iter()
		.find(|p| p.name == last_payload_name)
		.with_context(|| format!("No embedded payload named '{}' to size the sysupgrade image", last_payload_name))?;

	let out_len = (last.base - first.base) as usize + last_payload.data.len();
	let mut out = vec![0xFFu8; out_len];

	for flash_part in &flash[first_idx..=last_idx] {
		let payload_name = resolve_flash_payload_name(&names, flash_part.name);
		let Some(payload) = partitions.iter().find(|p| p.name == payload_name) else {
			continue;
		};
		ensure!(
			payload.data.len() as u32 <= flash_part.size,
			"Embedded partition '{}' ({} bytes) exceeds its flash partition ({} bytes)",
			flash_part.name,
			payload.data.len(),
			flash_part.size
		);
		let offset = (flash_part.base - first.base) as usize;
		out[offset..offset + payload.data.len()].copy_from_slice(&payload.data);
	}

	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::registry;

	fn opts<'a>(board: &'a BoardProfile, kernel: &'a [u8], rootfs: &'a [u8], mode: BuildMode) -> BuildOptions<'a> {
		BuildOptions {
			board,
			kernel,
			rootfs,
			mode,
			jffs2_eof: false,
			revision: None,
			epoch: BuildEpoch::WALL_CLOCK,
		}
	}

	#[test]
	fn factory_md5_envelope_verifies() {
		let board = registry::find("CPE510").unwrap();
		let kernel = vec![0xAAu8; 128 * 1024];
		let rootfs = vec![0xBBu8; 1024 * 1024];
		let out = build_image(&opts(board, &kernel, &rootfs, BuildMode::Factory)).unwrap();

		let total_len = u32::from_be_bytes(out[0..4].try_into().unwrap()) as usize;
		assert_eq!(total_len, out.len());

		let mut hasher = Md5::new();
		hasher.update(MD5_SALT);
		hasher.update(&out[20..]);
		let digest: [u8; 16] = hasher.finalize().into();
		assert_eq!(&out[4..20], &digest);
	}

	#[test]
	fn factory_scenario_s1_cpe510() {
		let board = registry::find("CPE510").unwrap();
		let kernel = vec![0xAAu8; 128 * 1024];
		let rootfs = vec![0xBBu8; 1024 * 1024];
		let out = build_image(&opts(board, &kernel, &rootfs, BuildMode::Factory)).unwrap();

		assert_eq!(u32::from_be_bytes(out[0..4].try_into().unwrap()) as usize, out.len());
		assert_eq!(&out[20..24], &0x1Du32.to_be_bytes());
		assert_eq!(&out[24..53], b"CPE510(TP-LINK|UN|N300-5):1.0".as_slice());
		assert_eq!(u32::from_be_bytes(out[20..24].try_into().unwrap()), 29);
	}

	#[test]
	fn sysupgrade_scenario_s2_cpe510() {
		let board = registry::find("CPE510").unwrap();
		let kernel = vec![0xAAu8; 128 * 1024];
		let rootfs = vec![0xBBu8; 1024 * 1024];
		let out = build_image(&opts(board, &kernel, &rootfs, BuildMode::Sysupgrade)).unwrap();
		assert_eq!(&out[0..128 * 1024], kernel.as_slice());
	}

	#[test]
	fn archer_a7_v5_carries_extra_para() {
		let board = registry::find("ARCHER-A7-V5").unwrap();
		let kernel = vec![0x11u8; 64 * 1024];
		let rootfs = vec![0x22u8; 512 * 1024];
		let (_, partitions) = materialise(&opts(board, &kernel, &rootfs, BuildMode::Factory)).unwrap();
		assert_eq!(partitions.len(), 6);
		assert_eq!(partitions.last().unwrap().name, "extra-para");
	}

	#[test]
	fn eap225_outdoor_has_no_trailing_pad_byte() {
		let board = registry::find("EAP225-OUTDOOR-V1").unwrap();
		let kernel = vec![0x11u8; 64 * 1024];
		let rootfs = vec![0x22u8; 512 * 1024];
		let (_, partitions) = materialise(&opts(board, &kernel, &rootfs, BuildMode::Factory)).unwrap();
		let soft_version = &partitions.iter().find(|p| p.name == "soft-version").unwrap().data;
		let len = u32::from_be_bytes(soft_version[0..4].try_into().unwrap()) as usize;
		assert_eq!(soft_version.len(), 8 + len, "no trailing pad byte expected");
		assert_eq!(len, 16, "compat_level == 1 must keep the full numeric record");
	}

	#[test]
	fn kernel_larger_than_firmware_is_rejected() {
		let board = registry::find("CPE510").unwrap();
		let firmware_size = board.flash[board.flash_index("firmware").unwrap()].size;
		let kernel = vec![0u8; firmware_size as usize + 1];
		let rootfs = vec![0u8; 1024];
		assert!(build_image(&opts(board, &kernel, &rootfs, BuildMode::Factory)).is_err());
	}

	#[test]
	fn jffs2_tail_has_eof_marker_and_alignment() {
		let board = registry::find("CPE510").unwrap();
		let kernel = vec![0xAAu8; 128 * 1024];
		let rootfs = vec![0xBBu8; 100];
		let mut build_opts = opts(board, &kernel, &rootfs, BuildMode::Factory);
        build_opts.jffs2_eof = true;
		let (_, partitions) = materialise(&build_opts).unwrap();
		let fs_payload = &partitions.iter().find(|p| p.name == "file-system").unwrap().data;
		assert_eq!(&fs_payload[fs_payload.len() - 4..], &JFFS2_EOF_MARKER);
		assert_eq!(fs_payload.len() % ALIGN_64K as usize, 4);
	}
}
