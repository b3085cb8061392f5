#![cfg(test)]
//! Cross-module, end-to-end scenarios. Module-local unit tests live beside
//! the code they exercise; this file is for behaviour that only shows up
//! once the registry, assembler, parser and driver cooperate.

use anyhow::Result;

use crate::assemble::{build_image, BuildMode, BuildOptions};
use crate::driver::{run_convert, run_extract, run_info};
use crate::epoch::BuildEpoch;
use crate::parse::ParsedImage;
use crate::registry;

fn build(board_id: &str, kernel: &[u8], rootfs: &[u8], mode: BuildMode) -> Result<Vec<u8>> {
	let board = registry::find_or_err(board_id)?;
	build_image(&BuildOptions {
		board,
		kernel,
		rootfs,
		mode,
		jffs2_eof: false,
		revision: None,
		epoch: BuildEpoch::WALL_CLOCK,
	})
}

/// Property 2: every profile's `partition-table` record fits in 2048
/// bytes, prefix and NUL terminator included.
#[test]
fn every_profile_partition_table_fits() {
	for board in registry::all() {
		let raw = crate::metapart::build_partition_table(board.flash).unwrap();
		assert_eq!(raw.len(), 2048);
	}
}

/// Property 3: every profile's flash geometry is ascending and
/// non-overlapping.
#[test]
fn every_profile_flash_geometry_is_valid() {
	for board in registry::all() {
		board.check_flash_geometry().unwrap();
	}
}

/// S3: Archer A7-V5 carries an `extra-para` partition with marker `01 00`
/// and the image table has six rows.
#[test]
fn archer_a7_v5_image_table_has_six_rows_with_extra_para() {
	let kernel = vec![0x11u8; 256 * 1024];
	let rootfs = vec![0x22u8; 2 * 1024 * 1024];
	let out = build("ARCHER-A7-V5", &kernel, &rootfs, BuildMode::Factory).unwrap();

	let parsed = ParsedImage::parse(&out).unwrap();
	assert_eq!(parsed.entries.len(), 6);
	assert_eq!(parsed.entries.last().unwrap().name, "extra-para");
	let extra_para_bytes = parsed.partition_bytes("extra-para").unwrap();
	assert_eq!(crate::metapart::parse_extra_para(extra_para_bytes).unwrap(), [0x01, 0x00]);
}

/// S4: EAP225-Outdoor-V1 has no trailing pad byte on its meta-framed
/// records, but still carries a compat-level field (compat_level == 1).
#[test]
fn eap225_outdoor_v1_has_no_padding_but_keeps_compat_level() {
	let kernel = vec![0x33u8; 256 * 1024];
	let rootfs = vec![0x44u8; 2 * 1024 * 1024];
	let out = build("EAP225-OUTDOOR-V1", &kernel, &rootfs, BuildMode::Factory).unwrap();

	let info = run_info(&out).unwrap();
	match info.soft_version {
		Some(crate::metapart::SoftVersion::Numeric { compat_level, .. }) => {
			assert_eq!(compat_level, Some(1));
		}
		other => panic!("expected numeric soft-version, got {:?}", other),
	}
}

/// S5: info on a built image lists its five embedded partitions and the
/// full support-list text.
#[test]
fn info_reports_five_partitions_and_support_list() {
	let kernel = vec![0xAAu8; 128 * 1024];
	let rootfs = vec![0xBBu8; 1024 * 1024];
	let out = build("CPE510", &kernel, &rootfs, BuildMode::Factory).unwrap();

	let info = run_info(&out).unwrap();
	assert_eq!(info.partitions.len(), 5);
	assert!(info.support_list.unwrap().contains("CPE510"));
}

/// S8: idempotent extract+convert. Extracting every partition from a
/// factory image and rebuilding via convert yields a byte-identical
/// sysupgrade image to building the sysupgrade image directly from the
/// same kernel and rootfs.
#[test]
fn extract_then_convert_matches_direct_sysupgrade_build() {
	let kernel = vec![0x55u8; 256 * 1024];
	let rootfs = vec![0x66u8; 2 * 1024 * 1024];

	let factory = build("ARCHER-A7-V5", &kernel, &rootfs, BuildMode::Factory).unwrap();
	let converted = run_convert(&factory).unwrap();
	let direct_sysupgrade = build("ARCHER-A7-V5", &kernel, &rootfs, BuildMode::Sysupgrade).unwrap();

	// ARCHER-A7-V5's sysupgrade window runs os-image..support-list, so a
	// faithful `convert` must relocate support-list too, not just
	// os-image/file-system, to match a direct sysupgrade build exactly.
	assert_eq!(converted, direct_sysupgrade);

	let extracted = run_extract(&factory).unwrap();
	assert_eq!(extracted.len(), 6);
	assert!(extracted.iter().any(|p| p.name == "os-image"));
	assert!(extracted.iter().any(|p| p.name == "file-system"));
}

/// Property 9: with a fixed `SOURCE_DATE_EPOCH`, the numeric soft-version
/// BCD date matches exactly.
#[test]
fn replayable_build_epoch_propagates_to_soft_version() {
	let board = registry::find_or_err("CPE510").unwrap();
	let epoch = BuildEpoch(Some(1_577_836_800));
	let framed = crate::metapart::build_soft_version(&board.software_version, board.compat_level, None, epoch, board.padding_policy);
	match crate::metapart::parse_soft_version(&framed).unwrap() {
		crate::metapart::SoftVersion::Numeric { year, month, day, .. } => {
			assert_eq!(year, (0x20, 0x20));
			assert_eq!(month, 0x01);
			assert_eq!(day, 0x01);
		}
		other => panic!("expected numeric soft-version, got {:?}", other),
	}
}

/// A profile whose `partition_names` override renames the embedded
/// container partitions (here, to `os-image@1`/`file-system@1`) must still
/// build a sysupgrade image: the sysupgrade window names flash-table
/// partitions, which keep the dynamic split's literal `os-image`/
/// `file-system` names regardless of the embedded-name override.
#[test]
fn sysupgrade_build_succeeds_with_renamed_embedded_partitions() {
	let kernel = vec![0x77u8; 256 * 1024];
	let rootfs = vec![0x88u8; 2 * 1024 * 1024];
	let out = build("ARCHER-C59-V2", &kernel, &rootfs, BuildMode::Sysupgrade).unwrap();
	assert_eq!(&out[..kernel.len()], kernel.as_slice());
	// `file-system` must also have been relocated, not skipped: without the
	// resolved-name lookup fix this region stays the 0xFF fill instead.
	assert_eq!(&out[kernel.len()..kernel.len() + rootfs.len()], rootfs.as_slice());
}
