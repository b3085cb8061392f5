//! The board profile registry.
//!
//! A [`BoardProfile`] parameterises every other part of the codec: its
//! vendor banner, its `support-list` text, its on-flash geometry, its
//! `soft-version` contents and its sysupgrade window. The registry itself
//! is a static, ordered, compiled table — board profiles form a closed,
//! vetted set curated by this crate, not operator-authored configuration,
//! so there is no `device.toml`/`DeviceRegistry::scan` equivalent here.

use anyhow::{bail, Context, Result};

use crate::partition::{FlashPartition, PaddingPolicy, SoftwareVersionSpec};

/// The five — six, counting `extra-para` — well-known partition names a
/// profile may rename. Defaults are applied by [`BoardProfile::resolved_partition_names`]
/// wherever the profile leaves an override unset.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PartitionNames {
	pub partition_table: &'static str,
	pub soft_version: &'static str,
	pub os_image: &'static str,
	pub support_list: &'static str,
	pub file_system: &'static str,
	pub extra_para: &'static str,
}

const DEFAULT_PARTITION_NAMES: PartitionNames = PartitionNames {
	partition_table: "partition-table",
	soft_version: "soft-version",
	os_image: "os-image",
	support_list: "support-list",
	file_system: "file-system",
	extra_para: "extra-para",
};

/// Per-profile overrides of the well-known partition names. Most profiles
/// leave every field `None` and inherit [`DEFAULT_PARTITION_NAMES`]
/// wholesale; a handful of dialects suffix names (e.g. `@1`) and set the
/// relevant field explicitly.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct PartitionNameOverrides {
	pub partition_table: Option<&'static str>,
	pub soft_version: Option<&'static str>,
	pub os_image: Option<&'static str>,
	pub support_list: Option<&'static str>,
	pub file_system: Option<&'static str>,
	pub extra_para: Option<&'static str>,
}

impl PartitionNameOverrides {
	pub const NONE: PartitionNameOverrides = PartitionNameOverrides {
		partition_table: None,
		soft_version: None,
		os_image: None,
		support_list: None,
		file_system: None,
		extra_para: None,
	};
}

/// A single board's container parameters.
///
/// Construct these as `const` values in [`BOARDS`] below; everything here
/// is process-lifetime and immutable.
#[derive(Copy, Clone, Debug)]
pub struct BoardProfile {
	/// Case-insensitive lookup key, e.g. `"CPE510"`.
	pub id: &'static str,
	pub vendor_banner: Option<&'static str>,
	pub support_list: &'static str,
	pub padding_policy: PaddingPolicy,
	pub software_version: SoftwareVersionSpec,
	/// Zero means "no compat-level field in the numeric `soft-version`".
	pub compat_level: u32,
	/// Ascending, non-overlapping flash geometry.
	pub flash: &'static [FlashPartition],
	pub first_sysupgrade_partition: &'static str,
	pub last_sysupgrade_partition: &'static str,
	pub partition_names: PartitionNameOverrides,
	/// `Some(marker)` when this profile requires an `extra-para` embedded
	/// partition, per the substring table in the external interfaces.
	pub extra_para: Option<[u8; 2]>,
}

impl BoardProfile {
	/// The five well-known partition names with defaults applied wherever
	/// this profile leaves an override unset.
	pub fn resolved_partition_names(&self) -> PartitionNames {
		let o = &self.partition_names;
		PartitionNames {
			partition_table: o.partition_table.unwrap_or(DEFAULT_PARTITION_NAMES.partition_table),
			soft_version: o.soft_version.unwrap_or(DEFAULT_PARTITION_NAMES.soft_version),
			os_image: o.os_image.unwrap_or(DEFAULT_PARTITION_NAMES.os_image),
			support_list: o.support_list.unwrap_or(DEFAULT_PARTITION_NAMES.support_list),
			file_system: o.file_system.unwrap_or(DEFAULT_PARTITION_NAMES.file_system),
			extra_para: o.extra_para.unwrap_or(DEFAULT_PARTITION_NAMES.extra_para),
		}
	}

	/// Find the index of a named flash partition.
	pub fn flash_index(&self, name: &str) -> Option<usize> {
		self.flash.iter().position(|p| p.name == name)
	}

	/// Check the ascending/non-overlapping invariant this profile's flash
	/// geometry must hold (testable property 3).
	pub fn check_flash_geometry(&self) -> Result<()> {
		for pair in self.flash.windows(2) {
			let (prev, next) = (&pair[0], &pair[1]);
			if next.base < prev.end() {
				bail!(
					"Profile '{}': flash partition '{}' (0x{:x}..0x{:x}) overlaps '{}' (starts 0x{:x})",
					self.id,
					prev.name,
					prev.base,
					prev.end(),
					next.name,
					next.base
				);
			}
		}
		Ok(())
	}
}

macro_rules! flash {
	($(($name:expr, $base:expr, $size:expr)),* $(,)?) => {
		&[$(FlashPartition::new($name, $base, $size)),*]
	};
}

/// The compiled board table, in registration order. `find` returns the
/// first case-insensitive match, per testable property 1.
pub static BOARDS: &[BoardProfile] = &[
	BoardProfile {
		id: "CPE510",
		vendor_banner: Some("CPE510(TP-LINK|UN|N300-5):1.0"),
		support_list: "SupportList:\nCPE510(TP-LINK|UN|N300-5):1.0\r\n",
		padding_policy: PaddingPolicy::Pad(0xff),
		software_version: SoftwareVersionSpec::Numeric { major: 2, minor: 0, patch: 0 },
		compat_level: 0,
		flash: flash![
			("fs-uboot", 0x00000, 0x20000),
			("partition-table", 0x20000, 0x10000),
			("firmware", 0x40000, 0x771000),
			("support-list", 0x7b1000, 0x10000),
			("art", 0x7c1000, 0x10000),
		],
		first_sysupgrade_partition: "os-image",
		last_sysupgrade_partition: "support-list",
		partition_names: PartitionNameOverrides::NONE,
		extra_para: None,
	},
	BoardProfile {
		id: "ARCHER-A7-V5",
		vendor_banner: Some("ArcherA7v5(TP-LINK|UN|N300-5):1.0"),
		support_list: "SupportList:\nArcher A7v5(TP-LINK|UN|N300-5):1.0\r\n",
		padding_policy: PaddingPolicy::Pad(0xff),
		software_version: SoftwareVersionSpec::Numeric { major: 2, minor: 0, patch: 0 },
		compat_level: 0,
		flash: flash![
			("fs-uboot", 0x000000, 0x20000),
			("partition-table", 0x020000, 0x10000),
			("firmware", 0x040000, 0xf70000),
			("support-list", 0xfb0000, 0x10000),
			("art", 0xfc0000, 0x10000),
			("config", 0xfd0000, 0x20000),
		],
		first_sysupgrade_partition: "os-image",
		last_sysupgrade_partition: "support-list",
		partition_names: PartitionNameOverrides::NONE,
		extra_para: Some([0x01, 0x00]),
	},
	BoardProfile {
		id: "EAP225-OUTDOOR-V1",
		vendor_banner: Some("EAP225-Outdoor(TP-LINK|UN|N300-2):1.0"),
		support_list: "SupportList:\nEAP225-Outdoor(TP-LINK|UN|N300-2):1.0\r\n",
		padding_policy: PaddingPolicy::None,
		software_version: SoftwareVersionSpec::Numeric { major: 2, minor: 0, patch: 0 },
		compat_level: 1,
		flash: flash![
			("fs-uboot", 0x00000, 0x20000),
			("partition-table", 0x20000, 0x10000),
			("firmware", 0x40000, 0x7b0000),
			("support-list", 0x7f0000, 0x10000),
		],
		first_sysupgrade_partition: "os-image",
		last_sysupgrade_partition: "support-list",
		partition_names: PartitionNameOverrides::NONE,
		extra_para: None,
	},
	BoardProfile {
		id: "ARCHER-C6-V2",
		vendor_banner: Some("ArcherC6v2(TP-LINK|UN|N300-5):1.0"),
		support_list: "SupportList:\nArcher C6v2(TP-LINK|UN|N300-5):1.0\r\n",
		padding_policy: PaddingPolicy::Pad(0xff),
		software_version: SoftwareVersionSpec::Numeric { major: 1, minor: 0, patch: 0 },
		compat_level: 0,
		flash: flash![
			("fs-uboot", 0x00000, 0x20000),
			("partition-table", 0x20000, 0x10000),
			("firmware", 0x40000, 0x7a0000),
			("support-list", 0x7e0000, 0x10000),
			("art", 0x7f0000, 0x10000),
		],
		first_sysupgrade_partition: "os-image",
		last_sysupgrade_partition: "support-list",
		partition_names: PartitionNameOverrides::NONE,
		extra_para: Some([0x00, 0x01]),
	},
	BoardProfile {
		id: "EAP245-V3",
		vendor_banner: Some("EAP245(TP-LINK|UN|N300-5):3.0"),
		support_list: "SupportList:\nEAP245(TP-LINK|UN|N300-5):3.0\r\n",
		padding_policy: PaddingPolicy::Pad(0xff),
		software_version: SoftwareVersionSpec::Numeric { major: 3, minor: 0, patch: 0 },
		compat_level: 0,
		flash: flash![
			("fs-uboot", 0x00000, 0x20000),
			("partition-table", 0x20000, 0x10000),
			("firmware", 0x40000, 0x7a0000),
			("support-list", 0x7e0000, 0x10000),
			("art", 0x7f0000, 0x10000),
		],
		first_sysupgrade_partition: "os-image",
		last_sysupgrade_partition: "support-list",
		partition_names: PartitionNameOverrides::NONE,
		extra_para: Some([0x01, 0x01]),
	},
	BoardProfile {
		id: "ARCHER-C59-V2",
		vendor_banner: Some("ArcherC59v2(TP-LINK|UN|N300-5):2.0"),
		support_list: "SupportList:\nArcher C59v2(TP-LINK|UN|N300-5):2.0\r\n",
		padding_policy: PaddingPolicy::Pad(0xff),
		software_version: SoftwareVersionSpec::Numeric { major: 2, minor: 0, patch: 0 },
		compat_level: 0,
		flash: flash![
			("fs-uboot", 0x00000, 0x20000),
			("partition-table", 0x20000, 0x10000),
			("firmware", 0x40000, 0x770000),
			("support-list", 0x7b0000, 0x10000),
			("art", 0x7c0000, 0x10000),
			("config", 0x7d0000, 0x20000),
		],
		// The sysupgrade window names flash-table partitions (always the
		// literal "os-image"/"file-system" the dynamic split produces, see
		// assemble::derive_flash_layout), not the overridden embedded names.
		first_sysupgrade_partition: "os-image",
		last_sysupgrade_partition: "support-list",
		partition_names: PartitionNameOverrides {
			os_image: Some("os-image@1"),
			file_system: Some("file-system@1"),
			..PartitionNameOverrides::NONE
		},
		extra_para: Some([0x01, 0x00]),
	},
];

/// Look up a board profile by case-insensitive id. Per testable property
/// 1, the first match in registration order wins.
pub fn find(id: &str) -> Option<&'static BoardProfile> {
	BOARDS.iter().find(|p| p.id.eq_ignore_ascii_case(id))
}

/// Look up a board profile, turning a miss into a diagnostic `InvalidInput`
/// error naming the requested id.
pub fn find_or_err(id: &str) -> Result<&'static BoardProfile> {
	find(id).with_context(|| format!("Unknown board id '{}'", id))
}

/// Every registered board id, in registration order, for `--list`.
pub fn all() -> &'static [BoardProfile] {
	BOARDS
}
