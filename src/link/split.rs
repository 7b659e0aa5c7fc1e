//! Partitioning the table into a base and configuration splits.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::core::config::ConfigDescription;
use crate::core::table::{Entry, ResourceTable};
use crate::link::filter::{apply_preferred_density, AxisConfigFilter};
use crate::util::Diagnostics;

/// The configurations one split claims.
#[derive(Debug, Clone, Default)]
pub struct SplitConstraints {
    pub configs: BTreeSet<ConfigDescription>,
}

impl SplitConstraints {
    /// Human-readable name used in the split manifest:
    /// `config.<cfg>[_<cfg>…]`.
    pub fn name(&self) -> String {
        let parts: Vec<String> = self.configs.iter().map(|c| c.to_string()).collect();
        format!("config.{}", parts.join("_"))
    }

    /// Whether this split claims `config`: some constraint config must
    /// agree with it on every axis the constraint specifies.
    pub fn claims(&self, config: &ConfigDescription) -> bool {
        self.configs.iter().any(|constraint| {
            let constrained_axes = constraint.diff(&ConfigDescription::default());
            constrained_axes != 0 && config.diff(constraint) & constrained_axes == 0
        })
    }
}

/// Split verification failures.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("split configurations overlap: '{first}' and '{second}' both claim '{config}'")]
    Overlap {
        first: String,
        second: String,
        config: String,
    },
}

/// Options applied while splitting.
#[derive(Debug, Clone, Default)]
pub struct TableSplitterOptions {
    /// `-c` filter; values whose config fails it are dropped from the base.
    pub config_filter: Option<AxisConfigFilter>,
    /// `--preferred-density` in dpi.
    pub preferred_density: Option<u16>,
}

/// Adjust constraints for the minimum SDK: an SDK qualifier at or below
/// `min_sdk` is cleared, otherwise SDK-collapsed resources never match.
pub fn adjust_split_constraints(constraints: &[SplitConstraints], min_sdk: u16) -> Vec<SplitConstraints> {
    constraints
        .iter()
        .map(|split| SplitConstraints {
            configs: split
                .configs
                .iter()
                .map(|config| {
                    if config.sdk_version != 0 && config.sdk_version <= min_sdk {
                        config.without_sdk_version()
                    } else {
                        config.clone()
                    }
                })
                .collect(),
        })
        .collect()
}

/// Partitions a table along an ordered list of split constraints.
pub struct TableSplitter {
    constraints: Vec<SplitConstraints>,
    options: TableSplitterOptions,
    splits: Vec<ResourceTable>,
}

impl TableSplitter {
    pub fn new(constraints: Vec<SplitConstraints>, options: TableSplitterOptions) -> Self {
        TableSplitter {
            constraints,
            options,
            splits: Vec::new(),
        }
    }

    /// Check that no two splits claim an overlapping configuration.
    pub fn verify_split_constraints(&self, diag: &Diagnostics) -> bool {
        for (i, first) in self.constraints.iter().enumerate() {
            for second in &self.constraints[i + 1..] {
                if let Some(config) = first
                    .configs
                    .iter()
                    .find(|c| second.claims(c))
                    .or_else(|| second.configs.iter().find(|c| first.claims(c)))
                {
                    diag.error(
                        SplitError::Overlap {
                            first: first.name(),
                            second: second.name(),
                            config: config.to_string(),
                        }
                        .to_string(),
                    );
                    return false;
                }
            }
        }
        true
    }

    /// Partition `table`; the base keeps everything unclaimed.
    pub fn split_table(&mut self, table: &mut ResourceTable) {
        if let Some(preferred) = self.options.preferred_density {
            apply_preferred_density(table, preferred);
        }

        self.splits = self
            .constraints
            .iter()
            .map(|_| ResourceTable::new())
            .collect();

        for package in &mut table.packages {
            let package_name = package.name.clone();
            let package_id = package.id;
            for group in &mut package.types {
                let ty = group.ty;
                let type_id = group.id;
                for entry in &mut group.entries {
                    let skeleton = EntrySkeleton {
                        package_name: &package_name,
                        package_id,
                        ty,
                        type_id,
                        entry_name: entry.name.clone(),
                        entry_id: entry.id,
                        visibility: entry.visibility,
                    };

                    let mut remaining = Vec::with_capacity(entry.values.len());
                    for cv in entry.values.drain(..) {
                        let claimed = self
                            .constraints
                            .iter()
                            .position(|split| split.claims(&cv.config));
                        match claimed {
                            Some(index) => {
                                split_entry_for(&mut self.splits[index], &skeleton)
                                    .values
                                    .push(cv);
                            }
                            None => {
                                let keep = self
                                    .options
                                    .config_filter
                                    .as_ref()
                                    .map(|filter| filter.matches(&cv.config))
                                    .unwrap_or(true);
                                if keep {
                                    remaining.push(cv);
                                }
                            }
                        }
                    }
                    entry.values = remaining;
                }
            }
        }
    }

    /// The split tables, in constraint order.
    pub fn splits(&self) -> &[ResourceTable] {
        &self.splits
    }

    pub fn into_splits(self) -> Vec<ResourceTable> {
        self.splits
    }
}

struct EntrySkeleton<'a> {
    package_name: &'a str,
    package_id: Option<u8>,
    ty: crate::core::name::ResourceType,
    type_id: Option<u8>,
    entry_name: String,
    entry_id: Option<u16>,
    visibility: crate::core::value::Visibility,
}

/// Mirror the package/type/entry skeleton (with IDs) into a split.
fn split_entry_for<'a>(split: &'a mut ResourceTable, skeleton: &EntrySkeleton<'_>) -> &'a mut Entry {
    let split_package = split.find_or_create_package(skeleton.package_name);
    split_package.id = skeleton.package_id;
    let split_group = split_package.find_or_create_type(skeleton.ty);
    split_group.id = skeleton.type_id;
    let split_entry = split_group.find_or_create_entry(&skeleton.entry_name);
    split_entry.id = skeleton.entry_id;
    split_entry.visibility = skeleton.visibility;
    split_entry
}
