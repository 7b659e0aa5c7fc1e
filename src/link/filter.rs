//! Product and configuration filtering.

use std::collections::BTreeSet;

use crate::core::config::{ConfigDescription, CONFIG_DENSITY};
use crate::core::name::ResourceName;
use crate::core::table::{Entry, ResourceTable};
use crate::util::Diagnostics;

/// Keeps one value per (entry, config) according to the requested
/// product set; untagged values act as the `default` product.
pub struct ProductFilter {
    products: BTreeSet<String>,
}

impl ProductFilter {
    pub fn new(products: BTreeSet<String>) -> Self {
        ProductFilter { products }
    }

    pub fn consume(&self, table: &mut ResourceTable, diag: &Diagnostics) -> bool {
        let mut error = false;
        for package in &mut table.packages {
            for group in &mut package.types {
                for entry in &mut group.entries {
                    let name =
                        ResourceName::new(package.name.clone(), group.ty, entry.name.clone());
                    if !self.filter_entry(&name, entry, diag) {
                        error = true;
                    }
                }
            }
        }
        !error
    }

    fn filter_entry(&self, name: &ResourceName, entry: &mut Entry, diag: &Diagnostics) -> bool {
        let mut error = false;

        let configs: BTreeSet<ConfigDescription> =
            entry.values.iter().map(|cv| cv.config.clone()).collect();

        let mut keep: Vec<(ConfigDescription, String)> = Vec::new();
        for config in configs {
            let mut selected: Option<&str> = None;
            let mut fallback: Option<&str> = None;

            for cv in entry.values.iter().filter(|cv| cv.config == config) {
                if cv.product.is_empty() || cv.product == "default" {
                    if fallback.is_some() {
                        diag.error_at(
                            &cv.value.source,
                            format!(
                                "multiple default products defined for resource '{}' with config '{}'",
                                name, config
                            ),
                        );
                        error = true;
                    }
                    fallback = Some(&cv.product);
                } else if self.products.contains(&cv.product) {
                    if selected.is_some() {
                        diag.error_at(
                            &cv.value.source,
                            format!(
                                "multiple products match resource '{}' with config '{}'",
                                name, config
                            ),
                        );
                        error = true;
                    }
                    selected = Some(&cv.product);
                }
            }

            match selected.or(fallback) {
                Some(product) => keep.push((config, product.to_string())),
                None => {
                    let source = entry
                        .values
                        .iter()
                        .find(|cv| cv.config == config)
                        .map(|cv| cv.value.source.clone())
                        .unwrap_or_default();
                    diag.error_at(
                        &source,
                        format!(
                            "no matching product for resource '{}' with config '{}'",
                            name, config
                        ),
                    );
                    error = true;
                }
            }
        }

        if !error {
            entry
                .values
                .retain(|cv| keep.iter().any(|(c, p)| *c == cv.config && *p == cv.product));
            // The survivors are unambiguous now; drop the tags.
            for cv in &mut entry.values {
                cv.product.clear();
            }
        }
        !error
    }
}

/// Filter for the `-c` option: a config survives when, on every axis
/// the filter constrains, it is either unspecified or matched by one of
/// the filter configs.
#[derive(Debug, Clone, Default)]
pub struct AxisConfigFilter {
    configs: Vec<ConfigDescription>,
    axis_mask: u32,
}

impl AxisConfigFilter {
    pub fn new() -> Self {
        AxisConfigFilter::default()
    }

    /// Returns the axes this config constrains; densities are rejected
    /// by the caller (`--preferred-density` handles those).
    pub fn add_config(&mut self, config: ConfigDescription) -> u32 {
        let axes = config.diff(&ConfigDescription::default());
        self.axis_mask |= axes;
        self.configs.push(config);
        axes
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn matches(&self, config: &ConfigDescription) -> bool {
        let constrained = config.diff(&ConfigDescription::default()) & self.axis_mask;
        if constrained == 0 {
            return true;
        }
        self.configs.iter().any(|filter| {
            let filter_axes = filter.diff(&ConfigDescription::default());
            // The config must agree with this filter config on every
            // axis both of them specify.
            constrained & filter_axes != 0 && config.diff(filter) & constrained & filter_axes == 0
        })
    }
}

/// Select the density variant closest to `preferred` within each
/// (config-sans-density, product) family of an entry.
pub fn apply_preferred_density(table: &mut ResourceTable, preferred: u16) {
    for package in &mut table.packages {
        for group in &mut package.types {
            for entry in &mut group.entries {
                let mut best: Vec<(ConfigDescription, String, u16)> = Vec::new();
                for cv in &entry.values {
                    if cv.config.density == 0 {
                        continue;
                    }
                    let mut family = cv.config.clone();
                    family.density = 0;
                    let score = cv.config.density.abs_diff(preferred);
                    match best
                        .iter_mut()
                        .find(|(c, p, _)| *c == family && *p == cv.product)
                    {
                        Some((_, _, best_score)) => {
                            if score < *best_score {
                                *best_score = score;
                            }
                        }
                        None => best.push((family, cv.product.clone(), score)),
                    }
                }

                entry.values.retain(|cv| {
                    if cv.config.density == 0 {
                        return true;
                    }
                    let mut family = cv.config.clone();
                    family.density = 0;
                    let score = cv.config.density.abs_diff(preferred);
                    best.iter()
                        .any(|(c, p, s)| *c == family && *p == cv.product && *s == score)
                });
            }
        }
    }
}

/// Whether `config` constrains only the density axis, as
/// `--preferred-density` requires.
pub fn is_density_only(config: &ConfigDescription) -> bool {
    config.diff(&ConfigDescription::default()) == CONFIG_DENSITY
}
