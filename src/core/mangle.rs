//! Name mangling for merged library resources.
//!
//! When a static library is merged into the compilation package, its
//! entry names are prefixed with a mangled form of the library package
//! so they cannot collide with the app's own resources. References that
//! still use the library spelling (`com.lib:string/title`) are rewritten
//! through the mangler during reference linking.

use std::collections::BTreeSet;

use crate::core::name::ResourceName;

/// Which packages get mangled into the target package.
#[derive(Debug, Clone, Default)]
pub struct NameManglerPolicy {
    /// The compilation package; names already in it are left alone.
    pub target_package: String,
    /// Library packages whose names were merged and mangled.
    pub packages_to_mangle: BTreeSet<String>,
}

impl NameManglerPolicy {
    pub fn new(target_package: impl Into<String>) -> Self {
        NameManglerPolicy {
            target_package: target_package.into(),
            packages_to_mangle: BTreeSet::new(),
        }
    }
}

/// Applies the mangling policy to names and references.
#[derive(Debug, Clone, Default)]
pub struct NameMangler {
    policy: NameManglerPolicy,
}

impl NameMangler {
    pub fn new(policy: NameManglerPolicy) -> Self {
        NameMangler { policy }
    }

    /// Mangle `package:entry` into `package$entry` with `.` and `-`
    /// normalized to `_`.
    pub fn mangle_entry(package: &str, entry: &str) -> String {
        format!("{}${}", package.replace(['.', '-'], "_"), entry)
    }

    /// Split a mangled entry name back into (normalized package, entry).
    pub fn unmangle_entry(entry: &str) -> Option<(&str, &str)> {
        entry.split_once('$')
    }

    /// Rewrite `name` into its mangled spelling in the target package,
    /// if its package was merged under the mangling policy.
    pub fn mangle_name(&self, name: &ResourceName) -> Option<ResourceName> {
        if !name.has_package()
            || name.package == self.policy.target_package
            || !self.policy.packages_to_mangle.contains(&name.package)
        {
            return None;
        }
        Some(ResourceName::new(
            self.policy.target_package.clone(),
            name.ty,
            Self::mangle_entry(&name.package, &name.entry),
        ))
    }

    /// Whether `package` matches an unmangled-package prefix, comparing
    /// in normalized (underscore) form.
    pub fn package_matches(mangled_prefix: &str, package: &str) -> bool {
        mangled_prefix == package.replace(['.', '-'], "_")
    }
}
