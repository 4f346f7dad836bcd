//! Composition and interpolation of container environment variables.
//!
//! A service's environment is its own variables, then for each backing
//! service the `<NAME>_<KEY>` values and the variables it provides. Values
//! may reference other variables as `$KEY`; references are resolved in a
//! single pass against the merged values.

use std::collections::BTreeMap;

use dockhand_common::error::{DockhandError, Result};
use dockhand_common::types::EnvironmentMapping;

use crate::descriptor::ServiceDescriptor;

/// Builds the environment of a service from its backing services.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentComposer;

impl EnvironmentComposer {
    /// Merges and interpolates the environment of `owner`.
    ///
    /// `backing` yields each backing service's dependency name and resolved
    /// descriptor, in declaration order.
    #[must_use]
    pub fn compose<'a>(
        owner: &ServiceDescriptor,
        backing: impl IntoIterator<Item = (&'a str, &'a ServiceDescriptor)>,
    ) -> EnvironmentMapping {
        Self::interpolate(&Self::merge(owner, backing))
    }

    /// Merges variables without interpolating them.
    ///
    /// Later sources override earlier ones: the owner's variables, then per
    /// backing service its prefixed values followed by its provided
    /// variables.
    #[must_use]
    pub fn merge<'a>(
        owner: &ServiceDescriptor,
        backing: impl IntoIterator<Item = (&'a str, &'a ServiceDescriptor)>,
    ) -> EnvironmentMapping {
        let mut vars: EnvironmentMapping = owner
            .environment
            .iter()
            .map(|(key, value)| (key.to_uppercase(), value.clone()))
            .collect();

        for (name, service) in backing {
            let prefix = name.to_uppercase();
            for (key, value) in &service.backing_service_environment {
                let _ = vars.insert(format!("{prefix}_{}", key.to_uppercase()), value.clone());
            }
            vars.extend(
                service
                    .provided_environment
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone())),
            );
        }
        vars
    }

    /// Replaces `$KEY` references with the value of `KEY`.
    ///
    /// A reference is `$` followed by the longest run of ASCII letters,
    /// digits, and underscores. It is replaced only when it names another
    /// variable with a non-empty value; otherwise it stays verbatim.
    /// Replacement values are taken from `vars` as given, so a reference
    /// chain resolves one hop per call.
    #[must_use]
    pub fn interpolate(vars: &EnvironmentMapping) -> EnvironmentMapping {
        vars.iter()
            .map(|(key, value)| {
                let value = value.as_deref().map(|text| substitute(key, text, vars));
                (key.clone(), value)
            })
            .collect()
    }

    /// Returns the environment with every value present.
    ///
    /// Unresolved `$KEY` references are not missing values.
    ///
    /// # Errors
    ///
    /// Returns `DockhandError::EnvironmentVariablesMissing` naming every
    /// variable without a value.
    pub fn validate(vars: &EnvironmentMapping) -> Result<BTreeMap<String, String>> {
        let missing: Vec<String> = vars
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(key, _)| key.clone())
            .collect();
        if !missing.is_empty() {
            return Err(DockhandError::EnvironmentVariablesMissing { keys: missing });
        }

        Ok(vars
            .iter()
            .filter_map(|(key, value)| value.clone().map(|v| (key.clone(), v)))
            .collect())
    }
}

fn is_reference_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn substitute(own_key: &str, text: &str, vars: &EnvironmentMapping) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let len = after.find(|c: char| !is_reference_char(c)).unwrap_or(after.len());
        let name = &after[..len];

        let replacement = if name.is_empty() || name == own_key {
            None
        } else {
            vars.get(name)
                .and_then(Option::as_deref)
                .filter(|v| !v.is_empty())
        };
        match replacement {
            Some(value) => out.push_str(value),
            None => {
                out.push('$');
                out.push_str(name);
            }
        }
        rest = &after[len..];
    }
    out.push_str(rest);
    out
}
