//! Provenance-ordered variable resolution (SPEC_FULL.md §3), replacing the
//! teacher's dot-namespace `VariableContext` with a flat name-to-entry map
//! where a higher `Provenance` always wins regardless of insertion order.

use std::collections::HashMap;

use pdk_core::variable::{Provenance, VariableEntry};

/// `PDK_VAR_<NAME>` and `PDK_SECRET_<NAME>` environment variable prefixes
/// (SPEC_FULL.md §6 "Environment conventions").
pub const VAR_ENV_PREFIX: &str = "PDK_VAR_";
pub const SECRET_ENV_PREFIX: &str = "PDK_SECRET_";

#[derive(Debug, Default)]
pub struct VariableResolver {
    entries: HashMap<String, VariableEntry>,
}

impl VariableResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `name`, keeping the existing entry if its
    /// provenance already outranks the incoming one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>, provenance: Provenance) {
        let name = name.into();
        let value = value.into();
        match self.entries.get(&name) {
            Some(existing) if existing.provenance > provenance => {
                tracing::trace!(
                    variable = %name,
                    incoming = ?provenance,
                    kept = ?existing.provenance,
                    "lower-provenance variable write ignored"
                );
            }
            _ => {
                self.entries.insert(
                    name.clone(),
                    VariableEntry {
                        name,
                        value,
                        provenance,
                    },
                );
            }
        }
    }

    /// Load built-in pipeline/job/step variables. Lowest provenance: any
    /// other source overrides them.
    pub fn with_built_ins(mut self, built_ins: &HashMap<String, String>) -> Self {
        for (name, value) in built_ins {
            self.insert(name, value, Provenance::BuiltIn);
        }
        self
    }

    /// Load pipeline/job-level `env:` mappings.
    pub fn with_configuration(mut self, config: &HashMap<String, String>) -> Self {
        for (name, value) in config {
            self.insert(name, value, Provenance::Configuration);
        }
        self
    }

    /// Load `PDK_VAR_<NAME>` from the process environment.
    pub fn with_process_environment(mut self) -> Self {
        for (key, value) in std::env::vars() {
            if let Some(name) = key.strip_prefix(VAR_ENV_PREFIX) {
                self.insert(name, value, Provenance::Environment);
            }
        }
        self
    }

    /// Load secret values, already resolved by the caller through a
    /// `SecretStore`. The resolver never talks to the store directly so it
    /// stays free of crypto dependencies.
    pub fn with_secrets(mut self, secrets: &HashMap<String, String>) -> Self {
        for (name, value) in secrets {
            self.insert(name, value, Provenance::Secret);
        }
        self
    }

    /// Load CLI `--var NAME=VALUE` overrides. Highest provenance.
    pub fn with_cli_arguments(mut self, args: &HashMap<String, String>) -> Self {
        for (name, value) in args {
            self.insert(name, value, Provenance::CliArgument);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|e| e.value.as_str())
    }

    pub fn provenance_of(&self, name: &str) -> Option<Provenance> {
        self.entries.get(name).map(|e| e.provenance)
    }

    /// Export as a plain map, e.g. for building a process environment.
    pub fn to_map(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect()
    }

    pub fn secret_names(&self) -> Vec<&str> {
        self.entries
            .values()
            .filter(|e| e.provenance == Provenance::Secret)
            .map(|e| e.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_provenance_wins_regardless_of_insertion_order() {
        let mut resolver = VariableResolver::new();
        resolver.insert("NAME", "cli-value", Provenance::CliArgument);
        resolver.insert("NAME", "built-in-value", Provenance::BuiltIn);
        assert_eq!(resolver.get("NAME"), Some("cli-value"));
    }

    #[test]
    fn secret_overrides_configuration_but_not_cli() {
        let mut resolver = VariableResolver::new();
        resolver.insert("TOKEN", "config-value", Provenance::Configuration);
        resolver.insert("TOKEN", "secret-value", Provenance::Secret);
        assert_eq!(resolver.get("TOKEN"), Some("secret-value"));

        resolver.insert("TOKEN", "cli-value", Provenance::CliArgument);
        assert_eq!(resolver.get("TOKEN"), Some("cli-value"));
    }

    #[test]
    fn builder_chain_applies_each_source_at_its_provenance() {
        let mut built_ins = HashMap::new();
        built_ins.insert("JOB_NAME".to_string(), "build".to_string());
        let mut config = HashMap::new();
        config.insert("REGION".to_string(), "us-east-1".to_string());

        let resolver = VariableResolver::new()
            .with_built_ins(&built_ins)
            .with_configuration(&config);

        assert_eq!(resolver.get("JOB_NAME"), Some("build"));
        assert_eq!(resolver.provenance_of("JOB_NAME"), Some(Provenance::BuiltIn));
        assert_eq!(resolver.provenance_of("REGION"), Some(Provenance::Configuration));
    }

    #[test]
    fn secret_names_lists_only_secret_provenance_entries() {
        let mut secrets = HashMap::new();
        secrets.insert("API_KEY".to_string(), "s3cr3t".to_string());
        let mut config = HashMap::new();
        config.insert("REGION".to_string(), "us-east-1".to_string());

        let resolver = VariableResolver::new()
            .with_configuration(&config)
            .with_secrets(&secrets);

        assert_eq!(resolver.secret_names(), vec!["API_KEY"]);
    }
}
