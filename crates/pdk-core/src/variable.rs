//! Variable provenance (SPEC_FULL.md §3): the ordering used by the
//! resolver in `pdk-config` to settle conflicts between sources.

use serde::{Deserialize, Serialize};

/// The source a variable's value came from. Ordered by `Ord`: a higher
/// variant always wins regardless of insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Provenance {
    BuiltIn,
    Configuration,
    Environment,
    Secret,
    CliArgument,
}

/// A single resolved variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableEntry {
    pub name: String,
    pub value: String,
    pub provenance: Provenance,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provenance_orders_as_specified() {
        assert!(Provenance::BuiltIn < Provenance::Configuration);
        assert!(Provenance::Configuration < Provenance::Environment);
        assert!(Provenance::Environment < Provenance::Secret);
        assert!(Provenance::Secret < Provenance::CliArgument);
    }
}
