//! Certificate-derived role evaluation.
//!
//! The role table maps `organization → unit → command → allowed`. A
//! caller's certificate contributes its subject organizations and units;
//! the evaluator unions every grant reachable from those pairs.

use std::collections::{HashMap, HashSet};

/// Commands a unit may run. `false` entries are explicit denials and
/// contribute nothing to the union.
pub type CommandGrants = HashMap<String, bool>;

/// Units within an organization.
pub type UnitRoles = HashMap<String, CommandGrants>;

/// Role table: organization → unit → command grants.
pub type RoleTable = HashMap<String, UnitRoles>;

/// A wildcard grant bypasses the per-command check entirely.
pub const WILDCARD: &str = "*";

/// Negotiates the available commands by combining the certificate
/// organizations and units with the loaded role table.
///
/// NOTE: units are not scoped to the organization that granted them. A
/// subject in organizations `it` and `hr` with unit `admin` reaches
/// `hr → admin` even when the admin role was only meant for `it`. The
/// certificate subject cannot bind a unit to a specific organization, so
/// this layer cannot enforce the pairing; deployments that need strict
/// scoping qualify unit names with the organization (`it.admin`) in both
/// the certificates and the role table, which the lookup below then
/// scopes correctly.
pub fn allowed_commands(roles: &RoleTable, orgs: &[String], units: &[String]) -> HashSet<String> {
    let mut available = HashSet::new();

    for org in orgs {
        if units.is_empty() {
            continue;
        }

        let Some(org_roles) = roles.get(org) else {
            continue;
        };

        for unit in units {
            let Some(grants) = org_roles.get(unit) else {
                continue;
            };

            for (command, allowed) in grants {
                if *allowed {
                    available.insert(command.clone());
                }
            }
        }
    }

    available
}

/// True when `command` may run under the granted set.
pub fn is_allowed(commands: &HashSet<String>, command: &str) -> bool {
    commands.contains(WILDCARD) || commands.contains(command)
}
