//! Quota dimensions and the identifiers resolved for a request.

use serde::{Deserialize, Serialize};

/// One axis of quota enforcement.
///
/// `PRIORITY` is the fixed display order used to break ties when several
/// dimensions share the smallest limit: user > organization > ip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionKind {
    User,
    Organization,
    Ip,
}

impl DimensionKind {
    pub const PRIORITY: [DimensionKind; 3] = [
        DimensionKind::User,
        DimensionKind::Organization,
        DimensionKind::Ip,
    ];

    /// Short prefix used in counting store keys.
    pub fn prefix(&self) -> &'static str {
        match self {
            DimensionKind::User => "user",
            DimensionKind::Organization => "org",
            DimensionKind::Ip => "ip",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DimensionKind::User => "user",
            DimensionKind::Organization => "organization",
            DimensionKind::Ip => "ip",
        }
    }
}

/// Identifiers resolved by external collaborators (auth, org lookup,
/// client-IP extraction) before the check. Never mutated or persisted
/// beyond the check itself.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestIdentifiers {
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
    pub ip_address: Option<String>,
}

impl RequestIdentifiers {
    /// Identifier value for a dimension, if present and well-formed.
    /// Empty or whitespace-only values are treated as absent, so the
    /// dimension is simply skipped rather than failing the check.
    pub fn get(&self, kind: DimensionKind) -> Option<&str> {
        let raw = match kind {
            DimensionKind::User => self.user_id.as_deref(),
            DimensionKind::Organization => self.organization_id.as_deref(),
            DimensionKind::Ip => self.ip_address.as_deref(),
        };
        raw.map(str::trim).filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_identifier_treated_as_absent() {
        let ids = RequestIdentifiers {
            user_id: Some("".to_string()),
            organization_id: Some("   ".to_string()),
            ip_address: Some("10.0.0.1".to_string()),
        };

        assert_eq!(ids.get(DimensionKind::User), None);
        assert_eq!(ids.get(DimensionKind::Organization), None);
        assert_eq!(ids.get(DimensionKind::Ip), Some("10.0.0.1"));
    }

    #[test]
    fn priority_order_is_user_org_ip() {
        assert_eq!(
            DimensionKind::PRIORITY,
            [
                DimensionKind::User,
                DimensionKind::Organization,
                DimensionKind::Ip
            ]
        );
    }
}
