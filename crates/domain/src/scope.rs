use crate::identity::Viewer;

/// The company id used to filter queries. The developer role bypasses
/// filtering entirely; everyone else resolves to exactly one company.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanyScope {
    AllCompanies,
    Company(String),
}

/// Resolves the effective company scope from an explicit hint, falling back
/// to the viewer's own company. `None` means the viewer has no company
/// context at all; that is not an error, it just yields an empty view.
pub fn resolve_company_scope(
    company_hint: Option<&str>,
    viewer: Option<&Viewer>,
) -> Option<CompanyScope> {
    if let Some(viewer) = viewer {
        if viewer.role.is_developer() {
            return Some(CompanyScope::AllCompanies);
        }
    }

    if let Some(hint) = company_hint {
        return Some(CompanyScope::Company(hint.to_string()));
    }

    viewer
        .and_then(|viewer| viewer.company_id.clone())
        .map(CompanyScope::Company)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::auth::Role;
    use crate::identity::{UserProfile, UserStatus};

    fn viewer(role: Role, company_id: Option<&str>) -> Viewer {
        UserProfile {
            user_id: "u-1".to_string(),
            full_name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            role,
            company_id: company_id.map(str::to_string),
            permissions: HashMap::new(),
            status: UserStatus::Active,
        }
    }

    #[test]
    fn developer_sees_all_companies_even_with_hint() {
        let viewer = viewer(Role::Developer, Some("c-1"));
        assert_eq!(
            resolve_company_scope(Some("c-2"), Some(&viewer)),
            Some(CompanyScope::AllCompanies)
        );
    }

    #[test]
    fn hint_wins_over_viewer_company() {
        let viewer = viewer(Role::Admin, Some("c-1"));
        assert_eq!(
            resolve_company_scope(Some("c-2"), Some(&viewer)),
            Some(CompanyScope::Company("c-2".to_string()))
        );
    }

    #[test]
    fn falls_back_to_viewer_company() {
        let viewer = viewer(Role::User, Some("c-1"));
        assert_eq!(
            resolve_company_scope(None, Some(&viewer)),
            Some(CompanyScope::Company("c-1".to_string()))
        );
    }

    #[test]
    fn unassigned_non_developer_has_no_scope() {
        let viewer = viewer(Role::User, None);
        assert_eq!(resolve_company_scope(None, Some(&viewer)), None);
        assert_eq!(resolve_company_scope(None, None), None);
    }
}
