use parley_types::api::Claims;
use parley_types::models::Role;

/// Who is making the current request. Built from verified token claims and
/// passed explicitly into every chat operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
}

impl RequestContext {
    pub fn new(user_id: i64, username: impl Into<String>, role: Role) -> Self {
        Self { user_id, username: username.into(), role }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Owners and administrators may change a message.
    pub fn can_modify(&self, author_id: i64) -> bool {
        self.user_id == author_id || self.is_admin()
    }
}

impl From<Claims> for RequestContext {
    fn from(claims: Claims) -> Self {
        Self { user_id: claims.sub, username: claims.username, role: claims.role }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_or_admin_may_modify() {
        let owner = RequestContext::new(7, "tess", Role::AtTester);
        assert!(owner.can_modify(7));
        assert!(!owner.can_modify(8));

        let admin = RequestContext::new(1, "root", Role::SuperAdmin);
        assert!(admin.can_modify(8));
    }

    #[test]
    fn built_from_claims() {
        let ctx = RequestContext::from(Claims {
            sub: 42,
            username: "qa1".into(),
            role: Role::Qa,
            exp: 0,
        });
        assert_eq!(ctx, RequestContext::new(42, "qa1", Role::Qa));
    }
}
