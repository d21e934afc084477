use crate::identity::{Company, UserProfile};
use crate::scope::CompanyScope;
use crate::users::UserUpdate;
use crate::DomainResult;

pub trait DirectoryRepository: Send + Sync {
    fn list_users(
        &self,
        scope: &CompanyScope,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<UserProfile>>>;

    fn get_user(
        &self,
        user_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<UserProfile>>>;

    fn find_user_by_email(
        &self,
        email: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<UserProfile>>>;

    fn insert_user(
        &self,
        user: &UserProfile,
    ) -> crate::ports::BoxFuture<'_, DomainResult<UserProfile>>;

    fn update_user(
        &self,
        user_id: &str,
        update: &UserUpdate,
    ) -> crate::ports::BoxFuture<'_, DomainResult<UserProfile>>;

    fn delete_user(&self, user_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<()>>;

    fn list_companies(&self) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Company>>>;

    fn insert_company(
        &self,
        company: &Company,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Company>>;

    fn delete_company(&self, company_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<()>>;
}

/// Privileged credential operations. These run with elevated backend
/// credentials; callers are role-checked before anything reaches this port.
pub trait AuthAdmin: Send + Sync {
    /// Creates a login and returns its id, which doubles as the user id.
    fn create_login(
        &self,
        email: &str,
        password: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<String>>;

    fn delete_login(&self, login_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<()>>;

    fn reset_password(
        &self,
        email: &str,
        new_password: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<()>>;

    /// Returns the login id when the credentials match, `None` otherwise.
    fn verify_password(
        &self,
        email: &str,
        password: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<String>>>;
}
