use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::error::DomainError;
use crate::identity::{Company, SignInError, UserProfile, UserStatus, Viewer};
use crate::ports::activity::{ActivityEntry, ActivityLevel, ActivityLogger};
use crate::ports::directory::{AuthAdmin, DirectoryRepository};
use crate::scope::resolve_company_scope;
use crate::util::uuid_v7_without_dashes;
use crate::DomainResult;

pub const ACTIVITY_CATEGORY_USERS: &str = "usuarios";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCreate {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub company_id: Option<String>,
    pub permissions: HashMap<String, bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserUpdate {
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub permissions: Option<HashMap<String, bool>>,
    pub status: Option<UserStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyWithAdminCreate {
    pub company_name: String,
    pub admin: UserCreate,
}

/// Company user administration. Listing and profile edits go straight to the
/// directory; anything touching credentials is delegated to the privileged
/// `AuthAdmin` port. The provisioning flows compensate partial failure with
/// explicit deletes.
pub struct UserDirectoryService {
    directory: Arc<dyn DirectoryRepository>,
    auth: Arc<dyn AuthAdmin>,
    logger: Arc<dyn ActivityLogger>,
}

impl UserDirectoryService {
    pub fn new(
        directory: Arc<dyn DirectoryRepository>,
        auth: Arc<dyn AuthAdmin>,
        logger: Arc<dyn ActivityLogger>,
    ) -> Self {
        Self {
            directory,
            auth,
            logger,
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, SignInError> {
        let login_id = self
            .auth
            .verify_password(email, password)
            .await
            .map_err(|err| SignInError::Unavailable(err.to_string()))?;
        if login_id.is_none() {
            return Err(SignInError::InvalidCredentials);
        }

        let profile = self
            .directory
            .find_user_by_email(email)
            .await
            .map_err(|err| SignInError::Unavailable(err.to_string()))?
            .ok_or(SignInError::InvalidCredentials)?;

        if !profile.is_active() {
            return Err(SignInError::InactiveUser);
        }
        Ok(profile)
    }

    pub async fn list_users(&self, viewer: &Viewer) -> DomainResult<Vec<UserProfile>> {
        let Some(scope) = resolve_company_scope(None, Some(viewer)) else {
            return Ok(Vec::new());
        };
        self.directory.list_users(&scope).await
    }

    pub async fn list_companies(&self) -> DomainResult<Vec<Company>> {
        self.directory.list_companies().await
    }

    pub async fn create_user(
        &self,
        input: &UserCreate,
        actor: &Viewer,
    ) -> DomainResult<UserProfile> {
        validate_user_create(input)?;
        if self
            .directory
            .find_user_by_email(&input.email)
            .await?
            .is_some()
        {
            return Err(DomainError::Conflict);
        }

        let login_id = self.auth.create_login(&input.email, &input.password).await?;
        let profile = UserProfile {
            user_id: login_id.clone(),
            full_name: input.full_name.clone(),
            email: input.email.clone(),
            role: input.role,
            company_id: input.company_id.clone(),
            permissions: input.permissions.clone(),
            status: UserStatus::Active,
        };

        match self.directory.insert_user(&profile).await {
            Ok(created) => {
                self.logger.log(
                    ActivityEntry::new(
                        ActivityLevel::Info,
                        format!("Usuário {} criado", created.email),
                        ACTIVITY_CATEGORY_USERS,
                    )
                    .with_actor(actor),
                );
                Ok(created)
            }
            Err(err) => {
                // Compensate the half-created credential before reporting.
                let _ = self.auth.delete_login(&login_id).await;
                Err(err)
            }
        }
    }

    pub async fn create_company_with_admin(
        &self,
        input: &CompanyWithAdminCreate,
        actor: &Viewer,
    ) -> DomainResult<(Company, UserProfile)> {
        let name = input.company_name.trim();
        if name.is_empty() {
            return Err(DomainError::Validation("nome da empresa é obrigatório".into()));
        }
        validate_user_create(&input.admin)?;

        let company = self
            .directory
            .insert_company(&Company {
                company_id: uuid_v7_without_dashes(),
                name: name.to_string(),
            })
            .await?;

        let login_id = match self
            .auth
            .create_login(&input.admin.email, &input.admin.password)
            .await
        {
            Ok(login_id) => login_id,
            Err(err) => {
                let _ = self.directory.delete_company(&company.company_id).await;
                return Err(err);
            }
        };

        let profile = UserProfile {
            user_id: login_id.clone(),
            full_name: input.admin.full_name.clone(),
            email: input.admin.email.clone(),
            role: Role::Admin,
            company_id: Some(company.company_id.clone()),
            permissions: input.admin.permissions.clone(),
            status: UserStatus::Active,
        };
        let admin = match self.directory.insert_user(&profile).await {
            Ok(admin) => admin,
            Err(err) => {
                let _ = self.auth.delete_login(&login_id).await;
                let _ = self.directory.delete_company(&company.company_id).await;
                return Err(err);
            }
        };

        self.logger.log(
            ActivityEntry::new(
                ActivityLevel::Info,
                format!("Empresa {} criada com administrador {}", company.name, admin.email),
                ACTIVITY_CATEGORY_USERS,
            )
            .with_actor(actor),
        );
        Ok((company, admin))
    }

    pub async fn update_user(
        &self,
        user_id: &str,
        update: &UserUpdate,
    ) -> DomainResult<UserProfile> {
        self.directory.update_user(user_id, update).await
    }

    pub async fn deactivate_user(&self, user_id: &str, actor: &Viewer) -> DomainResult<UserProfile> {
        let update = UserUpdate {
            status: Some(UserStatus::Inactive),
            ..UserUpdate::default()
        };
        let profile = self.directory.update_user(user_id, &update).await?;
        self.logger.log(
            ActivityEntry::new(
                ActivityLevel::Info,
                format!("Usuário {} desativado", profile.email),
                ACTIVITY_CATEGORY_USERS,
            )
            .with_actor(actor),
        );
        Ok(profile)
    }

    pub async fn reset_password(&self, user_id: &str, new_password: &str) -> DomainResult<()> {
        if new_password.len() < 8 {
            return Err(DomainError::Validation(
                "a senha deve ter pelo menos 8 caracteres".into(),
            ));
        }
        let profile = self
            .directory
            .get_user(user_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        self.auth.reset_password(&profile.email, new_password).await
    }
}

fn validate_user_create(input: &UserCreate) -> DomainResult<()> {
    if input.full_name.trim().is_empty() {
        return Err(DomainError::Validation("nome é obrigatório".into()));
    }
    if input.email.trim().is_empty() || !input.email.contains('@') {
        return Err(DomainError::Validation("e-mail inválido".into()));
    }
    if input.password.len() < 8 {
        return Err(DomainError::Validation(
            "a senha deve ter pelo menos 8 caracteres".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::scope::CompanyScope;

    #[derive(Default)]
    struct MockDirectory {
        users: StdMutex<Vec<UserProfile>>,
        companies: StdMutex<Vec<Company>>,
        fail_insert_user: AtomicBool,
    }

    impl DirectoryRepository for MockDirectory {
        fn list_users(
            &self,
            scope: &CompanyScope,
        ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<UserProfile>>> {
            let scope = scope.clone();
            Box::pin(async move {
                let users = self.users.lock().expect("users");
                Ok(users
                    .iter()
                    .filter(|user| match &scope {
                        CompanyScope::AllCompanies => true,
                        CompanyScope::Company(company_id) => {
                            user.company_id.as_deref() == Some(company_id)
                        }
                    })
                    .cloned()
                    .collect())
            })
        }

        fn get_user(
            &self,
            user_id: &str,
        ) -> crate::ports::BoxFuture<'_, DomainResult<Option<UserProfile>>> {
            let user_id = user_id.to_string();
            Box::pin(async move {
                let users = self.users.lock().expect("users");
                Ok(users.iter().find(|user| user.user_id == user_id).cloned())
            })
        }

        fn find_user_by_email(
            &self,
            email: &str,
        ) -> crate::ports::BoxFuture<'_, DomainResult<Option<UserProfile>>> {
            let email = email.to_string();
            Box::pin(async move {
                let users = self.users.lock().expect("users");
                Ok(users.iter().find(|user| user.email == email).cloned())
            })
        }

        fn insert_user(
            &self,
            user: &UserProfile,
        ) -> crate::ports::BoxFuture<'_, DomainResult<UserProfile>> {
            let user = user.clone();
            Box::pin(async move {
                if self.fail_insert_user.load(Ordering::SeqCst) {
                    return Err(DomainError::DataAccess("insert usuário".to_string()));
                }
                self.users.lock().expect("users").push(user.clone());
                Ok(user)
            })
        }

        fn update_user(
            &self,
            user_id: &str,
            update: &UserUpdate,
        ) -> crate::ports::BoxFuture<'_, DomainResult<UserProfile>> {
            let user_id = user_id.to_string();
            let update = update.clone();
            Box::pin(async move {
                let mut users = self.users.lock().expect("users");
                let user = users
                    .iter_mut()
                    .find(|user| user.user_id == user_id)
                    .ok_or(DomainError::NotFound)?;
                if let Some(full_name) = update.full_name {
                    user.full_name = full_name;
                }
                if let Some(role) = update.role {
                    user.role = role;
                }
                if let Some(permissions) = update.permissions {
                    user.permissions = permissions;
                }
                if let Some(status) = update.status {
                    user.status = status;
                }
                Ok(user.clone())
            })
        }

        fn delete_user(&self, user_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
            let user_id = user_id.to_string();
            Box::pin(async move {
                self.users
                    .lock()
                    .expect("users")
                    .retain(|user| user.user_id != user_id);
                Ok(())
            })
        }

        fn list_companies(&self) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Company>>> {
            Box::pin(async move { Ok(self.companies.lock().expect("companies").clone()) })
        }

        fn insert_company(
            &self,
            company: &Company,
        ) -> crate::ports::BoxFuture<'_, DomainResult<Company>> {
            let company = company.clone();
            Box::pin(async move {
                self.companies
                    .lock()
                    .expect("companies")
                    .push(company.clone());
                Ok(company)
            })
        }

        fn delete_company(&self, company_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
            let company_id = company_id.to_string();
            Box::pin(async move {
                self.companies
                    .lock()
                    .expect("companies")
                    .retain(|company| company.company_id != company_id);
                Ok(())
            })
        }
    }

    #[derive(Default)]
    struct MockAuthAdmin {
        logins: StdMutex<Vec<(String, String, String)>>,
        fail_create: AtomicBool,
    }

    impl AuthAdmin for MockAuthAdmin {
        fn create_login(
            &self,
            email: &str,
            password: &str,
        ) -> crate::ports::BoxFuture<'_, DomainResult<String>> {
            let email = email.to_string();
            let password = password.to_string();
            Box::pin(async move {
                if self.fail_create.load(Ordering::SeqCst) {
                    return Err(DomainError::DataAccess("auth indisponível".to_string()));
                }
                let login_id = uuid_v7_without_dashes();
                self.logins
                    .lock()
                    .expect("logins")
                    .push((login_id.clone(), email, password));
                Ok(login_id)
            })
        }

        fn delete_login(&self, login_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
            let login_id = login_id.to_string();
            Box::pin(async move {
                self.logins
                    .lock()
                    .expect("logins")
                    .retain(|(id, _, _)| id != &login_id);
                Ok(())
            })
        }

        fn reset_password(
            &self,
            email: &str,
            new_password: &str,
        ) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
            let email = email.to_string();
            let new_password = new_password.to_string();
            Box::pin(async move {
                let mut logins = self.logins.lock().expect("logins");
                let login = logins
                    .iter_mut()
                    .find(|(_, login_email, _)| login_email == &email)
                    .ok_or(DomainError::NotFound)?;
                login.2 = new_password;
                Ok(())
            })
        }

        fn verify_password(
            &self,
            email: &str,
            password: &str,
        ) -> crate::ports::BoxFuture<'_, DomainResult<Option<String>>> {
            let email = email.to_string();
            let password = password.to_string();
            Box::pin(async move {
                let logins = self.logins.lock().expect("logins");
                Ok(logins
                    .iter()
                    .find(|(_, login_email, login_password)| {
                        login_email == &email && login_password == &password
                    })
                    .map(|(id, _, _)| id.clone()))
            })
        }
    }

    struct NullLogger;

    impl ActivityLogger for NullLogger {
        fn log(&self, _entry: ActivityEntry) {}
    }

    fn service() -> (Arc<MockDirectory>, Arc<MockAuthAdmin>, UserDirectoryService) {
        let directory = Arc::new(MockDirectory::default());
        let auth = Arc::new(MockAuthAdmin::default());
        let service =
            UserDirectoryService::new(directory.clone(), auth.clone(), Arc::new(NullLogger));
        (directory, auth, service)
    }

    fn developer() -> Viewer {
        UserProfile {
            user_id: "dev-1".to_string(),
            full_name: "Dev".to_string(),
            email: "dev@example.com".to_string(),
            role: Role::Developer,
            company_id: None,
            permissions: HashMap::new(),
            status: UserStatus::Active,
        }
    }

    fn user_create(email: &str) -> UserCreate {
        UserCreate {
            full_name: "Ana Lima".to_string(),
            email: email.to_string(),
            password: "senha-forte".to_string(),
            role: Role::User,
            company_id: Some("c-1".to_string()),
            permissions: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn create_user_then_sign_in() {
        let (_, _, service) = service();
        let created = service
            .create_user(&user_create("ana@empresa.com"), &developer())
            .await
            .expect("create");

        let signed_in = service
            .sign_in("ana@empresa.com", "senha-forte")
            .await
            .expect("sign in");
        assert_eq!(signed_in.user_id, created.user_id);

        let wrong = service.sign_in("ana@empresa.com", "errada-123").await;
        assert_eq!(wrong.unwrap_err(), SignInError::InvalidCredentials);
    }

    #[tokio::test]
    async fn inactive_user_cannot_sign_in() {
        let (_, _, service) = service();
        let created = service
            .create_user(&user_create("ana@empresa.com"), &developer())
            .await
            .expect("create");
        service
            .deactivate_user(&created.user_id, &developer())
            .await
            .expect("deactivate");

        let result = service.sign_in("ana@empresa.com", "senha-forte").await;
        assert_eq!(result.unwrap_err(), SignInError::InactiveUser);
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let (_, _, service) = service();
        service
            .create_user(&user_create("ana@empresa.com"), &developer())
            .await
            .expect("create");
        let second = service
            .create_user(&user_create("ana@empresa.com"), &developer())
            .await;
        assert!(matches!(second.unwrap_err(), DomainError::Conflict));
    }

    #[tokio::test]
    async fn profile_insert_failure_deletes_the_created_login() {
        let (directory, auth, service) = service();
        directory.fail_insert_user.store(true, Ordering::SeqCst);

        let result = service
            .create_user(&user_create("ana@empresa.com"), &developer())
            .await;

        assert!(result.is_err());
        assert!(auth.logins.lock().expect("logins").is_empty());
    }

    #[tokio::test]
    async fn company_provisioning_compensates_on_admin_failure() {
        let (directory, auth, service) = service();
        directory.fail_insert_user.store(true, Ordering::SeqCst);

        let result = service
            .create_company_with_admin(
                &CompanyWithAdminCreate {
                    company_name: "Empresa Nova".to_string(),
                    admin: user_create("admin@empresa.com"),
                },
                &developer(),
            )
            .await;

        assert!(result.is_err());
        assert!(directory.companies.lock().expect("companies").is_empty());
        assert!(auth.logins.lock().expect("logins").is_empty());
    }

    #[tokio::test]
    async fn admin_lists_only_their_company() {
        let (_, _, service) = service();
        service
            .create_user(&user_create("ana@empresa.com"), &developer())
            .await
            .expect("create");
        let mut other = user_create("bob@outra.com");
        other.company_id = Some("c-2".to_string());
        service
            .create_user(&other, &developer())
            .await
            .expect("create");

        let admin = UserProfile {
            user_id: "adm-1".to_string(),
            full_name: "Admin".to_string(),
            email: "admin@empresa.com".to_string(),
            role: Role::Admin,
            company_id: Some("c-1".to_string()),
            permissions: HashMap::new(),
            status: UserStatus::Active,
        };
        let listed = service.list_users(&admin).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].email, "ana@empresa.com");

        let everyone = service.list_users(&developer()).await.expect("list all");
        assert_eq!(everyone.len(), 2);
    }
}
