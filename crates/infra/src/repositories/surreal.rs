use futures_util::StreamExt;
use serde::Deserialize;
use surrealdb::engine::remote::ws::Client;
use surrealdb::{Action, Surreal};
use tokio::sync::mpsc;

use enquete_domain::error::DomainError;
use enquete_domain::identity::{Company, UserProfile};
use enquete_domain::ports::directory::{AuthAdmin, DirectoryRepository};
use enquete_domain::ports::surveys::{
    ChangeAction, SurveyChange, SurveyChangeFeed, SurveyGateway,
};
use enquete_domain::ports::BoxFuture;
use enquete_domain::responses::{AnswerRow, NewResponse, ResponseRecord};
use enquete_domain::scope::CompanyScope;
use enquete_domain::surveys::{NewSurvey, QuestionRow, SurveyPatch, SurveyRecord};
use enquete_domain::users::UserUpdate;
use enquete_domain::util::uuid_v7_without_dashes;
use enquete_domain::DomainResult;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

fn data_err(err: surrealdb::Error) -> DomainError {
    DomainError::DataAccess(err.to_string())
}

const SURVEY_TREE_PROJECTION: &str = r#"
    SELECT
        survey_id,
        title,
        company_id,
        created_by,
        created_at_ms,
        (SELECT question_id, text, question_type, options, position
            FROM question WHERE survey_id = $parent.survey_id) AS questions,
        (SELECT VALUE response_id
            FROM response WHERE survey_id = $parent.survey_id) AS response_ids,
        (SELECT VALUE name
            FROM company WHERE company_id = $parent.company_id LIMIT 1)[0] AS company_name,
        (SELECT VALUE full_name
            FROM app_user WHERE user_id = $parent.created_by LIMIT 1)[0] AS created_by_name
    FROM survey
"#;

/// Survey tables on SurrealDB. Records keep their business ids in plain
/// string fields; Surreal record ids stay internal to the database.
pub struct SurrealSurveyRepository {
    db: Surreal<Client>,
}

impl SurrealSurveyRepository {
    pub fn new(db: Surreal<Client>) -> Self {
        Self { db }
    }
}

impl SurveyGateway for SurrealSurveyRepository {
    fn fetch_survey_tree(
        &self,
        scope: &CompanyScope,
    ) -> BoxFuture<'_, DomainResult<Vec<SurveyRecord>>> {
        let scope = scope.clone();
        Box::pin(async move {
            let mut result = match scope {
                CompanyScope::AllCompanies => self
                    .db
                    .query(SURVEY_TREE_PROJECTION)
                    .await
                    .map_err(data_err)?,
                CompanyScope::Company(company_id) => self
                    .db
                    .query(format!("{SURVEY_TREE_PROJECTION} WHERE company_id = $company_id"))
                    .bind(("company_id", company_id))
                    .await
                    .map_err(data_err)?,
            };
            let records: Vec<SurveyRecord> = result.take(0).map_err(data_err)?;
            Ok(records)
        })
    }

    fn fetch_responses(&self, survey_id: &str) -> BoxFuture<'_, DomainResult<Vec<ResponseRecord>>> {
        let survey_id = survey_id.to_string();
        Box::pin(async move {
            let mut result = self
                .db
                .query(
                    r#"
                    SELECT
                        response_id,
                        survey_id,
                        respondent_id,
                        (SELECT answer_id, response_id, question_id, value
                            FROM answer WHERE response_id = $parent.response_id) AS answers
                    FROM response WHERE survey_id = $survey_id
                    "#,
                )
                .bind(("survey_id", survey_id))
                .await
                .map_err(data_err)?;
            let records: Vec<ResponseRecord> = result.take(0).map_err(data_err)?;
            Ok(records)
        })
    }

    fn insert_survey(&self, survey: &NewSurvey) -> BoxFuture<'_, DomainResult<Option<NewSurvey>>> {
        let survey = survey.clone();
        Box::pin(async move {
            let created: Option<NewSurvey> = self
                .db
                .create("survey")
                .content(survey)
                .await
                .map_err(data_err)?;
            Ok(created)
        })
    }

    fn update_survey(
        &self,
        survey_id: &str,
        patch: &SurveyPatch,
    ) -> BoxFuture<'_, DomainResult<()>> {
        let survey_id = survey_id.to_string();
        let patch = patch.clone();
        Box::pin(async move {
            self.db
                .query(
                    "UPDATE survey SET title = $title, company_id = $company_id \
                     WHERE survey_id = $survey_id",
                )
                .bind(("title", patch.title))
                .bind(("company_id", patch.company_id))
                .bind(("survey_id", survey_id))
                .await
                .map_err(data_err)?;
            Ok(())
        })
    }

    fn delete_survey(&self, survey_id: &str) -> BoxFuture<'_, DomainResult<()>> {
        let survey_id = survey_id.to_string();
        Box::pin(async move {
            self.db
                .query("DELETE survey WHERE survey_id = $survey_id")
                .bind(("survey_id", survey_id))
                .await
                .map_err(data_err)?;
            Ok(())
        })
    }

    fn delete_questions(&self, survey_id: &str) -> BoxFuture<'_, DomainResult<()>> {
        let survey_id = survey_id.to_string();
        Box::pin(async move {
            self.db
                .query("DELETE question WHERE survey_id = $survey_id")
                .bind(("survey_id", survey_id))
                .await
                .map_err(data_err)?;
            Ok(())
        })
    }

    fn insert_questions(&self, rows: &[QuestionRow]) -> BoxFuture<'_, DomainResult<()>> {
        let rows = rows.to_vec();
        Box::pin(async move {
            let _: Vec<QuestionRow> = self
                .db
                .insert("question")
                .content(rows)
                .await
                .map_err(data_err)?;
            Ok(())
        })
    }

    fn insert_response(
        &self,
        response: &NewResponse,
    ) -> BoxFuture<'_, DomainResult<Option<NewResponse>>> {
        let response = response.clone();
        Box::pin(async move {
            let created: Option<NewResponse> = self
                .db
                .create("response")
                .content(response)
                .await
                .map_err(data_err)?;
            Ok(created)
        })
    }

    fn insert_answers(&self, rows: &[AnswerRow]) -> BoxFuture<'_, DomainResult<()>> {
        let rows = rows.to_vec();
        Box::pin(async move {
            let _: Vec<AnswerRow> = self
                .db
                .insert("answer")
                .content(rows)
                .await
                .map_err(data_err)?;
            Ok(())
        })
    }
}

#[derive(Debug, Deserialize)]
struct LiveSurveyRow {
    survey_id: String,
}

impl SurveyChangeFeed for SurrealSurveyRepository {
    fn subscribe(&self) -> BoxFuture<'_, DomainResult<mpsc::Receiver<SurveyChange>>> {
        Box::pin(async move {
            let mut stream = self
                .db
                .select::<Vec<LiveSurveyRow>>("survey")
                .live()
                .await
                .map_err(data_err)?;

            let (tx, rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);
            tokio::spawn(async move {
                while let Some(notification) = stream.next().await {
                    let notification = match notification {
                        Ok(notification) => notification,
                        Err(err) => {
                            tracing::warn!(error = %err, "survey live query notification failed");
                            continue;
                        }
                    };
                    let action = match notification.action {
                        Action::Create => ChangeAction::Create,
                        Action::Update => ChangeAction::Update,
                        Action::Delete => ChangeAction::Delete,
                        _ => continue,
                    };
                    let change = SurveyChange {
                        action,
                        survey_id: Some(notification.data.survey_id),
                    };
                    if tx.send(change).await.is_err() {
                        // Receiver dropped; ending the task drops the live query.
                        break;
                    }
                }
            });
            Ok(rx)
        })
    }
}

/// User and company directory on SurrealDB.
pub struct SurrealDirectoryRepository {
    db: Surreal<Client>,
}

impl SurrealDirectoryRepository {
    pub fn new(db: Surreal<Client>) -> Self {
        Self { db }
    }
}

impl DirectoryRepository for SurrealDirectoryRepository {
    fn list_users(&self, scope: &CompanyScope) -> BoxFuture<'_, DomainResult<Vec<UserProfile>>> {
        let scope = scope.clone();
        Box::pin(async move {
            let mut result = match scope {
                CompanyScope::AllCompanies => self
                    .db
                    .query("SELECT * FROM app_user ORDER BY full_name")
                    .await
                    .map_err(data_err)?,
                CompanyScope::Company(company_id) => self
                    .db
                    .query("SELECT * FROM app_user WHERE company_id = $company_id ORDER BY full_name")
                    .bind(("company_id", company_id))
                    .await
                    .map_err(data_err)?,
            };
            let users: Vec<UserProfile> = result.take(0).map_err(data_err)?;
            Ok(users)
        })
    }

    fn get_user(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Option<UserProfile>>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            let mut result = self
                .db
                .query("SELECT * FROM app_user WHERE user_id = $user_id LIMIT 1")
                .bind(("user_id", user_id))
                .await
                .map_err(data_err)?;
            let mut users: Vec<UserProfile> = result.take(0).map_err(data_err)?;
            Ok(users.pop())
        })
    }

    fn find_user_by_email(&self, email: &str) -> BoxFuture<'_, DomainResult<Option<UserProfile>>> {
        let email = email.to_string();
        Box::pin(async move {
            let mut result = self
                .db
                .query("SELECT * FROM app_user WHERE email = $email LIMIT 1")
                .bind(("email", email))
                .await
                .map_err(data_err)?;
            let mut users: Vec<UserProfile> = result.take(0).map_err(data_err)?;
            Ok(users.pop())
        })
    }

    fn insert_user(&self, user: &UserProfile) -> BoxFuture<'_, DomainResult<UserProfile>> {
        let user = user.clone();
        Box::pin(async move {
            let created: Option<UserProfile> = self
                .db
                .create("app_user")
                .content(user)
                .await
                .map_err(data_err)?;
            created.ok_or_else(|| DomainError::DataAccess("insert returned no row".to_string()))
        })
    }

    fn update_user(
        &self,
        user_id: &str,
        update: &UserUpdate,
    ) -> BoxFuture<'_, DomainResult<UserProfile>> {
        let user_id = user_id.to_string();
        let update = update.clone();
        Box::pin(async move {
            let mut patch = serde_json::Map::new();
            if let Some(full_name) = update.full_name {
                patch.insert("full_name".to_string(), full_name.into());
            }
            if let Some(role) = update.role {
                patch.insert(
                    "role".to_string(),
                    serde_json::to_value(role)
                        .map_err(|err| DomainError::DataAccess(err.to_string()))?,
                );
            }
            if let Some(permissions) = update.permissions {
                patch.insert(
                    "permissions".to_string(),
                    serde_json::to_value(permissions)
                        .map_err(|err| DomainError::DataAccess(err.to_string()))?,
                );
            }
            if let Some(status) = update.status {
                patch.insert(
                    "status".to_string(),
                    serde_json::to_value(status)
                        .map_err(|err| DomainError::DataAccess(err.to_string()))?,
                );
            }

            let mut result = self
                .db
                .query("UPDATE app_user MERGE $patch WHERE user_id = $user_id RETURN AFTER")
                .bind(("patch", serde_json::Value::Object(patch)))
                .bind(("user_id", user_id))
                .await
                .map_err(data_err)?;
            let mut users: Vec<UserProfile> = result.take(0).map_err(data_err)?;
            users.pop().ok_or(DomainError::NotFound)
        })
    }

    fn delete_user(&self, user_id: &str) -> BoxFuture<'_, DomainResult<()>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            self.db
                .query("DELETE app_user WHERE user_id = $user_id")
                .bind(("user_id", user_id))
                .await
                .map_err(data_err)?;
            Ok(())
        })
    }

    fn list_companies(&self) -> BoxFuture<'_, DomainResult<Vec<Company>>> {
        Box::pin(async move {
            let mut result = self
                .db
                .query("SELECT * FROM company ORDER BY name")
                .await
                .map_err(data_err)?;
            let companies: Vec<Company> = result.take(0).map_err(data_err)?;
            Ok(companies)
        })
    }

    fn insert_company(&self, company: &Company) -> BoxFuture<'_, DomainResult<Company>> {
        let company = company.clone();
        Box::pin(async move {
            let created: Option<Company> = self
                .db
                .create("company")
                .content(company)
                .await
                .map_err(data_err)?;
            created.ok_or_else(|| DomainError::DataAccess("insert returned no row".to_string()))
        })
    }

    fn delete_company(&self, company_id: &str) -> BoxFuture<'_, DomainResult<()>> {
        let company_id = company_id.to_string();
        Box::pin(async move {
            self.db
                .query("DELETE company WHERE company_id = $company_id")
                .bind(("company_id", company_id))
                .await
                .map_err(data_err)?;
            Ok(())
        })
    }
}

/// Login credentials on SurrealDB. Password hashes never leave the database:
/// hashing and comparison run server-side through the crypto functions.
pub struct SurrealAuthAdmin {
    db: Surreal<Client>,
}

impl SurrealAuthAdmin {
    pub fn new(db: Surreal<Client>) -> Self {
        Self { db }
    }
}

impl AuthAdmin for SurrealAuthAdmin {
    fn create_login(&self, email: &str, password: &str) -> BoxFuture<'_, DomainResult<String>> {
        let email = email.to_string();
        let password = password.to_string();
        Box::pin(async move {
            let mut existing = self
                .db
                .query("SELECT VALUE login_id FROM login WHERE email = $email")
                .bind(("email", email.clone()))
                .await
                .map_err(data_err)?;
            let found: Vec<String> = existing.take(0).map_err(data_err)?;
            if !found.is_empty() {
                return Err(DomainError::Conflict);
            }

            let login_id = uuid_v7_without_dashes();
            self.db
                .query(
                    "CREATE login CONTENT { \
                        login_id: $login_id, \
                        email: $email, \
                        password_hash: crypto::argon2::generate($password) \
                    }",
                )
                .bind(("login_id", login_id.clone()))
                .bind(("email", email))
                .bind(("password", password))
                .await
                .map_err(data_err)?;
            Ok(login_id)
        })
    }

    fn delete_login(&self, login_id: &str) -> BoxFuture<'_, DomainResult<()>> {
        let login_id = login_id.to_string();
        Box::pin(async move {
            self.db
                .query("DELETE login WHERE login_id = $login_id")
                .bind(("login_id", login_id))
                .await
                .map_err(data_err)?;
            Ok(())
        })
    }

    fn reset_password(&self, email: &str, new_password: &str) -> BoxFuture<'_, DomainResult<()>> {
        let email = email.to_string();
        let new_password = new_password.to_string();
        Box::pin(async move {
            let mut result = self
                .db
                .query(
                    "UPDATE login \
                     SET password_hash = crypto::argon2::generate($password) \
                     WHERE email = $email RETURN AFTER",
                )
                .bind(("password", new_password))
                .bind(("email", email))
                .await
                .map_err(data_err)?;
            let updated: Vec<serde_json::Value> = result.take(0).map_err(data_err)?;
            if updated.is_empty() {
                return Err(DomainError::NotFound);
            }
            Ok(())
        })
    }

    fn verify_password(
        &self,
        email: &str,
        password: &str,
    ) -> BoxFuture<'_, DomainResult<Option<String>>> {
        let email = email.to_string();
        let password = password.to_string();
        Box::pin(async move {
            let mut result = self
                .db
                .query(
                    "SELECT VALUE login_id FROM login \
                     WHERE email = $email \
                     AND crypto::argon2::compare(password_hash, $password)",
                )
                .bind(("email", email))
                .bind(("password", password))
                .await
                .map_err(data_err)?;
            let mut ids: Vec<String> = result.take(0).map_err(data_err)?;
            Ok(ids.pop())
        })
    }
}
