use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, RwLock};

use enquete_domain::error::DomainError;
use enquete_domain::identity::{Company, UserProfile};
use enquete_domain::ports::directory::{AuthAdmin, DirectoryRepository};
use enquete_domain::ports::surveys::{
    ChangeAction, SurveyChange, SurveyChangeFeed, SurveyGateway,
};
use enquete_domain::ports::BoxFuture;
use enquete_domain::responses::{AnswerRow, NewResponse, ResponseRecord};
use enquete_domain::scope::CompanyScope;
use enquete_domain::surveys::{NewSurvey, QuestionRecord, QuestionRow, SurveyPatch, SurveyRecord};
use enquete_domain::users::UserUpdate;
use enquete_domain::util::uuid_v7_without_dashes;
use enquete_domain::DomainResult;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Default)]
pub struct InMemoryDirectoryRepository {
    users: Arc<RwLock<HashMap<String, UserProfile>>>,
    companies: Arc<RwLock<HashMap<String, Company>>>,
}

impl InMemoryDirectoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DirectoryRepository for InMemoryDirectoryRepository {
    fn list_users(&self, scope: &CompanyScope) -> BoxFuture<'_, DomainResult<Vec<UserProfile>>> {
        let scope = scope.clone();
        let users = self.users.clone();
        Box::pin(async move {
            let users = users.read().await;
            let mut listed: Vec<UserProfile> = users
                .values()
                .filter(|user| match &scope {
                    CompanyScope::AllCompanies => true,
                    CompanyScope::Company(company_id) => {
                        user.company_id.as_deref() == Some(company_id)
                    }
                })
                .cloned()
                .collect();
            listed.sort_by(|a, b| a.full_name.cmp(&b.full_name));
            Ok(listed)
        })
    }

    fn get_user(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Option<UserProfile>>> {
        let user_id = user_id.to_string();
        let users = self.users.clone();
        Box::pin(async move { Ok(users.read().await.get(&user_id).cloned()) })
    }

    fn find_user_by_email(&self, email: &str) -> BoxFuture<'_, DomainResult<Option<UserProfile>>> {
        let email = email.to_string();
        let users = self.users.clone();
        Box::pin(async move {
            let users = users.read().await;
            Ok(users.values().find(|user| user.email == email).cloned())
        })
    }

    fn insert_user(&self, user: &UserProfile) -> BoxFuture<'_, DomainResult<UserProfile>> {
        let user = user.clone();
        let users = self.users.clone();
        Box::pin(async move {
            let mut users = users.write().await;
            if users.contains_key(&user.user_id) {
                return Err(DomainError::Conflict);
            }
            users.insert(user.user_id.clone(), user.clone());
            Ok(user)
        })
    }

    fn update_user(
        &self,
        user_id: &str,
        update: &UserUpdate,
    ) -> BoxFuture<'_, DomainResult<UserProfile>> {
        let user_id = user_id.to_string();
        let update = update.clone();
        let users = self.users.clone();
        Box::pin(async move {
            let mut users = users.write().await;
            let user = users.get_mut(&user_id).ok_or(DomainError::NotFound)?;
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

    fn delete_user(&self, user_id: &str) -> BoxFuture<'_, DomainResult<()>> {
        let user_id = user_id.to_string();
        let users = self.users.clone();
        Box::pin(async move {
            users.write().await.remove(&user_id);
            Ok(())
        })
    }

    fn list_companies(&self) -> BoxFuture<'_, DomainResult<Vec<Company>>> {
        let companies = self.companies.clone();
        Box::pin(async move {
            let companies = companies.read().await;
            let mut listed: Vec<Company> = companies.values().cloned().collect();
            listed.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(listed)
        })
    }

    fn insert_company(&self, company: &Company) -> BoxFuture<'_, DomainResult<Company>> {
        let company = company.clone();
        let companies = self.companies.clone();
        Box::pin(async move {
            let mut companies = companies.write().await;
            if companies.contains_key(&company.company_id) {
                return Err(DomainError::Conflict);
            }
            companies.insert(company.company_id.clone(), company.clone());
            Ok(company)
        })
    }

    fn delete_company(&self, company_id: &str) -> BoxFuture<'_, DomainResult<()>> {
        let company_id = company_id.to_string();
        let companies = self.companies.clone();
        Box::pin(async move {
            companies.write().await.remove(&company_id);
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct InMemoryAuthAdmin {
    logins: Arc<RwLock<HashMap<String, (String, String)>>>,
}

impl InMemoryAuthAdmin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuthAdmin for InMemoryAuthAdmin {
    fn create_login(&self, email: &str, password: &str) -> BoxFuture<'_, DomainResult<String>> {
        let email = email.to_string();
        let password = password.to_string();
        let logins = self.logins.clone();
        Box::pin(async move {
            let mut logins = logins.write().await;
            if logins.values().any(|(login_email, _)| login_email == &email) {
                return Err(DomainError::Conflict);
            }
            let login_id = uuid_v7_without_dashes();
            logins.insert(login_id.clone(), (email, password));
            Ok(login_id)
        })
    }

    fn delete_login(&self, login_id: &str) -> BoxFuture<'_, DomainResult<()>> {
        let login_id = login_id.to_string();
        let logins = self.logins.clone();
        Box::pin(async move {
            logins.write().await.remove(&login_id);
            Ok(())
        })
    }

    fn reset_password(&self, email: &str, new_password: &str) -> BoxFuture<'_, DomainResult<()>> {
        let email = email.to_string();
        let new_password = new_password.to_string();
        let logins = self.logins.clone();
        Box::pin(async move {
            let mut logins = logins.write().await;
            let login = logins
                .values_mut()
                .find(|(login_email, _)| login_email == &email)
                .ok_or(DomainError::NotFound)?;
            login.1 = new_password;
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
        let logins = self.logins.clone();
        Box::pin(async move {
            let logins = logins.read().await;
            Ok(logins
                .iter()
                .find(|(_, (login_email, login_password))| {
                    login_email == &email && login_password == &password
                })
                .map(|(login_id, _)| login_id.clone()))
        })
    }
}

/// In-memory survey tables with the same join shape the production backend
/// returns. Survey writes fan out change events so the live resync path can
/// be exercised without a database.
pub struct InMemorySurveyRepository {
    directory: Arc<InMemoryDirectoryRepository>,
    surveys: Arc<RwLock<HashMap<String, NewSurvey>>>,
    questions: Arc<RwLock<Vec<QuestionRow>>>,
    responses: Arc<RwLock<Vec<NewResponse>>>,
    answers: Arc<RwLock<Vec<AnswerRow>>>,
    changes: broadcast::Sender<SurveyChange>,
}

impl InMemorySurveyRepository {
    pub fn new(directory: Arc<InMemoryDirectoryRepository>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            directory,
            surveys: Arc::new(RwLock::new(HashMap::new())),
            questions: Arc::new(RwLock::new(Vec::new())),
            responses: Arc::new(RwLock::new(Vec::new())),
            answers: Arc::new(RwLock::new(Vec::new())),
            changes,
        }
    }

    fn publish(&self, action: ChangeAction, survey_id: &str) {
        // No subscribers is fine; the send error only means nobody listens.
        let _ = self.changes.send(SurveyChange {
            action,
            survey_id: Some(survey_id.to_string()),
        });
    }
}

impl SurveyGateway for InMemorySurveyRepository {
    fn fetch_survey_tree(
        &self,
        scope: &CompanyScope,
    ) -> BoxFuture<'_, DomainResult<Vec<SurveyRecord>>> {
        let scope = scope.clone();
        Box::pin(async move {
            let surveys = self.surveys.read().await;
            let questions = self.questions.read().await;
            let responses = self.responses.read().await;
            let users = self.directory.users.read().await;
            let companies = self.directory.companies.read().await;

            let records = surveys
                .values()
                .filter(|survey| match &scope {
                    CompanyScope::AllCompanies => true,
                    CompanyScope::Company(company_id) => &survey.company_id == company_id,
                })
                .map(|survey| SurveyRecord {
                    survey_id: survey.survey_id.clone(),
                    title: survey.title.clone(),
                    company_id: survey.company_id.clone(),
                    created_by: survey.created_by.clone(),
                    created_at_ms: survey.created_at_ms,
                    questions: questions
                        .iter()
                        .filter(|row| row.survey_id == survey.survey_id)
                        .map(|row| QuestionRecord {
                            question_id: row.question_id.clone(),
                            text: row.text.clone(),
                            question_type: row.question_type,
                            options: row.options.clone(),
                            position: Some(row.position),
                        })
                        .collect(),
                    response_ids: responses
                        .iter()
                        .filter(|row| row.survey_id == survey.survey_id)
                        .map(|row| row.response_id.clone())
                        .collect(),
                    company_name: companies
                        .get(&survey.company_id)
                        .map(|company| company.name.clone()),
                    created_by_name: users
                        .get(&survey.created_by)
                        .map(|user| user.full_name.clone()),
                })
                .collect();
            Ok(records)
        })
    }

    fn fetch_responses(&self, survey_id: &str) -> BoxFuture<'_, DomainResult<Vec<ResponseRecord>>> {
        let survey_id = survey_id.to_string();
        Box::pin(async move {
            let responses = self.responses.read().await;
            let answers = self.answers.read().await;
            Ok(responses
                .iter()
                .filter(|row| row.survey_id == survey_id)
                .map(|row| ResponseRecord {
                    response_id: row.response_id.clone(),
                    survey_id: row.survey_id.clone(),
                    respondent_id: row.respondent_id.clone(),
                    answers: answers
                        .iter()
                        .filter(|answer| answer.response_id == row.response_id)
                        .cloned()
                        .collect(),
                })
                .collect())
        })
    }

    fn insert_survey(&self, survey: &NewSurvey) -> BoxFuture<'_, DomainResult<Option<NewSurvey>>> {
        let survey = survey.clone();
        Box::pin(async move {
            let mut surveys = self.surveys.write().await;
            if surveys.contains_key(&survey.survey_id) {
                return Err(DomainError::Conflict);
            }
            surveys.insert(survey.survey_id.clone(), survey.clone());
            drop(surveys);
            self.publish(ChangeAction::Create, &survey.survey_id);
            Ok(Some(survey))
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
            let mut surveys = self.surveys.write().await;
            let survey = surveys.get_mut(&survey_id).ok_or(DomainError::NotFound)?;
            survey.title = patch.title;
            survey.company_id = patch.company_id;
            drop(surveys);
            self.publish(ChangeAction::Update, &survey_id);
            Ok(())
        })
    }

    fn delete_survey(&self, survey_id: &str) -> BoxFuture<'_, DomainResult<()>> {
        let survey_id = survey_id.to_string();
        Box::pin(async move {
            self.surveys.write().await.remove(&survey_id);
            self.publish(ChangeAction::Delete, &survey_id);
            Ok(())
        })
    }

    fn delete_questions(&self, survey_id: &str) -> BoxFuture<'_, DomainResult<()>> {
        let survey_id = survey_id.to_string();
        Box::pin(async move {
            self.questions
                .write()
                .await
                .retain(|row| row.survey_id != survey_id);
            Ok(())
        })
    }

    fn insert_questions(&self, rows: &[QuestionRow]) -> BoxFuture<'_, DomainResult<()>> {
        let rows = rows.to_vec();
        Box::pin(async move {
            self.questions.write().await.extend(rows);
            Ok(())
        })
    }

    fn insert_response(
        &self,
        response: &NewResponse,
    ) -> BoxFuture<'_, DomainResult<Option<NewResponse>>> {
        let response = response.clone();
        Box::pin(async move {
            self.responses.write().await.push(response.clone());
            Ok(Some(response))
        })
    }

    fn insert_answers(&self, rows: &[AnswerRow]) -> BoxFuture<'_, DomainResult<()>> {
        let rows = rows.to_vec();
        Box::pin(async move {
            self.answers.write().await.extend(rows);
            Ok(())
        })
    }
}

impl SurveyChangeFeed for InMemorySurveyRepository {
    fn subscribe(&self) -> BoxFuture<'_, DomainResult<mpsc::Receiver<SurveyChange>>> {
        let mut events = self.changes.subscribe();
        Box::pin(async move {
            let (tx, rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);
            tokio::spawn(async move {
                while let Ok(change) = events.recv().await {
                    if tx.send(change).await.is_err() {
                        break;
                    }
                }
            });
            Ok(rx)
        })
    }
}
