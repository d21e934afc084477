use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::responses::{AnswerRow, NewResponse, ResponseRecord};
use crate::scope::CompanyScope;
use crate::surveys::{NewSurvey, QuestionRow, SurveyPatch, SurveyRecord};
use crate::DomainResult;

/// Data-access collaborator for the survey tables. Inserts return the stored
/// row as `Option` so a backend that resolves without data and without an
/// error stays observable to the caller.
pub trait SurveyGateway: Send + Sync {
    fn fetch_survey_tree(
        &self,
        scope: &CompanyScope,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<SurveyRecord>>>;

    fn fetch_responses(
        &self,
        survey_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<ResponseRecord>>>;

    fn insert_survey(
        &self,
        survey: &NewSurvey,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<NewSurvey>>>;

    fn update_survey(
        &self,
        survey_id: &str,
        patch: &SurveyPatch,
    ) -> crate::ports::BoxFuture<'_, DomainResult<()>>;

    fn delete_survey(&self, survey_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<()>>;

    fn delete_questions(&self, survey_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<()>>;

    fn insert_questions(
        &self,
        rows: &[QuestionRow],
    ) -> crate::ports::BoxFuture<'_, DomainResult<()>>;

    fn insert_response(
        &self,
        response: &NewResponse,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<NewResponse>>>;

    fn insert_answers(&self, rows: &[AnswerRow]) -> crate::ports::BoxFuture<'_, DomainResult<()>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyChange {
    pub action: ChangeAction,
    pub survey_id: Option<String>,
}

/// Change-notification channel for the survey table. Dropping the receiver
/// unsubscribes.
pub trait SurveyChangeFeed: Send + Sync {
    fn subscribe(&self) -> crate::ports::BoxFuture<'_, DomainResult<mpsc::Receiver<SurveyChange>>>;
}
