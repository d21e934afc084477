use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::identity::Viewer;
use crate::ports::activity::{ActivityEntry, ActivityLevel, ActivityLogger};
use crate::ports::notify::Notifier;
use crate::ports::surveys::SurveyGateway;
use crate::responses::{Answer, AnswerRow, NewResponse};
use crate::surveys::{
    NewSurvey, Question, QuestionRow, QuestionType, Survey, SurveyPatch, SurveyStore,
    ACTIVITY_CATEGORY_SURVEYS,
};
use crate::util::{now_ms, uuid_v7_without_dashes};
use crate::DomainResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub text: String,
    pub question_type: QuestionType,
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyDraft {
    pub title: String,
    pub questions: Vec<QuestionDraft>,
}

/// Rebuilds the stored question rows from the draft. Positions are dense
/// 0..N-1 taken from the array index; old rows are always fully replaced.
pub fn build_question_rows(survey_id: &str, drafts: &[QuestionDraft]) -> Vec<QuestionRow> {
    drafts
        .iter()
        .enumerate()
        .map(|(index, draft)| QuestionRow {
            question_id: uuid_v7_without_dashes(),
            survey_id: survey_id.to_string(),
            text: draft.text.clone(),
            question_type: draft.question_type,
            options: draft.options.clone(),
            position: index as i64,
        })
        .collect()
}

/// Questions from `questions` that have no present, non-empty answer in
/// `answers`, in display order. Returned as the question texts so the caller
/// can name them to the user.
pub fn missing_required_answers(questions: &[Question], answers: &[Answer]) -> Vec<String> {
    questions
        .iter()
        .filter(|question| {
            !answers.iter().any(|answer| {
                answer.question_id == question.question_id && answer.value.is_answered()
            })
        })
        .map(|question| question.text.clone())
        .collect()
}

/// Orchestrates the multi-table survey writes. Each write sequence is plain
/// sequential calls with no cross-table transaction; the partial-failure
/// gaps this opens (survey without questions, response without answers) are
/// preserved observed behavior, not compensated here.
pub struct SurveyMutationService {
    gateway: Arc<dyn SurveyGateway>,
    store: Arc<SurveyStore>,
    logger: Arc<dyn ActivityLogger>,
    notifier: Arc<dyn Notifier>,
}

impl SurveyMutationService {
    pub fn new(
        gateway: Arc<dyn SurveyGateway>,
        store: Arc<SurveyStore>,
        logger: Arc<dyn ActivityLogger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            gateway,
            store,
            logger,
            notifier,
        }
    }

    pub async fn save_survey(
        &self,
        draft: &SurveyDraft,
        editing_survey_id: Option<&str>,
        viewer: Option<&Viewer>,
    ) {
        let Some(viewer) = viewer else {
            self.notifier
                .error("Você precisa estar autenticado para salvar a pesquisa.");
            return;
        };
        let Some(company_id) = viewer.company_id.clone() else {
            self.notifier
                .error("Seu usuário não está vinculado a nenhuma empresa.");
            return;
        };

        match self
            .write_survey(draft, editing_survey_id, viewer, &company_id)
            .await
        {
            Ok(()) => {
                self.store
                    .fetch_surveys(refetch_hint(viewer).as_deref(), Some(viewer))
                    .await;
                self.notifier.success("Pesquisa salva com sucesso!");
                self.logger.log(
                    ActivityEntry::new(
                        ActivityLevel::Info,
                        format!("Pesquisa \"{}\" salva", draft.title),
                        ACTIVITY_CATEGORY_SURVEYS,
                    )
                    .with_actor(viewer),
                );
            }
            Err(err) => {
                self.notifier
                    .error(&format!("Erro ao salvar pesquisa: {err}"));
                self.logger.log(
                    ActivityEntry::new(
                        ActivityLevel::Error,
                        format!("Falha ao salvar pesquisa \"{}\": {err}", draft.title),
                        ACTIVITY_CATEGORY_SURVEYS,
                    )
                    .with_actor(viewer),
                );
            }
        }
    }

    async fn write_survey(
        &self,
        draft: &SurveyDraft,
        editing_survey_id: Option<&str>,
        viewer: &Viewer,
        company_id: &str,
    ) -> DomainResult<()> {
        if let Some(survey_id) = editing_survey_id {
            let patch = SurveyPatch {
                title: draft.title.clone(),
                company_id: company_id.to_string(),
            };
            self.gateway.update_survey(survey_id, &patch).await?;
            self.gateway.delete_questions(survey_id).await?;
            self.gateway
                .insert_questions(&build_question_rows(survey_id, &draft.questions))
                .await?;
            return Ok(());
        }

        let survey = NewSurvey {
            survey_id: uuid_v7_without_dashes(),
            title: draft.title.clone(),
            company_id: company_id.to_string(),
            created_by: viewer.user_id.clone(),
            created_at_ms: now_ms(),
        };
        if let Some(created) = self.gateway.insert_survey(&survey).await? {
            // A question-insert failure here leaves the survey row behind.
            self.gateway
                .insert_questions(&build_question_rows(&created.survey_id, &draft.questions))
                .await?;
        }
        Ok(())
    }

    pub async fn delete_survey(&self, survey_id: &str, viewer: Option<&Viewer>) -> bool {
        match self.gateway.delete_survey(survey_id).await {
            Ok(()) => {
                self.store
                    .fetch_surveys(
                        viewer.and_then(|viewer| refetch_hint(viewer)).as_deref(),
                        viewer,
                    )
                    .await;
                self.notifier.success("Pesquisa excluída com sucesso!");
                true
            }
            Err(err) => {
                self.notifier
                    .error(&format!("Erro ao excluir pesquisa: {err}"));
                let mut entry = ActivityEntry::new(
                    ActivityLevel::Error,
                    format!("Falha ao excluir pesquisa {survey_id}: {err}"),
                    ACTIVITY_CATEGORY_SURVEYS,
                );
                if let Some(viewer) = viewer {
                    entry = entry.with_actor(viewer);
                }
                self.logger.log(entry);
                false
            }
        }
    }

    pub async fn save_response(
        &self,
        answers: &[Answer],
        survey: &Survey,
        viewer: Option<&Viewer>,
    ) -> bool {
        let Some(viewer) = viewer else {
            self.notifier
                .error("Você precisa estar autenticado para enviar a resposta.");
            return false;
        };

        let missing = missing_required_answers(&survey.questions, answers);
        if !missing.is_empty() {
            let names = missing.join(", ");
            self.notifier.error(&format!(
                "Responda as seguintes perguntas obrigatórias: {names}"
            ));
            self.logger.log(
                ActivityEntry::new(
                    ActivityLevel::Warn,
                    format!(
                        "Resposta à pesquisa \"{}\" rejeitada; perguntas sem resposta: {names}",
                        survey.title
                    ),
                    ACTIVITY_CATEGORY_SURVEYS,
                )
                .with_actor(viewer),
            );
            return false;
        }

        let response = NewResponse {
            response_id: uuid_v7_without_dashes(),
            survey_id: survey.survey_id.clone(),
            respondent_id: viewer.user_id.clone(),
            submitted_at_ms: now_ms(),
        };

        let created = match self.gateway.insert_response(&response).await {
            Ok(Some(created)) => created,
            Ok(None) => {
                // Backend resolved without a row and without an error.
                self.notifier.error("Erro ao enviar resposta.");
                self.logger.log(
                    ActivityEntry::new(
                        ActivityLevel::Error,
                        "Inserção de resposta não retornou linha".to_string(),
                        ACTIVITY_CATEGORY_SURVEYS,
                    )
                    .with_actor(viewer),
                );
                return false;
            }
            Err(err) => {
                self.notifier
                    .error(&format!("Erro ao enviar resposta: {err}"));
                self.logger.log(
                    ActivityEntry::new(
                        ActivityLevel::Error,
                        format!("Falha ao inserir resposta: {err}"),
                        ACTIVITY_CATEGORY_SURVEYS,
                    )
                    .with_actor(viewer),
                );
                return false;
            }
        };

        let rows: Vec<AnswerRow> = answers
            .iter()
            .map(|answer| AnswerRow {
                answer_id: uuid_v7_without_dashes(),
                response_id: created.response_id.clone(),
                question_id: answer.question_id.clone(),
                value: answer.value.clone(),
            })
            .collect();

        if let Err(err) = self.gateway.insert_answers(&rows).await {
            // The inserted response stays behind without answers.
            self.notifier
                .error(&format!("Erro ao enviar resposta: {err}"));
            self.logger.log(
                ActivityEntry::new(
                    ActivityLevel::Error,
                    format!(
                        "Falha ao inserir respostas da pesquisa \"{}\": {err}",
                        survey.title
                    ),
                    ACTIVITY_CATEGORY_SURVEYS,
                )
                .with_actor(viewer),
            );
            return false;
        }

        self.store
            .fetch_surveys(refetch_hint(viewer).as_deref(), Some(viewer))
            .await;
        self.store.fetch_survey_responses(&survey.survey_id).await;
        self.notifier.success("Resposta enviada com sucesso!");
        self.logger.log(
            ActivityEntry::new(
                ActivityLevel::Info,
                format!("Resposta enviada para a pesquisa \"{}\"", survey.title),
                ACTIVITY_CATEGORY_SURVEYS,
            )
            .with_actor(viewer),
        );
        true
    }
}

fn refetch_hint(viewer: &Viewer) -> Option<String> {
    if viewer.role.is_developer() {
        None
    } else {
        viewer.company_id.clone()
    }
}
