/// AI quiz collaborator
///
/// Generates draft quiz questions for admins and scores free-text comment
/// submissions. Drafts are never stored until an admin accepts them, and a
/// scoring failure only leaves the score empty for manual review.
use crate::{
    config::AssistantConfig,
    error::{MarketError, MarketResult},
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Question format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    ShortAnswer,
    /// True/false, answered with "O" or "X"
    Ox,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice => "multiple_choice",
            QuestionKind::ShortAnswer => "short_answer",
            QuestionKind::Ox => "ox",
        }
    }

    pub fn parse(s: &str) -> MarketResult<Self> {
        match s {
            "multiple_choice" => Ok(QuestionKind::MultipleChoice),
            "short_answer" => Ok(QuestionKind::ShortAnswer),
            "ox" => Ok(QuestionKind::Ox),
            _ => Err(MarketError::Validation(format!("Invalid question kind: {}", s))),
        }
    }
}

/// Quiz generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizRequest {
    pub topic: String,
    pub grade: Option<String>,
    pub subject: Option<String>,
    pub question_count: u32,
    pub difficulty: Option<String>,
}

/// A generated (or admin-edited) question awaiting acceptance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizDraft {
    pub prompt: String,
    pub kind: QuestionKind,
    #[serde(default)]
    pub choices: Vec<String>,
    pub correct_answer: String,
    pub explanation: Option<String>,
}

/// AI collaborator boundary
#[async_trait::async_trait]
pub trait QuizAssistant: Send + Sync {
    /// Draft questions for review
    async fn generate_quiz(&self, request: &QuizRequest) -> MarketResult<Vec<QuizDraft>>;

    /// Score a comment against review criteria, 0 to 100
    async fn score_comment(&self, criteria: &str, comment: &str) -> MarketResult<i64>;
}

#[derive(Debug, Deserialize)]
struct GenerateQuizResponse {
    questions: Vec<QuizDraft>,
}

#[derive(Debug, Serialize)]
struct ScoreCommentRequest<'a> {
    criteria: &'a str,
    comment: &'a str,
}

#[derive(Debug, Deserialize)]
struct ScoreCommentResponse {
    score: f64,
}

/// Assistant reached over HTTP
pub struct HttpQuizAssistant {
    endpoint: String,
    api_key: Option<String>,
    http_client: Client,
}

impl HttpQuizAssistant {
    pub fn new(endpoint: String, api_key: Option<String>, timeout: Duration) -> MarketResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MarketError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            http_client,
        })
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(&self, path: &str, body: &B) -> MarketResult<R> {
        let url = format!("{}/{}", self.endpoint, path);
        let mut request = self.http_client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MarketError::UpstreamFailure(format!("Assistant unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(MarketError::UpstreamFailure(format!(
                "Assistant returned {}",
                response.status()
            )));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| MarketError::UpstreamFailure(format!("Invalid assistant response: {}", e)))
    }
}

#[async_trait::async_trait]
impl QuizAssistant for HttpQuizAssistant {
    async fn generate_quiz(&self, request: &QuizRequest) -> MarketResult<Vec<QuizDraft>> {
        let response: GenerateQuizResponse = self.post("generate-quiz", request).await?;
        tracing::info!(count = response.questions.len(), topic = %request.topic, "Quiz drafts generated");
        Ok(response.questions)
    }

    async fn score_comment(&self, criteria: &str, comment: &str) -> MarketResult<i64> {
        let response: ScoreCommentResponse = self
            .post("score-comment", &ScoreCommentRequest { criteria, comment })
            .await?;

        if !response.score.is_finite() {
            return Err(MarketError::UpstreamFailure("Assistant returned no score".to_string()));
        }
        Ok((response.score.round() as i64).clamp(0, 100))
    }
}

/// Used when no assistant endpoint is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledQuizAssistant;

#[async_trait::async_trait]
impl QuizAssistant for DisabledQuizAssistant {
    async fn generate_quiz(&self, _request: &QuizRequest) -> MarketResult<Vec<QuizDraft>> {
        Err(MarketError::UpstreamFailure("Quiz assistant is not configured".to_string()))
    }

    async fn score_comment(&self, _criteria: &str, _comment: &str) -> MarketResult<i64> {
        Err(MarketError::UpstreamFailure("Quiz assistant is not configured".to_string()))
    }
}

/// Deterministic assistant for local development and tests
#[derive(Debug, Clone, Default)]
pub struct CannedQuizAssistant {
    pub drafts: Vec<QuizDraft>,
    pub score: Option<i64>,
}

#[async_trait::async_trait]
impl QuizAssistant for CannedQuizAssistant {
    async fn generate_quiz(&self, request: &QuizRequest) -> MarketResult<Vec<QuizDraft>> {
        Ok(self
            .drafts
            .iter()
            .take(request.question_count as usize)
            .cloned()
            .collect())
    }

    async fn score_comment(&self, _criteria: &str, _comment: &str) -> MarketResult<i64> {
        self.score
            .ok_or_else(|| MarketError::UpstreamFailure("No canned score".to_string()))
    }
}

/// Build the assistant described by configuration
pub fn from_config(config: &AssistantConfig) -> MarketResult<std::sync::Arc<dyn QuizAssistant>> {
    match &config.endpoint {
        Some(endpoint) => Ok(std::sync::Arc::new(HttpQuizAssistant::new(
            endpoint.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )?)),
        None => {
            tracing::warn!("No quiz assistant endpoint configured; AI features disabled");
            Ok(std::sync::Arc::new(DisabledQuizAssistant))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_assistant_is_upstream_failure() {
        let result = DisabledQuizAssistant.score_comment("clarity", "a thoughtful comment").await;
        assert!(matches!(result, Err(MarketError::UpstreamFailure(_))));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_maps_to_upstream_failure() {
        let assistant = HttpQuizAssistant::new(
            "http://127.0.0.1:9".to_string(),
            None,
            Duration::from_millis(200),
        )
        .unwrap();

        let result = assistant
            .generate_quiz(&QuizRequest {
                topic: "fractions".to_string(),
                grade: None,
                subject: None,
                question_count: 3,
                difficulty: None,
            })
            .await;
        assert!(matches!(result, Err(MarketError::UpstreamFailure(_))));
    }

    #[test]
    fn test_draft_wire_format() {
        let draft: QuizDraft = serde_json::from_str(
            r#"{"prompt":"2+2?","kind":"multiple_choice","choices":["3","4"],"correctAnswer":"4","explanation":null}"#,
        )
        .unwrap();
        assert_eq!(draft.kind, QuestionKind::MultipleChoice);
        assert_eq!(draft.correct_answer, "4");
    }
}
