use serde::{Deserialize, Serialize};

use crate::domain::{Question, ResponseId, SessionId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionView {
    pub question: Question,
    pub index: usize,
    pub prompt: String,
    pub options: Vec<String>,
}

impl From<Question> for QuestionView {
    fn from(question: Question) -> Self {
        Self {
            question,
            index: question.index(),
            prompt: question.prompt().to_string(),
            options: question.options().iter().map(|o| o.to_string()).collect(),
        }
    }
}

/// Answers recorded so far; `None` means the question is unanswered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerSheet {
    pub year_debt: Option<String>,
    pub company_scale: Option<String>,
    pub debt_amount: Option<String>,
    pub market_served: Option<String>,
}

impl AnswerSheet {
    pub fn get(&self, question: Question) -> Option<&str> {
        match question {
            Question::YearDebt => self.year_debt.as_deref(),
            Question::CompanyScale => self.company_scale.as_deref(),
            Question::DebtAmount => self.debt_amount.as_deref(),
            Question::MarketServed => self.market_served.as_deref(),
        }
    }

    pub fn set(&mut self, question: Question, answer: Option<String>) {
        let slot = match question {
            Question::YearDebt => &mut self.year_debt,
            Question::CompanyScale => &mut self.company_scale,
            Question::DebtAmount => &mut self.debt_amount,
            Question::MarketServed => &mut self.market_served,
        };
        *slot = answer;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub current_step: u8,
    pub finished: bool,
    pub question: Option<QuestionView>,
    pub answers: AnswerSheet,
    pub percent_complete: u8,
    pub can_advance: bool,
    pub can_retreat: bool,
    pub can_submit: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectAnswerRequest {
    #[serde(default)]
    pub answer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub response_id: ResponseId,
    pub session: SessionView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseTableView {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}
