//! Linear survey wizard: question flow, answer validation and submission.
//!
//! A [`Wizard`] walks the four questions in order. Every action either applies
//! fully or is refused with a [`Refusal`] and leaves the wizard untouched. The
//! only side effect is the single [`ResponseSink::insert_response`] call made
//! by [`Wizard::submit`].

use std::fmt;

use async_trait::async_trait;
use shared::domain::{Question, ResponseId, SurveyAnswers};
use thiserror::Error;
use tracing::debug;

/// Append-only destination for completed surveys.
#[async_trait]
pub trait ResponseSink: Send + Sync {
    async fn insert_response(&self, answers: &SurveyAnswers) -> anyhow::Result<ResponseId>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Asking(Question),
    Done,
}

impl Step {
    /// Step pointer in `0..=4`; 4 is the submitted state.
    pub fn index(self) -> u8 {
        match self {
            Step::Asking(question) => question.index() as u8,
            Step::Done => Question::COUNT as u8,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Asking(question) => write!(f, "question {}", question.key()),
            Step::Done => f.write_str("done"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Select,
    Advance,
    Retreat,
    Submit,
    Restart,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Select => "select",
            Action::Advance => "advance",
            Action::Retreat => "retreat",
            Action::Submit => "submit",
            Action::Restart => "restart",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Refusal {
    #[error("{} has no answer yet", .0.key())]
    Unanswered(Question),
    #[error("{action} is not available at {step}")]
    NotAvailable { action: Action, step: Step },
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Refused(#[from] Refusal),
    #[error("failed to persist survey response: {0:#}")]
    Persist(anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wizard {
    step: Step,
    answers: [Option<&'static str>; Question::COUNT],
}

impl Default for Wizard {
    fn default() -> Self {
        Self::new()
    }
}

impl Wizard {
    pub fn new() -> Self {
        Self {
            step: Step::Asking(Question::YearDebt),
            answers: [None; Question::COUNT],
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn current_step(&self) -> u8 {
        self.step.index()
    }

    pub fn is_done(&self) -> bool {
        self.step == Step::Done
    }

    pub fn current_question(&self) -> Option<Question> {
        match self.step {
            Step::Asking(question) => Some(question),
            Step::Done => None,
        }
    }

    pub fn answer(&self, question: Question) -> Option<&'static str> {
        self.answers[question.index()]
    }

    pub fn answers(&self) -> impl Iterator<Item = (Question, Option<&'static str>)> + '_ {
        Question::ALL
            .into_iter()
            .map(|question| (question, self.answer(question)))
    }

    /// Whole-number progress, 0 at the first question and 100 once submitted.
    pub fn percent_complete(&self) -> u8 {
        let step = u32::from(self.current_step());
        let total = Question::COUNT as u32;
        ((step * 100 + total / 2) / total) as u8
    }

    pub fn can_advance(&self) -> bool {
        match self.step {
            Step::Asking(question) => question.next().is_some() && self.answer(question).is_some(),
            Step::Done => false,
        }
    }

    pub fn can_retreat(&self) -> bool {
        matches!(self.step, Step::Asking(question) if question.previous().is_some())
    }

    pub fn can_submit(&self) -> bool {
        matches!(self.step, Step::Asking(question) if question.next().is_none())
            && self.completed_answers().is_ok()
    }

    /// Records `answer` for the current question. Anything outside the
    /// question's option set, including `None` and `""`, clears it.
    pub fn select(&mut self, answer: Option<&str>) -> Result<Option<&'static str>, Refusal> {
        let Step::Asking(question) = self.step else {
            return Err(self.not_available(Action::Select));
        };
        let resolved = answer.and_then(|value| question.option(value));
        self.answers[question.index()] = resolved;
        debug!(question = question.key(), answered = resolved.is_some(), "answer selected");
        Ok(resolved)
    }

    pub fn advance(&mut self) -> Result<Step, Refusal> {
        let Step::Asking(question) = self.step else {
            return Err(self.not_available(Action::Advance));
        };
        let Some(next) = question.next() else {
            return Err(self.not_available(Action::Advance));
        };
        if self.answer(question).is_none() {
            return Err(Refusal::Unanswered(question));
        }
        self.step = Step::Asking(next);
        Ok(self.step)
    }

    /// Moves back one question. Recorded answers are kept.
    pub fn retreat(&mut self) -> Result<Step, Refusal> {
        let previous = match self.step {
            Step::Asking(question) => question.previous(),
            Step::Done => None,
        };
        let Some(previous) = previous else {
            return Err(self.not_available(Action::Retreat));
        };
        self.step = Step::Asking(previous);
        Ok(self.step)
    }

    /// Persists the completed survey through `sink` and moves to [`Step::Done`].
    ///
    /// The sink is called at most once per call and only from the last
    /// question, so a submitted survey can never be written twice. If the sink
    /// fails the wizard stays on the last question and the call can be retried.
    pub async fn submit<S>(&mut self, sink: &S) -> Result<ResponseId, SubmitError>
    where
        S: ResponseSink + ?Sized,
    {
        let Step::Asking(question) = self.step else {
            return Err(self.not_available(Action::Submit).into());
        };
        if question.next().is_some() {
            return Err(self.not_available(Action::Submit).into());
        }
        let answers = self.completed_answers()?;

        let response_id = sink
            .insert_response(&answers)
            .await
            .map_err(SubmitError::Persist)?;
        self.step = Step::Done;
        Ok(response_id)
    }

    pub fn restart(&mut self) -> Result<Step, Refusal> {
        if self.step != Step::Done {
            return Err(self.not_available(Action::Restart));
        }
        *self = Self::new();
        Ok(self.step)
    }

    fn completed_answers(&self) -> Result<SurveyAnswers, Refusal> {
        let field = |question: Question| {
            self.answer(question)
                .map(str::to_string)
                .ok_or(Refusal::Unanswered(question))
        };
        Ok(SurveyAnswers {
            year_debt: field(Question::YearDebt)?,
            company_scale: field(Question::CompanyScale)?,
            debt_amount: field(Question::DebtAmount)?,
            market_served: field(Question::MarketServed)?,
        })
    }

    fn not_available(&self, action: Action) -> Refusal {
        Refusal::NotAvailable {
            action,
            step: self.step,
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
