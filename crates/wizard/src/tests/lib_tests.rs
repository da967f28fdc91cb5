use super::*;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Default)]
struct RecordingSink {
    inserted: Mutex<Vec<SurveyAnswers>>,
    fail: AtomicBool,
}

#[async_trait]
impl ResponseSink for RecordingSink {
    async fn insert_response(&self, answers: &SurveyAnswers) -> anyhow::Result<ResponseId> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("database is locked");
        }
        let mut inserted = self.inserted.lock().await;
        inserted.push(answers.clone());
        Ok(ResponseId(inserted.len() as i64))
    }
}

fn first_option(question: Question) -> &'static str {
    question.options()[0]
}

fn wizard_at_last_question() -> Wizard {
    let mut wizard = Wizard::new();
    for question in &Question::ALL[..3] {
        wizard.select(Some(first_option(*question))).expect("select");
        wizard.advance().expect("advance");
    }
    assert_eq!(wizard.step(), Step::Asking(Question::MarketServed));
    wizard
}

#[test]
fn starts_at_first_question_with_nothing_answered() {
    let wizard = Wizard::new();
    assert_eq!(wizard.current_step(), 0);
    assert_eq!(wizard.current_question(), Some(Question::YearDebt));
    assert!(wizard.answers().all(|(_, answer)| answer.is_none()));
    assert_eq!(wizard.percent_complete(), 0);
}

#[test]
fn advance_is_refused_while_unanswered() {
    let mut wizard = Wizard::new();
    for question in &Question::ALL[..3] {
        assert!(!wizard.can_advance());
        assert_eq!(wizard.advance(), Err(Refusal::Unanswered(*question)));
        assert_eq!(wizard.step(), Step::Asking(*question));

        wizard.select(Some(first_option(*question))).expect("select");
        assert!(wizard.can_advance());
        wizard.advance().expect("advance");
    }
}

#[test]
fn select_records_exact_option_and_is_idempotent() {
    let mut wizard = Wizard::new();
    let choice = "2001-2005 arası";
    assert_eq!(wizard.select(Some(choice)), Ok(Some(choice)));
    let snapshot = wizard.clone();
    assert_eq!(wizard.select(Some(choice)), Ok(Some(choice)));
    assert_eq!(wizard, snapshot);
    assert_eq!(wizard.answer(Question::YearDebt), Some(choice));
}

#[test]
fn select_outside_option_set_clears_the_answer() {
    let mut wizard = Wizard::new();
    wizard.select(Some("2016-2020 arası")).expect("select");

    assert_eq!(wizard.select(Some("")), Ok(None));
    assert_eq!(wizard.answer(Question::YearDebt), None);

    wizard.select(Some("2016-2020 arası")).expect("select");
    assert_eq!(wizard.select(Some("1-5 milyon TL")), Ok(None));
    assert_eq!(wizard.answer(Question::YearDebt), None);

    wizard.select(Some("2016-2020 arası")).expect("select");
    assert_eq!(wizard.select(None), Ok(None));
    assert_eq!(wizard.advance(), Err(Refusal::Unanswered(Question::YearDebt)));
}

#[test]
fn answers_can_change_any_number_of_times_on_the_same_step() {
    let mut wizard = Wizard::new();
    for option in Question::YearDebt.options() {
        wizard.select(Some(*option)).expect("select");
        assert_eq!(wizard.answer(Question::YearDebt), Some(*option));
    }
    assert_eq!(wizard.current_step(), 0);
}

#[test]
fn retreat_keeps_recorded_answers() {
    let mut wizard = wizard_at_last_question();
    wizard
        .select(Some("Sadece yurtdışı pazara hizmet veriyorum"))
        .expect("select");

    for expected in [2u8, 1, 0] {
        let before = wizard.current_step();
        wizard.retreat().expect("retreat");
        assert_eq!(wizard.current_step(), before - 1);
        assert_eq!(wizard.current_step(), expected);
        assert!(wizard.answers().all(|(_, answer)| answer.is_some()));
    }
}

#[test]
fn retreat_is_refused_on_first_question() {
    let mut wizard = Wizard::new();
    assert!(!wizard.can_retreat());
    assert!(matches!(
        wizard.retreat(),
        Err(Refusal::NotAvailable {
            action: Action::Retreat,
            ..
        })
    ));
    assert_eq!(wizard.current_step(), 0);
}

#[test]
fn cleared_answer_after_retreat_blocks_advance_again() {
    let mut wizard = wizard_at_last_question();
    wizard.retreat().expect("retreat");
    wizard.select(None).expect("clear");
    assert_eq!(
        wizard.advance(),
        Err(Refusal::Unanswered(Question::DebtAmount))
    );
    assert_eq!(wizard.current_question(), Some(Question::DebtAmount));
}

#[test]
fn advance_from_last_question_is_not_a_transition() {
    let mut wizard = wizard_at_last_question();
    wizard.select(Some(first_option(Question::MarketServed))).expect("select");
    assert!(!wizard.can_advance());
    assert!(matches!(
        wizard.advance(),
        Err(Refusal::NotAvailable {
            action: Action::Advance,
            ..
        })
    ));
}

#[test]
fn percent_complete_tracks_step() {
    let mut wizard = Wizard::new();
    let mut seen = vec![wizard.percent_complete()];
    for question in &Question::ALL[..3] {
        wizard.select(Some(first_option(*question))).expect("select");
        wizard.advance().expect("advance");
        seen.push(wizard.percent_complete());
    }
    assert_eq!(seen, vec![0, 25, 50, 75]);
}

#[tokio::test]
async fn submit_persists_once_in_field_order_then_finishes() {
    let sink = RecordingSink::default();
    let mut wizard = Wizard::new();

    wizard.select(Some("2001-2005 arası")).expect("q0");
    wizard.advance().expect("advance");
    wizard
        .select(Some("Küçük ölçekli işletme (10-49 çalışan)"))
        .expect("q1");
    wizard.advance().expect("advance");
    wizard.select(Some("1-5 milyon TL")).expect("q2");
    wizard.advance().expect("advance");
    wizard
        .select(Some("Sadece yurtiçi pazara hizmet veriyorum"))
        .expect("q3");
    assert!(wizard.can_submit());

    let response_id = wizard.submit(&sink).await.expect("submit");
    assert_eq!(response_id, ResponseId(1));
    assert_eq!(wizard.step(), Step::Done);
    assert_eq!(wizard.current_step(), 4);
    assert_eq!(wizard.percent_complete(), 100);

    let inserted = sink.inserted.lock().await;
    assert_eq!(inserted.len(), 1);
    assert_eq!(
        inserted[0].as_row(),
        [
            "2001-2005 arası",
            "Küçük ölçekli işletme (10-49 çalışan)",
            "1-5 milyon TL",
            "Sadece yurtiçi pazara hizmet veriyorum",
        ]
    );
}

#[tokio::test]
async fn submit_without_last_answer_is_refused_and_persists_nothing() {
    let sink = RecordingSink::default();
    let mut wizard = wizard_at_last_question();
    assert!(!wizard.can_submit());

    let err = wizard.submit(&sink).await.expect_err("refused");
    assert!(matches!(
        err,
        SubmitError::Refused(Refusal::Unanswered(Question::MarketServed))
    ));
    assert_eq!(wizard.step(), Step::Asking(Question::MarketServed));
    assert!(sink.inserted.lock().await.is_empty());
}

#[tokio::test]
async fn submit_before_last_question_is_refused() {
    let sink = RecordingSink::default();
    let mut wizard = Wizard::new();
    wizard.select(Some(first_option(Question::YearDebt))).expect("select");

    let err = wizard.submit(&sink).await.expect_err("refused");
    assert!(matches!(
        err,
        SubmitError::Refused(Refusal::NotAvailable {
            action: Action::Submit,
            ..
        })
    ));
    assert!(sink.inserted.lock().await.is_empty());
}

#[tokio::test]
async fn repeated_submit_after_done_does_not_persist_again() {
    let sink = RecordingSink::default();
    let mut wizard = wizard_at_last_question();
    wizard.select(Some(first_option(Question::MarketServed))).expect("select");
    wizard.submit(&sink).await.expect("submit");

    let err = wizard.submit(&sink).await.expect_err("already done");
    assert!(matches!(err, SubmitError::Refused(_)));
    assert_eq!(sink.inserted.lock().await.len(), 1);
}

#[tokio::test]
async fn sink_failure_keeps_last_question_for_retry() {
    let sink = RecordingSink::default();
    sink.fail.store(true, Ordering::SeqCst);
    let mut wizard = wizard_at_last_question();
    wizard.select(Some(first_option(Question::MarketServed))).expect("select");

    let err = wizard.submit(&sink).await.expect_err("sink fails");
    assert!(matches!(err, SubmitError::Persist(_)));
    assert!(err.to_string().contains("database is locked"));
    assert_eq!(wizard.step(), Step::Asking(Question::MarketServed));

    sink.fail.store(false, Ordering::SeqCst);
    wizard.submit(&sink).await.expect("retry");
    assert!(wizard.is_done());
    assert_eq!(sink.inserted.lock().await.len(), 1);
}

#[tokio::test]
async fn restart_from_done_resets_everything() {
    let sink = RecordingSink::default();
    let mut wizard = wizard_at_last_question();
    wizard.select(Some(first_option(Question::MarketServed))).expect("select");
    wizard.submit(&sink).await.expect("submit");

    assert_eq!(wizard.restart(), Ok(Step::Asking(Question::YearDebt)));
    assert_eq!(wizard, Wizard::new());
}

#[test]
fn restart_and_select_are_refused_where_unavailable() {
    let mut wizard = Wizard::new();
    assert!(matches!(
        wizard.restart(),
        Err(Refusal::NotAvailable {
            action: Action::Restart,
            ..
        })
    ));

    let mut done = Wizard {
        step: Step::Done,
        answers: Question::ALL.map(|question| Some(first_option(question))),
    };
    let before = done.clone();
    assert!(done.select(Some("2000 ve öncesi")).is_err());
    assert!(done.retreat().is_err());
    assert_eq!(done, before);
}

#[test]
fn refusal_messages_name_the_question_and_step() {
    assert_eq!(
        Refusal::Unanswered(Question::CompanyScale).to_string(),
        "company_scale has no answer yet"
    );
    assert_eq!(
        Refusal::NotAvailable {
            action: Action::Submit,
            step: Step::Done
        }
        .to_string(),
        "submit is not available at done"
    );
}
