use anyhow::Result;
use clap::Parser;
use shared::domain::Question;
use storage::Storage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use wizard::{Refusal, SubmitError, Wizard};

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = storage::DEFAULT_DATABASE_URL)]
    database_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// 1-based option number for the current question.
    Select(usize),
    Clear,
    Next,
    Back,
    Submit,
    Restart,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    match line.to_lowercase().as_str() {
        "0" => return Some(Command::Clear),
        "n" => return Some(Command::Next),
        "b" => return Some(Command::Back),
        "s" => return Some(Command::Submit),
        "r" => return Some(Command::Restart),
        "q" => return Some(Command::Quit),
        _ => {}
    }
    line.parse::<usize>()
        .ok()
        .filter(|number| *number > 0)
        .map(Command::Select)
}

fn render(wizard: &Wizard) -> String {
    let mut out = format!(
        "\n== Şirket Borç Durumu Anketi ==\n{}% tamamlandı\n",
        wizard.percent_complete()
    );
    let Some(question) = wizard.current_question() else {
        out.push_str("Teşekkürler! Cevabınız kaydedildi.\n");
        out.push_str("r: Yeni Anket Doldurmak İçin Başla | q: çıkış\n");
        return out;
    };

    out.push_str(question.prompt());
    out.push('\n');
    let selected = wizard.answer(question);
    for (number, option) in question.options().iter().enumerate() {
        let marker = if selected == Some(*option) { '*' } else { ' ' };
        out.push_str(&format!(" {marker}{}. {option}\n", number + 1));
    }
    match selected {
        Some(answer) => out.push_str(&format!("Seçtiğiniz: {answer}\n")),
        None => out.push_str("Lütfen bir seçenek belirleyiniz.\n"),
    }

    let mut keys = vec!["0: temizle"];
    if wizard.can_retreat() {
        keys.push("b: Geri");
    }
    if question.next().is_some() {
        keys.push("n: Devam");
    } else {
        keys.push("s: Gönder");
    }
    keys.push("q: çıkış");
    out.push_str(&keys.join(" | "));
    out.push('\n');
    out
}

fn option_for(question: Question, number: usize) -> Option<&'static str> {
    number
        .checked_sub(1)
        .and_then(|index| question.options().get(index).copied())
}

fn refusal_message(refusal: &Refusal) -> String {
    match refusal {
        Refusal::Unanswered(_) => "Lütfen bir seçenek belirleyin.".to_string(),
        Refusal::NotAvailable { .. } => format!("Bu adımda kullanılamaz ({refusal})."),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();
    let args = Args::parse();

    let database_url = storage::normalize_database_url(&args.database_url);
    let storage = Storage::new(&database_url).await?;
    info!(%database_url, "survey storage ready");

    let mut wizard = Wizard::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print!("{}", render(&wizard));

    while let Some(line) = lines.next_line().await? {
        let Some(command) = parse_command(&line) else {
            println!("Geçersiz komut: {}", line.trim());
            continue;
        };

        let outcome = match command {
            Command::Quit => break,
            Command::Select(number) => match wizard.current_question() {
                Some(question) if option_for(question, number).is_none() => {
                    println!("Geçersiz seçenek: {number}");
                    continue;
                }
                Some(question) => wizard.select(option_for(question, number)).map(|_| ()),
                None => wizard.select(None).map(|_| ()),
            },
            Command::Clear => wizard.select(None).map(|_| ()),
            Command::Next => wizard.advance().map(|_| ()),
            Command::Back => wizard.retreat().map(|_| ()),
            Command::Restart => wizard.restart().map(|_| ()),
            Command::Submit => match wizard.submit(&storage).await {
                Ok(response_id) => {
                    info!(response_id = response_id.0, "survey submitted");
                    Ok(())
                }
                Err(SubmitError::Refused(refusal)) => Err(refusal),
                Err(SubmitError::Persist(err)) => {
                    error!(error = %format!("{err:#}"), "survey submission could not be stored");
                    println!("Cevabınız kaydedilemedi, lütfen tekrar deneyin.");
                    continue;
                }
            },
        };

        if let Err(refusal) = outcome {
            warn!(%refusal, "survey action refused");
            println!("{}", refusal_message(&refusal));
        }
        print!("{}", render(&wizard));
    }

    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
