use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use export::{render_workbook, ResponseTable};
use shared::domain::{Question, ResponseId, SurveyResponse};
use storage::Storage;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = storage::DEFAULT_DATABASE_URL)]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prints the number of stored responses.
    Count,
    /// Prints every stored response as a tab-separated line.
    List,
    /// Prints one stored response, field by field.
    Show { response_id: i64 },
    /// Writes all stored responses to an xlsx workbook.
    Export {
        #[arg(long, default_value = export::FILE_NAME)]
        output: PathBuf,
    },
}

fn header_line() -> String {
    let mut columns = vec!["response_id", "submitted_at"];
    columns.extend(Question::ALL.map(Question::key));
    columns.join("\t")
}

fn list_line(response: &SurveyResponse) -> String {
    format!(
        "{}\t{}\t{}",
        response.response_id.0,
        response.submitted_at.to_rfc3339(),
        response.answers.as_row().join("\t")
    )
}

async fn show(storage: &Storage, response_id: ResponseId) -> Result<String> {
    let Some(response) = storage.load_response(response_id).await? else {
        bail!("no stored response with id {}", response_id.0);
    };
    let mut out = format!(
        "response_id\t{}\nsubmitted_at\t{}\n",
        response.response_id.0,
        response.submitted_at.to_rfc3339()
    );
    for question in Question::ALL {
        out.push_str(&format!("{}\t{}\n", question.key(), response.answers.get(question)));
    }
    Ok(out)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();
    let cli = Cli::parse();
    let storage = Storage::new(&storage::normalize_database_url(&cli.database_url)).await?;

    match cli.command {
        Command::Count => {
            println!("{}", storage.count_responses().await?);
        }
        Command::List => {
            println!("{}", header_line());
            for response in storage.list_responses().await? {
                println!("{}", list_line(&response));
            }
        }
        Command::Show { response_id } => {
            print!("{}", show(&storage, ResponseId(response_id)).await?);
        }
        Command::Export { output } => {
            let responses = storage.list_responses().await?;
            let workbook = render_workbook(&ResponseTable::from_responses(&responses))?;
            tokio::fs::write(&output, &workbook.bytes)
                .await
                .with_context(|| format!("failed to write {}", output.display()))?;
            info!(rows = workbook.row_count, output = %output.display(), "responses exported");
            println!("exported {} responses to {}", workbook.row_count, output.display());
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
