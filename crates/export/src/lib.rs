//! Password-gated export of stored survey responses to an `.xlsx` workbook.

use rust_xlsxwriter::{Format, RowNum, Workbook, XlsxError};
use shared::{
    domain::{Question, SurveyResponse},
    protocol::ResponseTableView,
};
use thiserror::Error;
use tracing::{info, warn};

pub const SHEET_NAME: &str = "Responses";
pub const FILE_NAME: &str = "poll_responses.xlsx";
pub const XLSX_MIME_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("invalid username or password")]
    Unauthorized,
    #[error("failed to render workbook: {0}")]
    Workbook(#[from] XlsxError),
}

#[derive(Clone)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl AdminCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn verify(&self, username: &str, password: &str) -> Result<(), ExportError> {
        let username_ok = self.username == username;
        let password_ok = self.password == password;
        if username_ok && password_ok {
            info!(username, "export credentials accepted");
            Ok(())
        } else {
            warn!(username, "export credentials rejected");
            Err(ExportError::Unauthorized)
        }
    }
}

/// Stored responses projected onto the four answer columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseTable {
    rows: Vec<[String; Question::COUNT]>,
}

impl ResponseTable {
    pub fn from_responses(responses: &[SurveyResponse]) -> Self {
        let rows = responses
            .iter()
            .map(|response| response.answers.as_row().map(str::to_string))
            .collect();
        Self { rows }
    }

    pub fn columns() -> [&'static str; Question::COUNT] {
        Question::ALL.map(Question::key)
    }

    pub fn rows(&self) -> &[[String; Question::COUNT]] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl From<ResponseTable> for ResponseTableView {
    fn from(table: ResponseTable) -> Self {
        Self {
            columns: ResponseTable::columns().map(str::to_string).to_vec(),
            rows: table.rows.into_iter().map(|row| row.to_vec()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportedWorkbook {
    pub file_name: &'static str,
    pub mime_type: &'static str,
    pub row_count: usize,
    pub bytes: Vec<u8>,
}

/// Writes a header row followed by one row per response.
pub fn render_workbook(table: &ResponseTable) -> Result<ExportedWorkbook, ExportError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME)?;
        for (col, column) in ResponseTable::columns().iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *column, &header)?;
        }
        for (index, row) in table.rows().iter().enumerate() {
            let row_num =
                RowNum::try_from(index + 1).map_err(|_| XlsxError::RowColumnLimitError)?;
            for (col, value) in row.iter().enumerate() {
                sheet.write_string(row_num, col as u16, value.as_str())?;
            }
        }
        sheet.autofit();
    }

    let bytes = workbook.save_to_buffer()?;
    Ok(ExportedWorkbook {
        file_name: FILE_NAME,
        mime_type: XLSX_MIME_TYPE,
        row_count: table.len(),
        bytes,
    })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
