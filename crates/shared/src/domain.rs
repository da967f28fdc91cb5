use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResponseId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

const YEAR_DEBT_OPTIONS: &[&str] = &[
    "2000 ve öncesi",
    "2001-2005 arası",
    "2006-2010 arası",
    "2011-2015 arası",
    "2016-2020 arası",
    "2020-2024 arası",
];

const COMPANY_SCALE_OPTIONS: &[&str] = &[
    "Mikro ölçekli işletme (1-9 çalışan)",
    "Küçük ölçekli işletme (10-49 çalışan)",
    "Orta ölçekli işletme (50-250 çalışan)",
    "Büyük ölçekli işletme (250 üzeri çalışan)",
];

const DEBT_AMOUNT_OPTIONS: &[&str] = &[
    "0-1 milyon TL",
    "1-5 milyon TL",
    "5-10 milyon TL",
    "10-50 milyon TL",
    "50 milyon TL ve üzeri",
    "Belirtmek istemiyorum",
];

const MARKET_SERVED_OPTIONS: &[&str] = &[
    "Sadece yurtiçi pazara hizmet veriyorum",
    "Ağırlıklı olarak yurtiçi pazara, kısmen yurtdışı pazara hizmet veriyorum",
    "Hem yurtiçi hem yurtdışı pazarlara eşit oranda hizmet veriyorum",
    "Ağırlıklı olarak yurtdışı pazara, kısmen yurtiçi pazara hizmet veriyorum",
    "Sadece yurtdışı pazara hizmet veriyorum",
];

/// The four survey questions, in the order they are asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Question {
    YearDebt,
    CompanyScale,
    DebtAmount,
    MarketServed,
}

impl Question {
    pub const ALL: [Question; 4] = [
        Question::YearDebt,
        Question::CompanyScale,
        Question::DebtAmount,
        Question::MarketServed,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        match self {
            Question::YearDebt => 0,
            Question::CompanyScale => 1,
            Question::DebtAmount => 2,
            Question::MarketServed => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    pub fn previous(self) -> Option<Self> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }

    /// Column name used for storage and export.
    pub fn key(self) -> &'static str {
        match self {
            Question::YearDebt => "year_debt",
            Question::CompanyScale => "company_scale",
            Question::DebtAmount => "debt_amount",
            Question::MarketServed => "market_served",
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            Question::YearDebt => "A. Firmanızın en çok borçlandığı yıl hangisidir?",
            Question::CompanyScale => {
                "B. Firmanızın borçlu olduğu işletme en çok hangi ölçektedir?"
            }
            Question::DebtAmount => "C. Firmanızın borç oranı nedir?",
            Question::MarketServed => "D. Firmanız ağırlıklı olarak hangi pazarlara hizmet veriyor?",
        }
    }

    pub fn options(self) -> &'static [&'static str] {
        match self {
            Question::YearDebt => YEAR_DEBT_OPTIONS,
            Question::CompanyScale => COMPANY_SCALE_OPTIONS,
            Question::DebtAmount => DEBT_AMOUNT_OPTIONS,
            Question::MarketServed => MARKET_SERVED_OPTIONS,
        }
    }

    /// Resolves a raw value to the canonical option it names, if any.
    pub fn option(self, value: &str) -> Option<&'static str> {
        self.options()
            .iter()
            .copied()
            .find(|option| *option == value)
    }
}

/// A fully answered survey, fields in storage order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyAnswers {
    pub year_debt: String,
    pub company_scale: String,
    pub debt_amount: String,
    pub market_served: String,
}

impl SurveyAnswers {
    pub fn get(&self, question: Question) -> &str {
        match question {
            Question::YearDebt => &self.year_debt,
            Question::CompanyScale => &self.company_scale,
            Question::DebtAmount => &self.debt_amount,
            Question::MarketServed => &self.market_served,
        }
    }

    pub fn as_row(&self) -> [&str; Question::COUNT] {
        Question::ALL.map(|question| self.get(question))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyResponse {
    pub response_id: ResponseId,
    pub answers: SurveyAnswers,
    pub submitted_at: DateTime<Utc>,
}
