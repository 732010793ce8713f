use regex::RegexSet;

/// Shown instead of an answer when the gate blocks a query.
pub const REFUSAL_MESSAGE: &str = "**Вопрос отклонён по соображениям безопасности.**\n\n\
Я не могу помогать с обходом KYC/AML, получать инсайдерскую информацию \
или давать гарантии прибыли. Попробуйте переформулировать вопрос.";

/// Patterns are matched against the lower-cased query.
const FORBIDDEN_PATTERNS: &[&str] = &[
    // identity / AML checks
    r"обойти\s+kyc",
    r"обойти\s+верификац",
    r"обойти\s+aml",
    r"bypass\s+(kyc|aml|verification)",
    // insider information
    r"инсайд",
    r"внутренн(ая|ую)\s+информац",
    r"внутренн\w*\s+информац",
    r"insider\s+(info|information|trading)",
    // guaranteed returns
    r"гарантирова[нт]\s+прибыл",
    r"гарантир\w*\s+(прибыл|доход)",
    r"guaranteed\s+(profit|returns?)",
    // defrauding the exchange or its users
    r"обмануть\s+(бирж|систем|пользоват)",
    r"(scam|defraud)\s+(the\s+)?(exchange|users?)",
];

/// Single-shot regex pre-filter for disallowed intents. Conservative:
/// false positives are accepted, nothing outside the list is caught.
pub struct SafetyGate {
    patterns: RegexSet,
}

impl SafetyGate {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            patterns: RegexSet::new(FORBIDDEN_PATTERNS)?,
        })
    }

    #[must_use]
    pub fn is_blocked(&self, query: &str) -> bool {
        self.patterns.is_match(&query.to_lowercase())
    }
}
