use {
    serde::{Deserialize, Serialize},
    std::fmt,
};

const PHONE_FORMAT_MESSAGE: &str = "Your phone number format is wrong. Please input with country code, for example like this +46707777777";

/// Field names whose validation problems get the phone-number message.
const PHONE_FIELDS: [&str; 3] = ["Msisdn", "HomePhoneNumber", "WorkPhoneNumber"];

/// Field-level error inside a [`Problem`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Structured error detail returned by the provider (RFC 7807 style).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type", default)]
    pub problem_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub problems: Vec<ProblemItem>,
}

impl Problem {
    /// Message shown to the merchant or shopper when a request was rejected.
    ///
    /// Starts with `detail`, then one `name: description` line per problem.
    /// Any problem on a phone-number field replaces the whole message.
    pub fn error_message(&self) -> String {
        let mut message = self.detail.clone().unwrap_or_default();
        for item in &self.problems {
            if PHONE_FIELDS.iter().any(|field| item.name.contains(field)) {
                return PHONE_FORMAT_MESSAGE.to_string();
            }
            if !message.is_empty() {
                message.push('\n');
            }
            message.push_str(&format!("{}: {}", item.name, item.description));
        }
        message
    }
}

/// `(name) description`, one line per problem.
impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self
            .problems
            .iter()
            .map(|item| format!("({}) {}", item.name, item.description))
            .collect();
        write!(f, "{}", lines.join("\n"))
    }
}
