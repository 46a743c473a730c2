//! Intent classification.
//!
//! One shared pure function maps a free-text query to an intent plus an
//! extracted parameter bag. Both the HTTP orchestrator and any client-side
//! router go through this module; there is deliberately no second keyword
//! list anywhere else in the codebase.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    DocRag,
    Sql,
    Report,
    Chart,
    ApiStatus,
    Web,
    TransactionQuery,
    TransactionChart,
    TransactionEmail,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::DocRag => "doc_rag",
            Intent::Sql => "sql",
            Intent::Report => "report",
            Intent::Chart => "chart",
            Intent::ApiStatus => "api_status",
            Intent::Web => "web",
            Intent::TransactionQuery => "transaction_query",
            Intent::TransactionChart => "transaction_chart",
            Intent::TransactionEmail => "transaction_email",
            Intent::General => "general",
        }
    }
}

/// Data sources a response may draw from, surfaced to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Source {
    Db,
    Vector,
    Web,
    Api,
    Email,
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: Intent,
    pub confidence: f32,
    pub sources: Vec<Source>,
    pub reasoning: String,
    pub params: Map<String, Value>,
}

const WEB_KEYWORDS: &[&str] = &[
    "search the web",
    "web search",
    "from the web",
    "google",
    "latest news",
    "current news",
    "recent news",
    "breaking news",
    "look up",
    "find online",
    "internet",
];
const EMAIL_KEYWORDS: &[&str] = &["email", "send", "mail"];
const TRANSACTION_KEYWORDS: &[&str] = &[
    "transaction",
    "purchase",
    "refund",
    "payment",
    "client",
    "approved",
    "declined",
    "spending",
];
const CHART_KEYWORDS: &[&str] = &["chart", "plot", "graph", "visualize", "trend", "pattern"];
const API_KEYWORDS: &[&str] = &[
    "api",
    "downstream",
    "health",
    "5xx",
    "4xx",
    "uptime",
    "endpoint",
    "service status",
];
const SQL_KEYWORDS: &[&str] = &[
    "select", "top", "average", "avg", "sum", "count", "merchants", "revenue", "group by",
    "order by",
];
const REPORT_KEYWORDS: &[&str] = &["report", "summary", "breakdown"];
const DOC_KEYWORDS: &[&str] = &[
    "documentation",
    "docs",
    "policy",
    "guide",
    "pdf",
    "explain",
    "how to",
    "what is",
];

/// Spoken queries arrive with number words ("client five"), so the id
/// extractor understands a small word-to-number table.
const WORD_NUMBERS: &[(&str, u64)] = &[
    ("zero", 0),
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
    ("thirteen", 13),
    ("fourteen", 14),
    ("fifteen", 15),
    ("sixteen", 16),
    ("seventeen", 17),
    ("eighteen", 18),
    ("nineteen", 19),
    ("twenty", 20),
    ("thirty", 30),
    ("forty", 40),
    ("fifty", 50),
];

/// Web-fallback policy for the default route: when the best vector
/// similarity comes in below this, downstream consumers fall back to web
/// search. Surfaced in the default IntentResult's params.
pub const WEB_FALLBACK_THRESHOLD: f32 = 0.55;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\w.+-]+@[\w.-]+\.\w{2,}").expect("valid email regex"))
}

fn client_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Digits or a number word directly after "client". The original UI also
    // matched dotted ip-like ids here and concatenated the groups; that
    // looked like a parsing accident and is intentionally not reproduced.
    RE.get_or_init(|| Regex::new(r"client\s*([a-z]+|\d+)").expect("valid client id regex"))
}

fn duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\s*(days|weeks|months)").expect("valid duration regex"))
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| text.contains(kw))
}

/// Extract an email address from the query, if any.
pub fn extract_email(query: &str) -> Option<String> {
    email_regex()
        .find(&query.to_lowercase())
        .map(|m| m.as_str().to_string())
}

/// Extract a numeric client id ("client 42", "client five") from the query.
pub fn extract_client_id(query: &str) -> Option<u64> {
    let lowered = query.to_lowercase();
    let captures = client_id_regex().captures(&lowered)?;
    let token = captures.get(1)?.as_str();

    if token.chars().all(|c| c.is_ascii_digit()) {
        return token.parse().ok();
    }

    WORD_NUMBERS
        .iter()
        .find(|(word, _)| *word == token)
        .map(|(_, value)| *value)
}

/// Extract the requested chart type, defaulting to bar.
pub fn extract_chart_type(query: &str) -> &'static str {
    let lowered = query.to_lowercase();
    if lowered.contains("pie") {
        "pie"
    } else if lowered.contains("line") {
        "line"
    } else {
        "bar"
    }
}

/// Classify a query. Pure and deterministic; never fails — unmatched
/// queries get the lowest-confidence default rather than an error.
///
/// Precedence is fixed: web, email, transaction, api status, chart,
/// sql/report, documentation, default. First match wins.
pub fn classify(query: &str) -> IntentResult {
    let lowered = query.to_lowercase();

    // Explicit web-search framing wins outright; "latest news" must never
    // be answered from the document store.
    if contains_any(&lowered, WEB_KEYWORDS) {
        return IntentResult {
            intent: Intent::Web,
            confidence: 0.95,
            sources: vec![Source::Web],
            reasoning: "Query explicitly requests web search or real-time information"
                .to_string(),
            params: Map::new(),
        };
    }

    // Email report: email keywords plus report/transaction framing, or an
    // explicit address in the query.
    let email = extract_email(query);
    let email_framing = contains_any(&lowered, EMAIL_KEYWORDS) || email.is_some();
    let report_framing = contains_any(&lowered, &["report", "transaction"]) || email.is_some();
    if email_framing && report_framing {
        let mut params = Map::new();
        if let Some(address) = email {
            params.insert("email".to_string(), json!(address));
        }
        if let Some(client_id) = extract_client_id(query) {
            params.insert("clientId".to_string(), json!(client_id));
        }
        return IntentResult {
            intent: Intent::TransactionEmail,
            confidence: 0.95,
            sources: vec![Source::Db, Source::Email],
            reasoning: "Query requests an emailed transaction report".to_string(),
            params,
        };
    }

    // Documentation framing ("what is the refund policy?") outranks a lone
    // transaction keyword unless the query names a concrete client.
    let client_id = extract_client_id(query);
    let doc_framed = contains_any(&lowered, DOC_KEYWORDS) && client_id.is_none();

    if contains_any(&lowered, TRANSACTION_KEYWORDS) && !doc_framed {
        let mut params = Map::new();
        if let Some(client_id) = client_id {
            params.insert("clientId".to_string(), json!(client_id));
        }
        if lowered.contains("purchase") {
            params.insert("type".to_string(), json!("PURCHASE"));
        } else if lowered.contains("refund") {
            params.insert("type".to_string(), json!("REFUND"));
        }
        if lowered.contains("approved") {
            params.insert("status".to_string(), json!("APPROVED"));
        } else if lowered.contains("declined") {
            params.insert("status".to_string(), json!("DECLINED"));
        }

        let is_chart = contains_any(&lowered, CHART_KEYWORDS);
        if is_chart {
            params.insert("chartType".to_string(), json!(extract_chart_type(query)));
            return IntentResult {
                intent: Intent::TransactionChart,
                confidence: 0.92,
                sources: vec![Source::Db],
                reasoning: "Query requests a transaction visualization".to_string(),
                params,
            };
        }
        return IntentResult {
            intent: Intent::TransactionQuery,
            confidence: 0.92,
            sources: vec![Source::Db],
            reasoning: "Query asks about transaction data".to_string(),
            params,
        };
    }

    if contains_any(&lowered, API_KEYWORDS) {
        return IntentResult {
            intent: Intent::ApiStatus,
            confidence: 0.9,
            sources: vec![Source::Api],
            reasoning: "Query mentions API health or service status".to_string(),
            params: Map::new(),
        };
    }

    if contains_any(&lowered, CHART_KEYWORDS) {
        let numeric = contains_any(&lowered, SQL_KEYWORDS) || duration_regex().is_match(&lowered);
        let mut params = Map::new();
        params.insert("chartType".to_string(), json!(extract_chart_type(query)));
        return IntentResult {
            intent: Intent::Chart,
            confidence: 0.85,
            sources: vec![if numeric { Source::Db } else { Source::Vector }],
            reasoning: "Query requests a chart or visualization".to_string(),
            params,
        };
    }

    if contains_any(&lowered, SQL_KEYWORDS) {
        let is_report = contains_any(&lowered, REPORT_KEYWORDS);
        return IntentResult {
            intent: if is_report {
                Intent::Report
            } else {
                Intent::Sql
            },
            confidence: 0.88,
            sources: vec![Source::Db],
            reasoning: if is_report {
                "Query requires aggregated reporting from the database".to_string()
            } else {
                "Query contains SQL-like aggregation keywords".to_string()
            },
            params: Map::new(),
        };
    }

    if contains_any(&lowered, DOC_KEYWORDS) {
        return IntentResult {
            intent: Intent::DocRag,
            confidence: 0.8,
            sources: vec![Source::Vector],
            reasoning: "Query asks about documentation or policies".to_string(),
            params: Map::new(),
        };
    }

    let mut params = Map::new();
    params.insert(
        "webFallbackThreshold".to_string(),
        json!(WEB_FALLBACK_THRESHOLD),
    );
    IntentResult {
        intent: Intent::DocRag,
        confidence: 0.6,
        sources: vec![Source::Vector, Source::Web],
        reasoning: format!(
            "No strong signal; defaulting to document retrieval with web fallback below similarity {}",
            WEB_FALLBACK_THRESHOLD
        ),
        params,
    }
}
