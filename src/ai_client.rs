//! Chat-completions client for caption classification and text extraction
//!
//! Backs the three mining collaborators with an OpenAI-compatible endpoint:
//! - caption classification: `"{category} : {caption}"` answered with 1 or 0
//! - explanation extraction: the scoring-criteria text, or 0
//! - study index extraction: a JSON object `{"index": [...]}`
//!
//! Calls are blocking; the mining core runs on blocking worker threads.

use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MinerError, Result};
use crate::oracle::{ClassificationOracle, ExplanationExtractor, IndexExtractor, NO_EXPLANATION};
use crate::settings::LlmSettings;

const CLASSIFY_PROMPT: &str = r#"You are an expert in analyzing meta-analysis articles. You will receive a string input in the following format:
    {type_of_table_required} : {given table's title}
You need to determine if the {given table's title} belongs to the {type_of_table_required} category. If it does, return 1; otherwise, return 0. You can only choose between {1, 0}.
Do not generate any explanation, only return 1 or 0.
Examples:
    Input: Quality Assessment : eTable 4. Quality Score of Included Studies
    Output: 1

    Input: Quality Assessment : eTable 1: Assessment of quality of studies using the Newcastle-Ottawa scale
    Output: 1

    Input: Quality Assessment : eTable 2. Risk of bias assessment of included randomized controlled trials using the Cochrane risk of bias tool 2
    Output: 0

    Input: Quality Assessment : eTable 1 Characteristics of eligible studies and quality assessment
    Output: 1

    Input: Search Strategy : eTable 1. Systematic Review Search Strategy
    Output: 1

    Input: Search Strategy : eFigure 1. PRISMA flow chart of study selection
    Output: 0"#;

const SCREEN_PROMPT: &str = r#"You are an expert in analyzing meta-analysis articles. You will receive a string input in the following format:
    {type_of_table_required} : {first page of a supplementary file}
The first page usually lists the captions of every table and figure in the file. Judge whether the file contains a table of the {type_of_table_required} category. Return 1 if it does, otherwise return 0. You can only choose between {1, 0}.
Risk of bias cannot be regarded as quality assessment. Do not generate any explanation, only return 1 or 0.
Examples:
    Input: Quality Assessment : Supplementary Online Content eTable 1. Systematic Review Search Strategy eTable 4. Quality Score of Included Studies eFigure 1. Systematic Search and Selection of Eligible Literature
    Output: 1

    Input: Search Strategy : Supplementary Online Content eTable 1. Risk of bias of included trials eFigure 1. Funnel plot
    Output: 0"#;

const EXPLANATION_PROMPT: &str = r#"You are an expert in analyzing meta-analysis articles. The following information is a table with its explanation.
Return the explanation of the scoring criteria used in the table. If there is no explanation, return 0 only.
Examples:
    Input:
        Author S1 S2 S3 S4 C1 C2 O1 O2 O3 Score Wong et al * * * * * 5 Brady et al * * * * * 5
        aQuality of studies judged on the basis of- representativeness of the exposed cohort (S1); selection of the non-exposed cohort (S2); ascertainment of exposure (S3); comparability (C1 and C2); assessment of outcome (E1)
    Output:
        aQuality of studies judged on the basis of- representativeness of the exposed cohort (S1); selection of the non-exposed cohort (S2); ascertainment of exposure (S3); comparability (C1 and C2); assessment of outcome (E1)

    Input:
        Kenyon KR. 1989 R, NC, CA CLAU 26 30.8±15 18±11.9 4
        C: comparative; CA: case series; CLAU: conjunctival limbal autograft; NC: non-comparative; R: retrospective
    Output:
        C: comparative; CA: case series; CLAU: conjunctival limbal autograft; NC: non-comparative; R: retrospective

    Input:
        eTable 1: Assessment of quality of studies using the Newcastle-Ottawa scale
        Author S1 S2 S3 S4 C1 C2 O1 O2 O3 Score Wong et al * * * * * 5 Brady et al * * * * * 5
    Output: 0"#;

const INDEX_PROMPT: &str = r#"You are particularly good at conducting meta-analysis on medicine articles.
Based on the provided passage of a meta-analysis, find the citation numbers of all included studies.
Output them in a JSON object. The JSON object must include an "index" field.

Example:
{"index": [1, 2, 3, 4]}"#;

/// OpenAI-compatible request format
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndexAnswer {
    index: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct ChatClient {
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    http: OnceLock<reqwest::blocking::Client>,
}

impl ChatClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout: Duration::from_secs(timeout_secs),
            http: OnceLock::new(),
        }
    }

    /// Client for the configured backend, or `None` without an API key
    pub fn from_settings(llm: &LlmSettings, timeout_secs: u64) -> Option<Self> {
        let key = llm.api_key.as_deref().filter(|k| !k.is_empty())?;
        Some(Self::new(key, &llm.base_url, &llm.model, timeout_secs))
    }

    /// Shared blocking client, built on first use from a blocking thread
    fn http(&self) -> Result<&reqwest::blocking::Client> {
        if let Some(client) = self.http.get() {
            return Ok(client);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;
        Ok(self.http.get_or_init(|| client))
    }

    /// One system + user exchange at temperature 0
    fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http()?
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(MinerError::Oracle(format!("chat API error {}: {}", status, body)));
        }

        let api_response: ChatResponse = response.json()?;
        let answer = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| MinerError::Oracle("empty chat response".to_string()))?;
        debug!(model = %self.model, answer_len = answer.len(), "chat completion");
        Ok(answer)
    }
}

/// Read a 1/0 classification answer; the last digit of the answer decides
pub fn parse_binary_answer(answer: &str) -> Result<bool> {
    match answer.trim().chars().rev().find(|c| *c == '0' || *c == '1') {
        Some('1') => Ok(true),
        Some(_) => Ok(false),
        None => Err(MinerError::Oracle(format!("unexpected classification answer: {:?}", answer))),
    }
}

/// Strip a surrounding markdown code fence, if any
fn unfence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Read a `{"index": [...]}` answer
pub fn parse_index_answer(answer: &str) -> Result<Vec<usize>> {
    let parsed: IndexAnswer = serde_json::from_str(unfence(answer))?;
    Ok(parsed.index)
}

impl ClassificationOracle for ChatClient {
    fn classify(&self, category_label: &str, candidate_caption: &str) -> Result<bool> {
        let input = format!("{} : {}", category_label, candidate_caption);
        parse_binary_answer(&self.complete(CLASSIFY_PROMPT, &input)?)
    }

    fn screen_document(&self, category_label: &str, first_page_text: &str) -> Result<bool> {
        let input = format!("{} : {}", category_label, first_page_text);
        parse_binary_answer(&self.complete(SCREEN_PROMPT, &input)?)
    }
}

impl ExplanationExtractor for ChatClient {
    fn extract_explanation(&self, page_text: &str) -> Result<String> {
        let answer = self.complete(EXPLANATION_PROMPT, page_text)?;
        let answer = unfence(&answer);
        if answer.is_empty() {
            return Ok(NO_EXPLANATION.to_string());
        }
        Ok(answer.to_string())
    }
}

impl IndexExtractor for ChatClient {
    fn extract_indices(&self, paragraph_text: &str) -> Result<Vec<usize>> {
        parse_index_answer(&self.complete(INDEX_PROMPT, paragraph_text)?)
    }
}
