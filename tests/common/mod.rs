#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use table_templater::{ChatMessage, InferenceClient, TemplateError};

/// In-process inference client that replays canned completions in order and
/// records every request it receives.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    replies: VecDeque<Result<String, TemplateError>>,
    pub requests: Vec<Vec<ChatMessage>>,
}

impl ScriptedClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: replies.into_iter().map(|reply| Ok(reply.into())).collect(),
            requests: Vec::new(),
        }
    }

    pub fn then_fail(mut self) -> Self {
        self.replies.push_back(Err(TemplateError::InferenceEmpty));
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.len()
    }
}

impl InferenceClient for ScriptedClient {
    fn complete(
        &mut self,
        messages: &[ChatMessage],
        _temperature: f32,
    ) -> Result<String, TemplateError> {
        self.requests.push(messages.to_vec());
        self.replies
            .pop_front()
            .unwrap_or(Err(TemplateError::InferenceEmpty))
    }
}

pub const VOCABULARY: &str = "applicant_name: the person's full name\n\
phone: a contact telephone number\n\
signer: the name of whoever signed the form\n";

pub const NAME_AGE_FIELDS: &str = r#"<json>[
  {"label": "Name", "value": "John", "position": [0, 1]},
  {"label": "Age", "value": "30", "position": [1, 1]}
]</json>"#;

pub const NAME_AGE_MATCHES: &str = r#"Here is the mapping:
<json>[
  {"old_key": "Name", "value": "John", "new_key": "applicant_name"},
  {"old_key": "Age", "value": "30", "new_key": ""}
]</json>"#;

pub const FORM_HTML: &str = r"<!DOCTYPE html>
<html><head><meta charset='utf-8'><title>Form</title></head><body>
<p>Application</p>
<table>
  <tr><td>Name</td><td>John</td></tr>
  <tr><td>Age</td><td>30</td></tr>
</table>
<table>
  <tr><td>Contact</td><td>
    <table><tr><td>Phone</td><td><span>555-0100</span></td></tr></table>
  </td></tr>
</table>
</body></html>
";

pub fn write_vocabulary(dir: &Path) -> PathBuf {
    let path = dir.join("vocabulary.txt");
    std::fs::write(&path, VOCABULARY).expect("vocabulary should be written");
    path
}

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("fixture should be written");
    path
}
