use crate::model::{BatchRequest, ChatMessage, RequestBody};
use crate::tuples::Tuple;

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are an expert annotator specializing in Best-Worst Scaling of German texts based on quantity information about animal occurrences.";
pub const DEFAULT_TASK_INSTRUCTION: &str = "Task: From the following German texts about animal occurrence, identify:\n- Best: The text conveying the highest quantity (e.g., presence, frequency, population size)\n- Worst: The text conveying the lowest quantity\nDo not explain your answer, just answer with the text numbers in the following json format.";
pub const ANSWER_FORMAT: &str = "{\n  \"Best\": [Text Number],\n  \"Worst\": [Text Number]\n}";
pub const CUSTOM_ID_PREFIX: &str = "tuple";

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub system_instruction: String,
    pub task_instruction: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            task_instruction: DEFAULT_TASK_INSTRUCTION.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestSettings {
    pub model: String,
    pub api_url: String,
    pub max_tokens: u32,
    pub template: PromptTemplate,
}

pub fn build_prompt(tuple: &Tuple, template: &PromptTemplate) -> String {
    let mut prompt = template.task_instruction.trim_end().to_string();
    prompt.push('\n');

    for (index, text) in tuple.texts.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", index + 1, text));
    }

    prompt.push_str("\nJSON format for your answer:\n");
    prompt.push_str(ANSWER_FORMAT);
    prompt.push('\n');
    prompt
}

pub fn request_custom_id(tuple: &Tuple) -> String {
    format!("{CUSTOM_ID_PREFIX}-{}", tuple.custom_id)
}

pub fn build_request(tuple: &Tuple, settings: &RequestSettings) -> BatchRequest {
    BatchRequest {
        custom_id: request_custom_id(tuple),
        method: "POST".to_string(),
        url: settings.api_url.clone(),
        body: RequestBody {
            model: settings.model.clone(),
            messages: vec![
                ChatMessage::system(settings.template.system_instruction.clone()),
                ChatMessage::user(build_prompt(tuple, &settings.template)),
            ],
            max_tokens: Some(settings.max_tokens),
            stream: false,
        },
    }
}
