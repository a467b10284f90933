//! The three structured-output shapes the SGR chain's LLM steps produce,
//! grounded in `langchain_chain/models.py`'s Pydantic models.

use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Intent {
    pub id: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Step1ExtractIntents {
    #[serde(default)]
    pub normalized_text: String,
    #[serde(default)]
    pub intents: Vec<Intent>,
    #[serde(default)]
    pub questions: Vec<String>,
}

pub fn step1_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "normalized_text": {"type": "string"},
            "intents": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {"id": {"type": "string"}, "text": {"type": "string"}},
                    "required": ["id", "text"],
                    "additionalProperties": false,
                },
            },
            "questions": {"type": "array", "items": {"type": "string"}},
        },
        "required": ["normalized_text", "intents", "questions"],
        "additionalProperties": false,
    })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Condition {
    pub id: String,
    #[serde(default)]
    pub condition_text: String,
    #[serde(default)]
    pub then_intents: Vec<String>,
    #[serde(default)]
    pub else_intents: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Step2GateAndCritique {
    #[serde(default)]
    pub intents: Vec<Intent>,
    #[serde(default)]
    pub unconditional_intents: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub questions: Vec<String>,
}

pub fn step2_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "intents": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {"id": {"type": "string"}, "text": {"type": "string"}},
                    "required": ["id", "text"],
                    "additionalProperties": false,
                },
            },
            "unconditional_intents": {"type": "array", "items": {"type": "string"}},
            "conditions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "condition_text": {"type": "string"},
                        "then_intents": {"type": "array", "items": {"type": "string"}},
                        "else_intents": {"type": "array", "items": {"type": "string"}},
                    },
                    "required": ["id", "condition_text", "then_intents", "else_intents"],
                    "additionalProperties": false,
                },
            },
            "questions": {"type": "array", "items": {"type": "string"}},
        },
        "required": ["intents", "unconditional_intents", "conditions", "questions"],
        "additionalProperties": false,
    })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MissingTool {
    pub name: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub input_schema: serde_json::Value,
    #[serde(default)]
    pub output_schema: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateTarget {
    Global,
    ConditionThen,
    ConditionElse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub target: TemplateTarget,
    #[serde(default)]
    pub condition_id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub depends_on_tool: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Step3ToolsAndTemplates {
    #[serde(default)]
    pub tools_to_call: Vec<String>,
    #[serde(default)]
    pub missing_tools: Vec<MissingTool>,
    #[serde(default)]
    pub templates: Vec<Template>,
    #[serde(default)]
    pub questions: Vec<String>,
}

pub fn step3_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "tools_to_call": {"type": "array", "items": {"type": "string"}},
            "missing_tools": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "reason": {"type": "string"},
                        "input_schema": {"type": "object"},
                        "output_schema": {"type": "object"},
                    },
                    "required": ["name", "reason"],
                    "additionalProperties": false,
                },
            },
            "templates": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "target": {"type": "string", "enum": ["global", "condition_then", "condition_else"]},
                        "condition_id": {"type": "string"},
                        "text": {"type": "string"},
                        "depends_on_tool": {"type": "string"},
                    },
                    "required": ["id", "target", "text"],
                    "additionalProperties": false,
                },
            },
            "questions": {"type": "array", "items": {"type": "string"}},
        },
        "required": ["tools_to_call", "missing_tools", "templates", "questions"],
        "additionalProperties": false,
    })
}
