//! SGR Converter (C9): plain-text scenario authoring through a 3-stage LLM
//! chain (extract intents → gate & critique → tools & templates), a
//! deterministic assembler and a static validator, grounded file-for-file in
//! `examples/original_source/chat_app/sgr/langchain_chain/pipeline.py` (the
//! three system prompts below are ported verbatim) and `.../converter.py`.
//!
//! Every conversion writes a per-trace JSON bundle under
//! `{sgr.trace_dir}/<trace_id>/`, mirroring the Python original's file
//! layout: `00_convert_request.json`, `{01|02|03}_<step>.{request,response}.json`,
//! `98_error.json` on failure, `99_convert_result.json` and `trace_bundle.json`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use sa_domain::error::{Error, Result, SgrErrorPayload};
use sa_domain::model::ToolSpec;
use sa_domain::trace::TraceEvent;
use sa_providers::{ChatMessage, ModelRole};

use crate::state::AppState;

use super::assemble::assemble_scenario;
use super::models::{step1_schema, step2_schema, step3_schema, Step1ExtractIntents, Step2GateAndCritique, Step3ToolsAndTemplates};
use super::text::{clean_text, extract_tool_refs, filter_questions, looks_like_condition_check_intent};
use super::validate::{validate_scenario_or_raise, validate_templates};

#[derive(Debug, Deserialize)]
pub struct SgrConvertRequest {
    pub text: String,
    #[serde(default)]
    pub name_hint: Option<String>,
    #[serde(default = "default_strict")]
    pub strict: bool,
    #[serde(default)]
    pub return_diagnostics: bool,
}

fn default_strict() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct SgrConvertResponse {
    pub scenario: sa_domain::model::ScenarioDefinition,
    pub diagnostics: Value,
    pub questions: Vec<String>,
}

fn new_trace_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..10].to_string()
}

fn write_json_file(path: &Path, value: &Value) {
    match std::fs::File::create(path) {
        Ok(file) => {
            if let Err(e) = serde_json::to_writer_pretty(file, value) {
                tracing::warn!(path = %path.display(), error = %e, "failed to write SGR trace file");
            }
        }
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to create SGR trace file"),
    }
}

struct StepFailure {
    message: String,
    raw: String,
}

/// One LLM call in the chain: writes its own request/response trace files,
/// retries across configured keys on rate limit (handled inside
/// `AppState::llm`), and enforces the configured SGR timeout.
async fn call_llm_step<T: serde::de::DeserializeOwned>(
    state: &AppState,
    trace_dir: &Path,
    step: &str,
    system: &str,
    user: &str,
    schema: &Value,
) -> std::result::Result<(T, String, Value), StepFailure> {
    let started = Instant::now();
    let req_path = trace_dir.join(format!("{step}.request.json"));
    let resp_path = trace_dir.join(format!("{step}.response.json"));
    let model = state.config.llm.sgr_model().to_string();
    let timeout_s = state.config.sgr.timeout_s;

    let req_payload = json!({
        "model": model,
        "timeout_s": timeout_s,
        "messages": [
            {"role": "system", "content": system},
            {"role": "user", "content": user},
        ],
    });
    write_json_file(&req_path, &req_payload);
    if state.config.sgr.log_prompts {
        tracing::info!(step, request_path = %req_path.display(), "sgr_step_start");
    }

    let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
    let call = state.llm.chat_json(&messages, schema, step, 0.0, ModelRole::Sgr, Some(&model));

    let raw_value = match tokio::time::timeout(Duration::from_secs(timeout_s), call).await {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => return Err(StepFailure { message: e.to_string(), raw: String::new() }),
        Err(_) => return Err(StepFailure { message: format!("timed out after {timeout_s}s"), raw: String::new() }),
    };

    let parsed: T = serde_json::from_value(raw_value.clone())
        .map_err(|e| StepFailure { message: e.to_string(), raw: raw_value.to_string() })?;

    let resp_payload = json!({"raw": raw_value, "parsed_json": raw_value});
    write_json_file(&resp_path, &resp_payload);
    if state.config.sgr.log_prompts {
        tracing::info!(step, duration_s = started.elapsed().as_secs_f64(), response_path = %resp_path.display(), "sgr_step_end");
    }

    let step_trace = json!({
        "step": step,
        "duration_s": started.elapsed().as_secs_f64(),
        "model": model,
        "request_path": req_path.display().to_string(),
        "response_path": resp_path.display().to_string(),
    });
    Ok((parsed, raw_value.to_string(), step_trace))
}

fn sgr_fail(
    trace_dir: &Path,
    trace_id: &str,
    failed_step: &str,
    diagnostics: Value,
    last_llm_raw: String,
) -> Error {
    write_json_file(&trace_dir.join("98_error.json"), &json!({"trace_id": trace_id, "failed_step": failed_step, "diagnostics": diagnostics}));
    Error::SgrConversion(Box::new(SgrErrorPayload {
        trace_id: trace_id.to_string(),
        failed_step: failed_step.to_string(),
        diagnostics,
        last_llm_raw,
    }))
}

/// Convert free-text scenario authoring into a [`ScenarioDefinition`].
pub async fn convert(state: &AppState, request: SgrConvertRequest) -> Result<SgrConvertResponse> {
    let trace_id = new_trace_id();
    let trace_dir = PathBuf::from(&state.config.sgr.trace_dir).join(&trace_id);
    if let Err(e) = std::fs::create_dir_all(&trace_dir) {
        tracing::warn!(trace_id = %trace_id, error = %e, "failed to create SGR trace directory");
    }

    let tool_specs: Vec<ToolSpec> = state.tools.specs();
    let tool_names: HashSet<&str> = tool_specs.iter().map(|t| t.name.as_str()).collect();
    let tool_spec_summaries: Vec<Value> = tool_specs
        .iter()
        .map(|t| {
            let mut fields: Vec<&str> = t
                .output_schema
                .get("properties")
                .and_then(|p| p.as_object())
                .map(|props| props.keys().map(String::as_str).collect())
                .unwrap_or_default();
            fields.sort_unstable();
            json!({"name": t.name, "description": t.description, "output_fields": fields})
        })
        .collect();

    let trace_input = json!({
        "trace_id": trace_id,
        "text": request.text,
        "name_hint": request.name_hint,
        "strict": request.strict,
        "return_diagnostics": request.return_diagnostics,
        "model": state.config.llm.sgr_model(),
        "base_url": state.config.llm.base_url,
        "timeout_s": state.config.sgr.timeout_s,
        "available_tools": tool_spec_summaries,
    });
    write_json_file(&trace_dir.join("00_convert_request.json"), &trace_input);

    let mut llm_steps: Vec<Value> = Vec::new();

    // ── Step 1: normalize + extract intents ─────────────────────────────
    let s1_system = "Ты — конвертер SGR (plain text -> атомарные намерения).\n\
Задача: 1) нормализовать вход (без потери смысла), 2) выделить атомарные намерения изменить поведение агента.\n\
Требования:\n\
- 1 намерение = 1 intent.text (не склеивай через \\n).\n\
- Пиши как инструкции агенту в повелительном наклонении (например: \"Скажи привет\").\n\
- Не придумывай факты/инструменты.\n\
- Не добавляй намерения вида \"Определить/Проверить ...\" если это просто проверка условия по словам пользователя.\n\
- Не добавляй эмодзи.\n\
- questions добавляй только если без уточнения НЕЛЬЗЯ построить сценарий; не задавай вопросы типа \"как определить\".\n\
Верни СТРОГО JSON-объект формата:\n\
{\n  \"normalized_text\": \"...\",\n  \"intents\": [{\"id\":\"i1\",\"text\":\"...\"}],\n  \"questions\": []\n}\n";
    let s1_user = format!("strict={}\ntext:\n{}\n", request.strict, request.text);

    let mut step1: Step1ExtractIntents = match call_llm_step(state, &trace_dir, "01_extract_intents", s1_system, &s1_user, &step1_schema()).await {
        Ok((parsed, _raw, trace)) => {
            llm_steps.push(trace);
            parsed
        }
        Err(failure) => {
            return Err(sgr_fail(&trace_dir, &trace_id, "01_extract_intents", json!({"llm_steps": llm_steps, "error": failure.message}), failure.raw));
        }
    };
    TraceEvent::SgrTraceWritten { trace_id: trace_id.clone(), step: "01_extract_intents".to_string() }.emit();

    step1.normalized_text = clean_text(&step1.normalized_text);
    for intent in &mut step1.intents {
        intent.text = clean_text(&intent.text);
    }
    step1.questions = filter_questions(&step1.questions);

    // ── Step 2: critique + gating ────────────────────────────────────────
    let s2_system = "Ты — модуль self-critique + gating для SGR.\n\
Задача:\n\
1) Проверь intents на полноту и непересечения относительно original_text.\n\
2) Если нужно — исправь/переформулируй intents (но не добавляй факты).\n\
3) Найди условия применения (если/иначе) и разложи на conditions.\n\
Правила:\n\
- condition_text пиши как понятную фразу для движка (предпочитай: 'Пользователь написал в чат что ...').\n\
- Не добавляй отдельные intents вида \"Определить/Проверить ...\" если это просто проверка condition по словам пользователя.\n\
- questions добавляй только если без уточнения НЕЛЬЗЯ построить сценарий; не задавай вопросы типа \"как определить\".\n\
Верни СТРОГО JSON-объект формата:\n\
{\n  \"intents\": [{\"id\":\"i1\",\"text\":\"...\"}],\n  \"unconditional_intents\": [\"i1\"],\n  \"conditions\": [{\"id\":\"c1\",\"condition_text\":\"...\",\"then_intents\":[\"i1\"],\"else_intents\":[\"i2\"]}],\n  \"questions\": []\n}\n";
    let s2_user = format!(
        "strict={}\noriginal_text:\n{}\n\nnormalized_text:\n{}\n\nintents:\n{}\n",
        request.strict,
        request.text,
        step1.normalized_text,
        serde_json::to_string_pretty(&step1.intents).unwrap_or_default(),
    );

    let mut step2: Step2GateAndCritique = match call_llm_step(state, &trace_dir, "02_gate_and_critique", s2_system, &s2_user, &step2_schema()).await {
        Ok((parsed, _raw, trace)) => {
            llm_steps.push(trace);
            parsed
        }
        Err(failure) => {
            return Err(sgr_fail(&trace_dir, &trace_id, "02_gate_and_critique", json!({"llm_steps": llm_steps, "error": failure.message}), failure.raw));
        }
    };
    TraceEvent::SgrTraceWritten { trace_id: trace_id.clone(), step: "02_gate_and_critique".to_string() }.emit();

    for intent in &mut step2.intents {
        intent.text = clean_text(&intent.text);
    }
    for condition in &mut step2.conditions {
        condition.condition_text = clean_text(&condition.condition_text);
    }
    step2.questions = filter_questions(&step2.questions);
    if !step2.conditions.is_empty() {
        let intent_by_id: std::collections::HashMap<&str, &super::models::Intent> =
            step2.intents.iter().map(|i| (i.id.as_str(), i)).collect();
        step2.unconditional_intents.retain(|iid| {
            intent_by_id
                .get(iid.as_str())
                .map(|intent| !looks_like_condition_check_intent(&intent.text))
                .unwrap_or(false)
        });
    }

    // ── Step 3: knowledge gaps + tools + templates ───────────────────────
    let s3_system = "Ты — модуль knowledge-gap analysis + tool matching + templates для SGR.\n\
Задача:\n\
1) Сматчи на доступные tools (используй ТОЛЬКО имена из available_tools).\n\
2) Если нужного tool нет — добавь в missing_tools (НЕ выдумывай вызов в сценарии).\n\
3) Если текстовые инструкции должны подставлять результаты tool через шаблон {=@tool.field=} — добавь templates.\n\
Правила:\n\
- tools_to_call: только из available_tools.\n\
- templates: каждый шаблон — отдельная инструкция агенту (без эмодзи), не оформляй как markdown.\n\
- target=condition_then/condition_else требует condition_id.\n\
- Не задавай вопросы типа \"как определить\" для условий, которые проверяются по словам пользователя.\n\
Верни СТРОГО JSON-объект формата:\n\
{\n  \"tools_to_call\": [\"get_user_data\"],\n  \"missing_tools\": [{\"name\":\"award_bonus_points\",\"reason\":\"...\",\"input_schema\":{},\"output_schema\":{}}],\n  \"templates\": [{\"id\":\"t1\",\"target\":\"global|condition_then|condition_else\",\"condition_id\":\"c1\",\"text\":\"...\",\"depends_on_tool\":\"get_user_data\"}],\n  \"questions\": []\n}\n";
    let s3_user = format!(
        "strict={}\navailable_tools:\n{}\n\nintents:\n{}\n\nconditions:\n{}\n",
        request.strict,
        serde_json::to_string_pretty(&tool_spec_summaries).unwrap_or_default(),
        serde_json::to_string_pretty(&step2.intents).unwrap_or_default(),
        serde_json::to_string_pretty(&step2.conditions).unwrap_or_default(),
    );

    let mut step3: Step3ToolsAndTemplates = match call_llm_step(state, &trace_dir, "03_tools_and_templates", s3_system, &s3_user, &step3_schema()).await {
        Ok((parsed, _raw, trace)) => {
            llm_steps.push(trace);
            parsed
        }
        Err(failure) => {
            return Err(sgr_fail(&trace_dir, &trace_id, "03_tools_and_templates", json!({"llm_steps": llm_steps, "error": failure.message}), failure.raw));
        }
    };
    TraceEvent::SgrTraceWritten { trace_id: trace_id.clone(), step: "03_tools_and_templates".to_string() }.emit();

    step3.questions = filter_questions(&step3.questions);
    for template in &mut step3.templates {
        template.text = clean_text(&template.text);
    }
    for missing in &mut step3.missing_tools {
        missing.reason = clean_text(&missing.reason);
    }

    // Hard policy: never let the LLM invent a tool name.
    let tools_to_call_before = step3.tools_to_call.clone();
    step3.tools_to_call.retain(|t| tool_names.contains(t.as_str()));
    for template in &mut step3.templates {
        if let Some(dep) = &template.depends_on_tool {
            if !tool_names.contains(dep.as_str()) {
                template.depends_on_tool = None;
            }
        }
    }
    step3.missing_tools.retain(|m| !m.name.trim().is_empty());
    step3.templates.retain(|t| !t.text.trim().is_empty());

    // Ensure every tool referenced via `{=@tool.field=}` (in intents or
    // templates) is actually called, even if the LLM forgot to list it.
    fn add_tool(name: Option<&str>, needed: &mut Vec<String>, seen: &mut HashSet<String>) {
        let Some(name) = name else { return };
        let name = name.trim();
        if name.is_empty() || !seen.insert(name.to_string()) {
            return;
        }
        needed.push(name.to_string());
    }
    let mut needed_tools: Vec<String> = Vec::new();
    let mut seen_tools = HashSet::new();
    for t in step3.tools_to_call.clone() {
        add_tool(Some(t.as_str()), &mut needed_tools, &mut seen_tools);
    }
    for template in &step3.templates {
        add_tool(template.depends_on_tool.as_deref(), &mut needed_tools, &mut seen_tools);
        for t in extract_tool_refs(&template.text) {
            add_tool(Some(t.as_str()), &mut needed_tools, &mut seen_tools);
        }
    }
    for intent in &step2.intents {
        for t in extract_tool_refs(&intent.text) {
            add_tool(Some(t.as_str()), &mut needed_tools, &mut seen_tools);
        }
    }
    step3.tools_to_call = needed_tools.into_iter().filter(|t| tool_names.contains(t.as_str())).collect();

    // ── Step 4: assemble scenario deterministically (no LLM) ─────────────
    let scenario = match assemble_scenario(&trace_id, &request.text, request.name_hint.as_deref(), request.strict, &step2, &step3) {
        Ok(scenario) => scenario,
        Err(e) => {
            return Err(sgr_fail(&trace_dir, &trace_id, "04_assemble_scenario", json!({"llm_steps": llm_steps, "error": e}), String::new()));
        }
    };

    let questions = filter_questions(
        &step1
            .questions
            .iter()
            .chain(step2.questions.iter())
            .chain(step3.questions.iter())
            .cloned()
            .collect::<Vec<_>>(),
    );

    // ── Static validation ─────────────────────────────────────────────────
    let mut diagnostics = json!({"trace_id": trace_id});
    if request.return_diagnostics {
        diagnostics = json!({
            "trace_id": trace_id,
            "llm_steps": llm_steps,
            "strict": request.strict,
            "available_tools": tool_spec_summaries,
            "intermediate": {"step1": &step1, "step2": &step2, "step3": &step3},
            "missing_tools": &step3.missing_tools,
            "transforms": {
                "filter_tools_to_call": {
                    "allowed_tool_names": tool_names.iter().collect::<Vec<_>>(),
                    "before": tools_to_call_before,
                    "after": step3.tools_to_call,
                },
            },
        });
    }

    if let Err(e) = validate_scenario_or_raise(&scenario.code, &request.text) {
        return Err(sgr_fail(&trace_dir, &trace_id, "10_static_validation", json!({"error": e, "previous": diagnostics}), String::new()));
    }
    if request.return_diagnostics {
        let template_refs = validate_templates(&scenario.code, &tool_specs);
        diagnostics["template_refs"] = serde_json::to_value(&template_refs).unwrap_or(Value::Null);
    }

    let final_payload = json!({"scenario": scenario, "diagnostics": diagnostics, "questions": questions});
    write_json_file(&trace_dir.join("99_convert_result.json"), &final_payload);
    write_json_file(
        &trace_dir.join("trace_bundle.json"),
        &json!({"trace_id": trace_id, "input": trace_input, "steps": llm_steps, "final": final_payload}),
    );
    TraceEvent::SgrTraceWritten { trace_id: trace_id.clone(), step: "99_convert_result".to_string() }.emit();

    Ok(SgrConvertResponse { scenario, diagnostics, questions })
}
