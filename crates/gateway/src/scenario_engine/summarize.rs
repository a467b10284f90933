//! Summarize-to-imperatives phase (§4.6.5), grounded in `scenario_engine.py`'s
//! `_summarize_scenario_blocks`.
//!
//! Only `raw/agent` blocks participate — those come exclusively from `text`
//! nodes in the map phase; blocks [`super::condition_decide`] already
//! rewrote to `required`/`rule` pass through untouched. Surviving `raw`
//! blocks are grouped by source scenario and compressed by the LLM into at
//! most 8 imperative instructions plus at most 8 judge rules. A model
//! failure, or an empty response, falls back to keeping up to 3 of the
//! original lines verbatim rather than silently dropping the scenario.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::json;

use sa_domain::model::{BlockKind, BlockTarget, ConditionDecision, InstructionBlock, ScenarioDefinition, ToolsContext};
use sa_domain::trace::TraceEvent;
use sa_providers::{ChatMessage, LlmGateway, ModelRole};

use super::condition_decide::ScenarioDecisions;

const SCHEMA_NAME: &str = "summarize_imperatives";
const MAX_ITEMS: usize = 8;
const FALLBACK_LINE_CAP: usize = 3;

fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "agent_imperatives": {"type": "array", "items": {"type": "string"}, "maxItems": MAX_ITEMS},
            "judge_rules": {"type": "array", "items": {"type": "string"}, "maxItems": MAX_ITEMS},
        },
        "required": ["agent_imperatives", "judge_rules"],
        "additionalProperties": false,
    })
}

fn wants_summary(scenario: &ScenarioDefinition) -> bool {
    !matches!(scenario.meta.get("summarize"), Some(serde_json::Value::Bool(false)))
}

/// Whether a scenario's surviving `raw/agent` texts are eligible for
/// LLM summarization this turn, per the §4.6.5 enable policy: a decided
/// `true`/`false` always qualifies; a lone `unknown` or an all-`ignore`
/// group is dropped without ever reaching the LLM (the former already got
/// its `required/agent` followup block from condition-decide, the latter
/// produced nothing); a scenario with no condition nodes at all — or one
/// whose `if` was resolved deterministically, bypassing condition-decide
/// entirely — is unaffected and summarizes as usual.
fn eligible_for_summary(scenario_name: &str, decisions: &ScenarioDecisions) -> bool {
    match decisions.get(scenario_name) {
        Some(ds) if ds.iter().any(|d| matches!(d, ConditionDecision::True | ConditionDecision::False)) => true,
        Some(_) => false, // only `unknown` and/or `ignore` decided, no raw text should summarize
        // No LLM decision touched this scenario this turn: either it has no
        // condition nodes at all, or an `if` was resolved deterministically
        // (§4.6.2's message_index / "first message" phrasings) — both
        // summarize as usual.
        None => true,
    }
}

/// Collapse each scenario's surviving `raw/agent` blocks into at most 8
/// `required/agent` imperatives plus at most 8 `rule/judge` rules, subject
/// to the enable policy above. `applied` is fully recomputed afterwards as
/// the distinct set of scenarios with at least one surviving
/// `required/agent` block, so a scenario whose only condition decided
/// `ignore` — dropped with no replacement — does not linger from the
/// reduce-phase seed.
pub async fn summarize_instructions(
    context: &mut ToolsContext,
    scenarios: &HashMap<String, ScenarioDefinition>,
    llm: &Arc<dyn LlmGateway>,
    decisions: &ScenarioDecisions,
) {
    let mut by_scenario: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, block) in context.instruction_blocks.iter().enumerate() {
        if block.target == BlockTarget::Agent && block.kind == BlockKind::Raw {
            by_scenario.entry(block.source.clone()).or_default().push(i);
        }
    }

    if !by_scenario.is_empty() {
        let tasks = by_scenario.into_iter().map(|(scenario_name, indices)| {
            let scenario = scenarios.get(&scenario_name).cloned();
            let eligible = eligible_for_summary(&scenario_name, decisions);
            let texts: Vec<String> =
                indices.iter().filter_map(|&i| context.instruction_blocks[i].text.clone()).collect();
            let llm = Arc::clone(llm);
            async move {
                let outcome = if eligible {
                    summarize_one(scenario.as_ref(), &texts, &llm).await
                } else {
                    SummarizeOutcome { agent_imperatives: Vec::new(), judge_rules: Vec::new(), used_fallback: false }
                };
                (scenario_name, indices, outcome)
            }
        });

        let outcomes = join_all(tasks).await;

        let mut drop: HashMap<usize, ()> = HashMap::new();
        let mut new_blocks = Vec::new();

        for (scenario_name, indices, outcome) in outcomes {
            TraceEvent::ImperativesSummarized {
                scenario: scenario_name.clone(),
                imperative_count: outcome.agent_imperatives.len(),
                judge_rule_count: outcome.judge_rules.len(),
                used_fallback: outcome.used_fallback,
            }
            .emit();

            for &i in &indices {
                drop.insert(i, ());
            }

            for (n, text) in outcome.agent_imperatives.iter().enumerate() {
                new_blocks.push(InstructionBlock::required_agent(
                    format!("scenario:{scenario_name}:imperative:{n}"),
                    scenario_name.clone(),
                    text.clone(),
                ));
            }
            for (n, text) in outcome.judge_rules.iter().enumerate() {
                new_blocks.push(InstructionBlock::rule_judge(
                    format!("scenario:{scenario_name}:judge_rule:{n}"),
                    scenario_name.clone(),
                    text.clone(),
                ));
            }
        }

        context.instruction_blocks = context
            .instruction_blocks
            .drain(..)
            .enumerate()
            .filter(|(i, _)| !drop.contains_key(i))
            .map(|(_, b)| b)
            .collect();
        context.instruction_blocks.extend(new_blocks);
    }

    let mut surviving: Vec<String> = context
        .instruction_blocks
        .iter()
        .filter(|b| b.target == BlockTarget::Agent && b.kind == BlockKind::Required)
        .map(|b| b.source.clone())
        .collect();
    surviving.sort();
    surviving.dedup();
    context.applied = surviving
        .into_iter()
        .map(|name| sa_domain::model::AppliedEntry { kind: "scenario".to_string(), name })
        .collect();
}

struct SummarizeOutcome {
    agent_imperatives: Vec<String>,
    judge_rules: Vec<String>,
    used_fallback: bool,
}

async fn summarize_one(
    scenario: Option<&ScenarioDefinition>,
    texts: &[String],
    llm: &Arc<dyn LlmGateway>,
) -> SummarizeOutcome {
    if scenario.map(|s| !wants_summary(s)).unwrap_or(false) {
        return fallback(texts);
    }

    let system = ChatMessage::system(
        "Сожми инструкции сценария диалога в не более 8 кратких повелительных команд для ассистента \
         (agent_imperatives) и не более 8 правил для проверяющего (judge_rules), не теряя ключевых требований.",
    );
    let user = ChatMessage::user(texts.join("\n"));

    match llm.chat_json(&[system, user], &schema(), SCHEMA_NAME, 0.2, ModelRole::Summary, None).await {
        Ok(value) => {
            let agent_imperatives = string_array(&value, "agent_imperatives");
            let judge_rules = string_array(&value, "judge_rules");
            if agent_imperatives.is_empty() && judge_rules.is_empty() {
                fallback(texts)
            } else {
                SummarizeOutcome {
                    agent_imperatives: agent_imperatives.into_iter().take(MAX_ITEMS).collect(),
                    judge_rules: judge_rules.into_iter().take(MAX_ITEMS).collect(),
                    used_fallback: false,
                }
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "imperative summarization call failed, using fallback");
            fallback(texts)
        }
    }
}

fn string_array(value: &serde_json::Value, field: &str) -> Vec<String> {
    value
        .get(field)
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).map(str::to_string).collect())
        .unwrap_or_default()
}

fn fallback(texts: &[String]) -> SummarizeOutcome {
    SummarizeOutcome {
        agent_imperatives: texts.iter().take(FALLBACK_LINE_CAP).cloned().collect(),
        judge_rules: Vec::new(),
        used_fallback: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sa_domain::error::Result;

    struct StubGateway {
        reply: serde_json::Value,
    }

    #[async_trait]
    impl LlmGateway for StubGateway {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _temperature: f32,
            _role: ModelRole,
            _model_override: Option<&str>,
        ) -> Result<String> {
            Ok(String::new())
        }

        async fn chat_json(
            &self,
            _messages: &[ChatMessage],
            _schema: &serde_json::Value,
            _schema_name: &str,
            _temperature: f32,
            _role: ModelRole,
            _model_override: Option<&str>,
        ) -> Result<serde_json::Value> {
            Ok(self.reply.clone())
        }
    }

    fn scenario(name: &str, summarize: Option<bool>) -> ScenarioDefinition {
        let mut meta = HashMap::new();
        if let Some(flag) = summarize {
            meta.insert("summarize".to_string(), serde_json::json!(flag));
        }
        ScenarioDefinition { name: name.to_string(), code: vec![], meta, enabled: true, summary: None, admin_message: None }
    }

    fn raw(id: &str, source: &str, text: &str) -> InstructionBlock {
        InstructionBlock::raw_agent(id, source, text)
    }

    #[tokio::test]
    async fn multi_block_scenario_collapses_to_imperatives_and_rules() {
        let llm: Arc<dyn LlmGateway> = Arc::new(StubGateway {
            reply: json!({
                "agent_imperatives": ["Greet warmly and ask about their day."],
                "judge_rules": ["The answer must greet the user by name."],
            }),
        });
        let mut context = ToolsContext {
            instruction_blocks: vec![
                raw("1", "greeting", "Say hello."),
                raw("2", "greeting", "Ask how they are."),
            ],
            ..Default::default()
        };
        let scenarios = HashMap::from([("greeting".to_string(), scenario("greeting", None))]);
        summarize_instructions(&mut context, &scenarios, &llm, &ScenarioDecisions::new()).await;

        assert!(context.instruction_blocks.iter().all(|b| b.kind != BlockKind::Raw));
        let agent_blocks: Vec<_> =
            context.instruction_blocks.iter().filter(|b| b.kind == BlockKind::Required).collect();
        assert_eq!(agent_blocks.len(), 1);
        assert_eq!(agent_blocks[0].text.as_deref(), Some("Greet warmly and ask about their day."));
        let judge_blocks: Vec<_> = context.instruction_blocks.iter().filter(|b| b.kind == BlockKind::Rule).collect();
        assert_eq!(judge_blocks.len(), 1);
        assert_eq!(context.applied.len(), 1);
        assert_eq!(context.applied[0].name, "greeting");
    }

    #[tokio::test]
    async fn opted_out_scenario_keeps_first_lines_verbatim() {
        let llm: Arc<dyn LlmGateway> = Arc::new(StubGateway { reply: json!({"agent_imperatives": ["ignored"], "judge_rules": []}) });
        let mut context = ToolsContext {
            instruction_blocks: vec![
                raw("1", "raw_scenario", "Line one."),
                raw("2", "raw_scenario", "Line two."),
                raw("3", "raw_scenario", "Line three."),
                raw("4", "raw_scenario", "Line four."),
            ],
            ..Default::default()
        };
        let scenarios = HashMap::from([("raw_scenario".to_string(), scenario("raw_scenario", Some(false)))]);
        summarize_instructions(&mut context, &scenarios, &llm, &ScenarioDecisions::new()).await;
        let agent_blocks: Vec<_> =
            context.instruction_blocks.iter().filter(|b| b.kind == BlockKind::Required).collect();
        assert_eq!(agent_blocks.len(), FALLBACK_LINE_CAP);
    }

    #[tokio::test]
    async fn empty_llm_response_falls_back_to_verbatim_lines() {
        let llm: Arc<dyn LlmGateway> =
            Arc::new(StubGateway { reply: json!({"agent_imperatives": [], "judge_rules": []}) });
        let mut context = ToolsContext { instruction_blocks: vec![raw("1", "solo", "Only line.")], ..Default::default() };
        let scenarios = HashMap::from([("solo".to_string(), scenario("solo", None))]);
        summarize_instructions(&mut context, &scenarios, &llm, &ScenarioDecisions::new()).await;
        let agent_blocks: Vec<_> =
            context.instruction_blocks.iter().filter(|b| b.kind == BlockKind::Required).collect();
        assert_eq!(agent_blocks.len(), 1);
        assert_eq!(agent_blocks[0].text.as_deref(), Some("Only line."));
    }

    #[tokio::test]
    async fn judge_rule_blocks_are_never_grouped_or_rewritten() {
        let llm: Arc<dyn LlmGateway> = Arc::new(StubGateway { reply: json!({"agent_imperatives": ["ignored"], "judge_rules": []}) });
        let mut context =
            ToolsContext { instruction_blocks: vec![InstructionBlock::rule_judge("1", "rules", "Never swear.")], ..Default::default() };
        let scenarios = HashMap::new();
        summarize_instructions(&mut context, &scenarios, &llm, &ScenarioDecisions::new()).await;
        assert_eq!(context.instruction_blocks.len(), 1);
        assert_eq!(context.instruction_blocks[0].text.as_deref(), Some("Never swear."));
    }

    #[tokio::test]
    async fn required_blocks_from_condition_decide_pass_through_untouched() {
        let llm: Arc<dyn LlmGateway> = Arc::new(StubGateway { reply: json!({"agent_imperatives": ["ignored"], "judge_rules": []}) });
        let mut context = ToolsContext {
            instruction_blocks: vec![InstructionBlock::required_agent("1", "birthday", "Поздравь Ивана!")],
            ..Default::default()
        };
        let scenarios = HashMap::new();
        summarize_instructions(&mut context, &scenarios, &llm, &ScenarioDecisions::new()).await;
        assert_eq!(context.instruction_blocks.len(), 1);
        assert_eq!(context.instruction_blocks[0].text.as_deref(), Some("Поздравь Ивана!"));
    }

    #[tokio::test]
    async fn unknown_only_decision_drops_raw_texts_without_calling_the_llm() {
        let llm: Arc<dyn LlmGateway> = Arc::new(StubGateway {
            reply: json!({"agent_imperatives": ["should not be used"], "judge_rules": []}),
        });
        let mut context = ToolsContext {
            instruction_blocks: vec![raw("1", "discount", "Tell them about the discount.")],
            applied: vec![sa_domain::model::AppliedEntry { kind: "scenario".to_string(), name: "discount".to_string() }],
            ..Default::default()
        };
        let scenarios = HashMap::from([("discount".to_string(), scenario("discount", None))]);
        let decisions = ScenarioDecisions::from([("discount".to_string(), vec![ConditionDecision::Unknown])]);
        summarize_instructions(&mut context, &scenarios, &llm, &decisions).await;

        assert!(context.instruction_blocks.is_empty());
        assert!(context.applied.is_empty());
    }

    #[tokio::test]
    async fn ignore_only_decision_drops_the_scenario_entirely() {
        let llm: Arc<dyn LlmGateway> =
            Arc::new(StubGateway { reply: json!({"agent_imperatives": ["should not be used"], "judge_rules": []}) });
        let mut context = ToolsContext {
            instruction_blocks: vec![raw("1", "weather", "Mention the weather.")],
            applied: vec![sa_domain::model::AppliedEntry { kind: "scenario".to_string(), name: "weather".to_string() }],
            ..Default::default()
        };
        let scenarios = HashMap::from([("weather".to_string(), scenario("weather", None))]);
        let decisions = ScenarioDecisions::from([("weather".to_string(), vec![ConditionDecision::Ignore])]);
        summarize_instructions(&mut context, &scenarios, &llm, &decisions).await;

        assert!(context.instruction_blocks.is_empty());
        assert!(context.applied.is_empty());
    }

    #[tokio::test]
    async fn a_true_decision_among_others_still_summarizes() {
        let llm: Arc<dyn LlmGateway> = Arc::new(StubGateway {
            reply: json!({"agent_imperatives": ["Congratulate the user."], "judge_rules": []}),
        });
        let mut context = ToolsContext {
            instruction_blocks: vec![raw("1", "birthday", "Поздравь пользователя с днём рождения.")],
            ..Default::default()
        };
        let scenarios = HashMap::from([("birthday".to_string(), scenario("birthday", None))]);
        let decisions = ScenarioDecisions::from([(
            "birthday".to_string(),
            vec![ConditionDecision::Ignore, ConditionDecision::True],
        )]);
        summarize_instructions(&mut context, &scenarios, &llm, &decisions).await;

        let agent_blocks: Vec<_> =
            context.instruction_blocks.iter().filter(|b| b.kind == BlockKind::Required).collect();
        assert_eq!(agent_blocks.len(), 1);
        assert_eq!(agent_blocks[0].text.as_deref(), Some("Congratulate the user."));
        assert_eq!(context.applied.len(), 1);
        assert_eq!(context.applied[0].name, "birthday");
    }
}
