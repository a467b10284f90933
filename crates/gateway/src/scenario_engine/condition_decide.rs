//! Condition-decide phase, grounded in `tools_subgraph.py`'s
//! `_decide_condition_via_llm`.
//!
//! Every [`BlockKind::Conditional`] block left in the reduced
//! [`ToolsContext`] after [`super::map`]'s deterministic pre-resolution is
//! classified against the current user message by one concurrent LLM call
//! per block, then rewritten into a plain `required_agent`/dropped block.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::json;

use sa_domain::model::{BlockKind, ConditionDecideResult, ConditionDecision, InstructionBlock, ToolsContext};
use sa_domain::trace::TraceEvent;
use sa_providers::{ChatMessage, LlmGateway, ModelRole};

/// Every `ConditionDecision` reached this turn, keyed by the owning
/// scenario's name — feeds [`super::summarize`]'s enable policy (§4.6.5),
/// which needs to tell "only `ignore` happened" from "nothing decided at
/// all" for a scenario with no condition nodes.
pub type ScenarioDecisions = HashMap<String, Vec<ConditionDecision>>;

const SCHEMA_NAME: &str = "condition_decide";

fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "decision": {"type": "string", "enum": ["ignore", "true", "false", "unknown"]},
            "followup_question": {"type": "string"},
        },
        "required": ["decision", "followup_question"],
        "additionalProperties": false,
    })
}

/// Resolve every remaining conditional block in `context` against
/// `user_message`, mutating it in place. Returns the decisions reached,
/// grouped by owning scenario, for [`super::summarize`]'s enable policy.
pub async fn decide_conditions(
    context: &mut ToolsContext,
    user_message: &str,
    llm: &Arc<dyn LlmGateway>,
) -> ScenarioDecisions {
    let pending: Vec<usize> = context
        .instruction_blocks
        .iter()
        .enumerate()
        .filter(|(_, b)| b.kind == BlockKind::Conditional)
        .map(|(i, _)| i)
        .collect();

    if pending.is_empty() {
        return ScenarioDecisions::new();
    }

    let decisions = join_all(pending.iter().map(|&i| {
        let block = context.instruction_blocks[i].clone();
        let llm = Arc::clone(llm);
        let user_message = user_message.to_string();
        async move { (i, decide_one(&block, &user_message, &llm).await) }
    }))
    .await;

    let mut judge_rules = Vec::new();
    let mut extra_raw_blocks = Vec::new();
    let mut per_scenario: ScenarioDecisions = ScenarioDecisions::new();

    for (i, decision) in decisions {
        let block = &context.instruction_blocks[i];
        let payload = block.payload.clone().expect("conditional block carries a payload");
        let decision_name = format!("{:?}", decision.decision).to_lowercase();
        per_scenario.entry(block.source.clone()).or_default().push(decision.decision);
        TraceEvent::ConditionDecided {
            scenario: block.source.clone(),
            block_id: block.id.clone(),
            decision: decision_name.clone(),
        }
        .emit();

        if decision.decision != ConditionDecision::Ignore {
            judge_rules.push(InstructionBlock::rule_judge(
                format!("{}:judge", block.id),
                block.source.clone(),
                format!(
                    "condition `{}` was decided `{}`; the answer must not contradict this or use the opposite branch.",
                    payload.condition, decision_name
                ),
            ));
        }

        // `true`/`false` decisions fan each branch line out into its own
        // `raw/agent` block (one per `when_true`/`when_false` text) rather
        // than joining them into a single `required` block, so that
        // `summarize.rs`'s §4.6.5 imperative-compression phase — which only
        // groups `BlockKind::Raw` blocks by source scenario — sees them.
        let mut raw_lines: Vec<String> = match decision.decision {
            ConditionDecision::True if !payload.when_true.is_empty() => payload.when_true.clone(),
            ConditionDecision::False if !payload.when_false.is_empty() => payload.when_false.clone(),
            ConditionDecision::Unknown => {
                context.instruction_blocks[i] = InstructionBlock::required_agent(
                    block.id.clone(),
                    block.source.clone(),
                    format!(
                        "Сначала ответь на основной вопрос пользователя, затем в конце задай уточняющий вопрос: {}",
                        decision.followup_question
                    ),
                );
                continue;
            }
            _ => continue,
        };

        let first_line = raw_lines.remove(0);
        context.instruction_blocks[i] =
            InstructionBlock::raw_agent(format!("{}:0", block.id), block.source.clone(), first_line);
        for (line_idx, line) in raw_lines.into_iter().enumerate() {
            extra_raw_blocks.push(InstructionBlock::raw_agent(
                format!("{}:{}", block.id, line_idx + 1),
                block.source.clone(),
                line,
            ));
        }
    }

    context.instruction_blocks.retain(|b| b.kind != BlockKind::Conditional);
    context.instruction_blocks.extend(judge_rules);
    context.instruction_blocks.extend(extra_raw_blocks);
    per_scenario
}

async fn decide_one(block: &InstructionBlock, user_message: &str, llm: &Arc<dyn LlmGateway>) -> ConditionDecideResult {
    let Some(payload) = &block.payload else {
        return ConditionDecideResult { decision: ConditionDecision::Ignore, followup_question: String::new() };
    };

    let system = ChatMessage::system(
        "Ты классифицируешь условие сценария диалога по последнему сообщению пользователя. \
         Верни одно из: ignore, true, false, unknown. \
         ignore — сообщение не относится к теме условия. \
         true — из сообщения явно следует, что условие выполняется. \
         false — из сообщения явно следует, что условие НЕ выполняется, но тема та же. \
         unknown — тема упомянута, но неясно true/false.",
    );
    let user = ChatMessage::user(format!(
        "Условие: {}\n{}\nСообщение пользователя: {}",
        payload.condition,
        payload.condition_text.as_deref().unwrap_or(""),
        user_message
    ));

    let result = llm.chat_json(&[system, user], &schema(), SCHEMA_NAME, 0.0, ModelRole::Condition, None).await;

    match result {
        Ok(value) => serde_json::from_value(value)
            .unwrap_or(ConditionDecideResult { decision: ConditionDecision::Ignore, followup_question: String::new() }),
        Err(err) => {
            tracing::warn!(error = %err, block_id = %block.id, "condition decide call failed, defaulting to ignore");
            ConditionDecideResult { decision: ConditionDecision::Ignore, followup_question: String::new() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sa_domain::error::Result;
    use sa_domain::model::{ApplyPolicy, ConditionalPayload};

    struct StubGateway {
        decision: &'static str,
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
            Ok(json!({"decision": self.decision, "followup_question": ""}))
        }
    }

    fn conditional_block() -> InstructionBlock {
        InstructionBlock::conditional_agent(
            "1",
            "birthday",
            ConditionalPayload {
                condition: "user mentions birthday".to_string(),
                condition_text: None,
                when_true: vec!["Congratulate the user.".to_string()],
                when_false: vec!["Ask about their day.".to_string()],
                apply_policy: ApplyPolicy::default(),
            },
        )
    }

    #[tokio::test]
    async fn true_decision_rewrites_block_with_when_true_text() {
        let llm: Arc<dyn LlmGateway> = Arc::new(StubGateway { decision: "true" });
        let mut context = ToolsContext { instruction_blocks: vec![conditional_block()], ..Default::default() };
        decide_conditions(&mut context, "it's my birthday today", &llm).await;
        // One rewritten required/agent block plus one paired rule/judge block.
        assert_eq!(context.instruction_blocks.len(), 2);
        let agent_block = context
            .instruction_blocks
            .iter()
            .find(|b| b.target == sa_domain::model::BlockTarget::Agent)
            .unwrap();
        assert_eq!(agent_block.text.as_deref(), Some("Congratulate the user."));
        assert!(context
            .instruction_blocks
            .iter()
            .any(|b| b.target == sa_domain::model::BlockTarget::Judge));
    }

    #[tokio::test]
    async fn true_decision_emits_one_raw_block_per_when_true_line() {
        let llm: Arc<dyn LlmGateway> = Arc::new(StubGateway { decision: "true" });
        let block = InstructionBlock::conditional_agent(
            "1",
            "birthday",
            ConditionalPayload {
                condition: "user mentions birthday".to_string(),
                condition_text: None,
                when_true: vec!["Congratulate the user.".to_string(), "Mention the cake.".to_string()],
                when_false: vec![],
                apply_policy: ApplyPolicy::default(),
            },
        );
        let mut context = ToolsContext { instruction_blocks: vec![block], ..Default::default() };
        decide_conditions(&mut context, "it's my birthday today", &llm).await;

        let raw_blocks: Vec<_> =
            context.instruction_blocks.iter().filter(|b| b.kind == BlockKind::Raw).collect();
        assert_eq!(raw_blocks.len(), 2);
        assert!(raw_blocks.iter().any(|b| b.text.as_deref() == Some("Congratulate the user.")));
        assert!(raw_blocks.iter().any(|b| b.text.as_deref() == Some("Mention the cake.")));
        assert!(raw_blocks.iter().all(|b| b.source == "birthday"));
    }

    #[tokio::test]
    async fn unknown_decision_emits_followup_question_block() {
        let llm: Arc<dyn LlmGateway> = Arc::new(StubGateway { decision: "unknown" });
        let mut context = ToolsContext { instruction_blocks: vec![conditional_block()], ..Default::default() };
        decide_conditions(&mut context, "что там по скидкам", &llm).await;
        let agent_blocks: Vec<_> = context
            .instruction_blocks
            .iter()
            .filter(|b| b.target == sa_domain::model::BlockTarget::Agent)
            .collect();
        assert_eq!(agent_blocks.len(), 1);
        assert_eq!(agent_blocks[0].kind, BlockKind::Required);
    }

    #[tokio::test]
    async fn ignore_decision_drops_the_block() {
        let llm: Arc<dyn LlmGateway> = Arc::new(StubGateway { decision: "ignore" });
        let mut context = ToolsContext { instruction_blocks: vec![conditional_block()], ..Default::default() };
        decide_conditions(&mut context, "what's the weather", &llm).await;
        assert!(context.instruction_blocks.is_empty());
    }

    #[tokio::test]
    async fn no_pending_conditionals_is_a_no_op() {
        let llm: Arc<dyn LlmGateway> = Arc::new(StubGateway { decision: "true" });
        let mut context = ToolsContext::default();
        decide_conditions(&mut context, "hi", &llm).await;
        assert!(context.instruction_blocks.is_empty());
    }
}
