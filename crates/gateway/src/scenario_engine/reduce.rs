//! Reduce phase, grounded in `scenario_engine.py`'s `_reduce_results`.
//!
//! Merges the per-scenario [`ScenarioMapResult`]s produced by
//! [`super::map::run_scenario_map`] into a single [`ToolsContext`]: facts are
//! first-writer-wins (the earliest scenario in iteration order keeps its
//! value), and instruction blocks are concatenated. Scenarios are iterated
//! in name order so the merge is deterministic regardless of the order the
//! concurrent map tasks complete in.

use sa_domain::model::{AppliedEntry, ToolsContext};

use super::map::ScenarioMapResult;

pub fn reduce_scenario_maps(mut results: Vec<ScenarioMapResult>) -> ToolsContext {
    results.sort_by(|a, b| a.scenario_name.cmp(&b.scenario_name));

    let mut context = ToolsContext::default();
    for result in results {
        if result.instruction_blocks.is_empty() && result.facts.is_empty() {
            continue;
        }
        for (key, value) in result.facts {
            context.facts.entry(key).or_insert(value);
        }
        if !result.instruction_blocks.is_empty() {
            context.applied.push(AppliedEntry { kind: "scenario".to_string(), name: result.scenario_name.clone() });
        }
        context.instruction_blocks.extend(result.instruction_blocks);
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::model::InstructionBlock;
    use std::collections::HashMap;

    fn result(name: &str, fact_key: &str, fact_value: serde_json::Value) -> ScenarioMapResult {
        let mut facts = HashMap::new();
        facts.insert(fact_key.to_string(), fact_value);
        ScenarioMapResult {
            scenario_name: name.to_string(),
            facts,
            instruction_blocks: vec![InstructionBlock::required_agent("1", name, "hi")],
        }
    }

    #[test]
    fn merges_facts_first_writer_wins_in_name_order() {
        let a = result("b_scenario", "tool:x", serde_json::json!("from_b"));
        let b = result("a_scenario", "tool:x", serde_json::json!("from_a"));
        let context = reduce_scenario_maps(vec![a, b]);
        assert_eq!(context.facts["tool:x"], serde_json::json!("from_a"));
    }

    #[test]
    fn concatenates_instruction_blocks_in_name_order() {
        let a = result("zzz", "tool:a", serde_json::json!(1));
        let b = result("aaa", "tool:b", serde_json::json!(2));
        let context = reduce_scenario_maps(vec![a, b]);
        assert_eq!(context.instruction_blocks[0].source, "aaa");
        assert_eq!(context.instruction_blocks[1].source, "zzz");
    }

    #[test]
    fn empty_result_contributes_nothing() {
        let empty = ScenarioMapResult { scenario_name: "quiet".to_string(), ..Default::default() };
        let context = reduce_scenario_maps(vec![empty]);
        assert!(context.applied.is_empty());
        assert!(context.instruction_blocks.is_empty());
    }
}
