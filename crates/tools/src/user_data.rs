//! `get_user_data`: the one tool shipped with this system. Stub profile
//! generator — a random Russian name and age, used by scenarios and the
//! v0.1 pipeline to fill `ConversationState::user_profile` on first
//! contact.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;

use sa_domain::model::ToolSpec;

use crate::registry::Tool;

const FIRST_NAMES: &[&str] = &[
    "Иван", "Алексей", "Мария", "Анна", "Сергей", "Екатерина", "Дмитрий", "Ольга", "Павел", "Наталья",
];

const LAST_NAMES: &[&str] = &[
    "Иванов", "Петров", "Сидоров", "Смирнов", "Кузнецов", "Попова", "Васильев", "Федорова", "Морозов",
    "Новикова",
];

pub struct GetUserData;

#[async_trait]
impl Tool for GetUserData {
    fn name(&self) -> &str {
        "get_user_data"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_user_data".into(),
            description: "Возвращает данные профиля пользователя (имя, возраст).".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {},
            }),
            output_schema: serde_json::json!({
                "type": "object",
                "additionalProperties": true,
                "properties": {
                    "name": {"type": "string"},
                    "age": {"type": "integer"},
                },
            }),
        }
    }

    async fn call(&self) -> serde_json::Value {
        let mut rng = rand::thread_rng();
        let first = FIRST_NAMES.choose(&mut rng).unwrap();
        let last = LAST_NAMES.choose(&mut rng).unwrap();
        let age = rng.gen_range(18..=120);
        serde_json::json!({
            "name": format!("{last} {first}"),
            "age": age,
            "birthday_date": serde_json::Value::Null,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_a_name_and_an_age_in_range() {
        let result = GetUserData.call().await;
        let age = result["age"].as_i64().unwrap();
        assert!((18..=120).contains(&age));
        assert!(result["name"].as_str().unwrap().contains(' '));
        assert!(result["birthday_date"].is_null());
    }
}
