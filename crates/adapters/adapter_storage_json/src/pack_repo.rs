//! JSON implementation of [`RuleRepository`].

use std::future::Future;

use serde_json::Value;

use nudge_app::ports::{PackSummary, RulePack, RuleRepository};
use nudge_domain::error::NudgeError;
use nudge_domain::rule::Rule;

use crate::error::StorageError;
use crate::manifest::{PackDir, PackLocator};

/// Reads rules from the trigger file a pack manifest points at.
///
/// The trigger file is a JSON array of rule objects. Each element is parsed
/// on its own so one malformed rule never hides the others.
#[derive(Debug, Clone)]
pub struct JsonPackRepository {
    locator: PackLocator,
}

impl JsonPackRepository {
    #[must_use]
    pub fn new(locator: PackLocator) -> Self {
        Self { locator }
    }
}

impl RuleRepository for JsonPackRepository {
    fn load_pack(&self, pack_id: &str) -> impl Future<Output = Result<RulePack, NudgeError>> + Send {
        let locator = self.locator.clone();
        let pack_id = pack_id.to_string();
        async move {
            let pack = locator.locate(&pack_id).await?;
            let (rules, skipped) = read_rules(&pack).await?;
            let audio_dir = pack
                .manifest
                .audio
                .event_audio_dir
                .as_deref()
                .map(|dir| pack.resolve(dir));
            Ok(RulePack {
                pack_id,
                rules,
                audio_dir,
                skipped,
            })
        }
    }

    fn list_packs(&self) -> impl Future<Output = Result<Vec<PackSummary>, NudgeError>> + Send {
        let locator = self.locator.clone();
        async move {
            let packs = locator.scan().await?;
            Ok(packs
                .into_iter()
                .map(|pack| PackSummary {
                    name: pack.manifest.display_name(&pack.id),
                    id: pack.id,
                })
                .collect())
        }
    }
}

async fn read_rules(pack: &PackDir) -> Result<(Vec<Rule>, usize), StorageError> {
    let file = pack
        .manifest
        .rule_file()
        .ok_or_else(|| StorageError::NoRuleFile(pack.id.clone()))?;
    let path = pack.resolve(file);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|err| StorageError::io(&path, err))?;
    let raw: Vec<Value> =
        serde_json::from_slice(&bytes).map_err(|err| StorageError::json(&path, err))?;

    let mut rules = Vec::with_capacity(raw.len());
    let mut skipped = 0;
    for (index, value) in raw.into_iter().enumerate() {
        match serde_json::from_value::<Rule>(value) {
            Ok(rule) => rules.push(rule),
            Err(err) => {
                tracing::warn!(pack_id = %pack.id, index, error = %err, "skipping unparseable rule");
                skipped += 1;
            }
        }
    }
    tracing::debug!(pack_id = %pack.id, rules = rules.len(), skipped, "rule file read");
    Ok((rules, skipped))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::manifest::tests::write_pack;

    fn repo(dir: &tempfile::TempDir) -> JsonPackRepository {
        JsonPackRepository::new(PackLocator::new(dir.path()))
    }

    #[tokio::test]
    async fn should_load_rules_and_audio_dir_from_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let root = write_pack(
            dir.path(),
            "Cat",
            &json!({
                "pack_info": {"id": "cat"},
                "logic": {"interaction_configs": {"triggers": "logic/triggers.json"}},
                "audio": {"event_audio_dir": "audio/event"}
            }),
        );
        std::fs::create_dir_all(root.join("logic")).unwrap();
        std::fs::write(
            root.join("logic/triggers.json"),
            json!([
                {"id": "hot", "conditions": [{"type": "cpu_temp", "gt": 80}], "actions": []},
                {"id": 7, "cooldown": 12}
            ])
            .to_string(),
        )
        .unwrap();

        let pack = repo(&dir).load_pack("cat").await.unwrap();

        assert_eq!(pack.pack_id, "cat");
        assert_eq!(pack.rules.len(), 2);
        assert_eq!(pack.rules[1].id.as_str(), "7");
        assert_eq!(pack.audio_dir, Some(root.join("audio/event")));
        assert_eq!(pack.skipped, 0);
    }

    #[tokio::test]
    async fn should_skip_unparseable_rules() {
        let dir = tempfile::tempdir().unwrap();
        let root = write_pack(dir.path(), "cat", &json!({"logic": {"triggers": "t.json"}}));
        std::fs::write(
            root.join("t.json"),
            json!([{"id": "ok"}, {"id": "bad", "probability": "often"}, 42]).to_string(),
        )
        .unwrap();

        let pack = repo(&dir).load_pack("cat").await.unwrap();

        assert_eq!(pack.rules.len(), 1);
        assert_eq!(pack.skipped, 2);
    }

    #[tokio::test]
    async fn should_fail_when_rule_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        write_pack(dir.path(), "cat", &json!({"logic": {"triggers": "absent.json"}}));

        let err = repo(&dir).load_pack("cat").await.unwrap_err();

        assert!(matches!(err, NudgeError::Storage(_)));
    }

    #[tokio::test]
    async fn should_fail_when_manifest_names_no_rule_file() {
        let dir = tempfile::tempdir().unwrap();
        write_pack(dir.path(), "cat", &json!({}));

        let err = repo(&dir).load_pack("cat").await.unwrap_err();

        assert!(matches!(err, NudgeError::Storage(_)));
    }

    #[tokio::test]
    async fn should_list_packs_with_display_names() {
        let dir = tempfile::tempdir().unwrap();
        write_pack(
            dir.path(),
            "A",
            &json!({"pack_info": {"id": "alpha"}, "character": {"name": "Luna"}}),
        );
        write_pack(dir.path(), "beta", &json!({}));

        let packs = repo(&dir).list_packs().await.unwrap();

        assert_eq!(
            packs,
            vec![
                PackSummary {
                    id: "alpha".to_string(),
                    name: "Luna".to_string()
                },
                PackSummary {
                    id: "beta".to_string(),
                    name: "beta".to_string()
                },
            ]
        );
    }
}
