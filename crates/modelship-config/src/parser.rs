//! modelship.kdl パーサー

use crate::error::{ConfigError, Result};
use crate::model::{ModelSettings, PollSetting, ProjectSettings, Settings};
use kdl::{KdlDocument, KdlNode};
use std::path::{Path, PathBuf};

const DESTROY_ORDERS: &[&str] = &["reverse-creation", "creation"];

/// KDLファイルを Settings にパース
pub fn parse_settings_file(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)?;
    parse_settings(&content)
}

/// KDL文字列を Settings にパース
pub fn parse_settings(content: &str) -> Result<Settings> {
    let doc: KdlDocument = content.parse()?;

    let mut project: Option<ProjectSettings> = None;
    let mut settings = Settings::new("");

    for node in doc.nodes() {
        match node.name().value() {
            "project" => project = Some(parse_project(node)?),
            "model" => {
                let path = first_string(node)
                    .ok_or_else(|| ConfigError::MissingField("model のパス".to_string()))?;
                settings.model = Some(ModelSettings {
                    path: PathBuf::from(path),
                    framework: prop_string(node, "framework"),
                });
            }
            "logs" => settings.logs = first_string(node).map(PathBuf::from),
            "target" => parse_target(node, &mut settings)?,
            "remote" => settings.remote = first_string(node),
            "polling" => {
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        match child.name().value() {
                            "build" => {
                                settings.polling.build =
                                    parse_poll(child, settings.polling.build)?
                            }
                            "function" => {
                                settings.polling.function =
                                    parse_poll(child, settings.polling.function)?
                            }
                            other => tracing::debug!("Ignoring polling entry: {}", other),
                        }
                    }
                }
            }
            "destroy-order" | "destroy_order" => {
                let order = first_string(node).unwrap_or_default();
                if !DESTROY_ORDERS.contains(&order.as_str()) {
                    return Err(ConfigError::InvalidValue(format!(
                        "destroy-order '{}' (reverse-creation / creation)",
                        order
                    )));
                }
                settings.destroy_order = order;
            }
            other => {
                // 不明なノードはスキップ
                tracing::debug!("Ignoring unknown node: {}", other);
            }
        }
    }

    settings.project = project.ok_or_else(|| ConfigError::MissingField("project".to_string()))?;
    Ok(settings)
}

fn parse_project(node: &KdlNode) -> Result<ProjectSettings> {
    let name = first_string(node)
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingField("project の名前".to_string()))?;

    let mut project = ProjectSettings::new(name);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let Some(value) = first_string(child) else {
                continue;
            };
            match child.name().value() {
                "version" => project.version = value,
                "description" => project.description = value,
                "iteration" => project.iteration = value,
                _ => {}
            }
        }
    }

    Ok(project)
}

fn parse_target(node: &KdlNode, settings: &mut Settings) -> Result<()> {
    let target = &mut settings.target;
    target.provider = first_string(node)
        .ok_or_else(|| ConfigError::MissingField("target のプロバイダー名".to_string()))?;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "profile" => target.profile = first_string(child),
                "region" => {
                    if let Some(region) = first_string(child) {
                        target.region = region;
                    }
                }
                "stage" => {
                    if let Some(stage) = first_string(child) {
                        target.stage = stage;
                    }
                }
                "keep-warm" | "keep_warm" => {
                    target.keep_warm = match first_string(child) {
                        Some(schedule) if schedule != "off" => Some(schedule),
                        _ => None,
                    };
                }
                other => tracing::debug!("Ignoring target entry: {}", other),
            }
        }
    }
    Ok(())
}

fn parse_poll(node: &KdlNode, mut poll: PollSetting) -> Result<PollSetting> {
    for entry in node.entries() {
        let Some(name) = entry.name() else {
            continue;
        };
        let value = entry.value().as_integer();
        match (name.value(), value) {
            ("interval", Some(v)) if v >= 0 => poll.interval_secs = v as u64,
            ("attempts", Some(v)) if v >= 1 => poll.attempts = v as u32,
            ("interval" | "attempts", _) => {
                return Err(ConfigError::InvalidValue(format!(
                    "polling {} {}",
                    node.name().value(),
                    name.value()
                )));
            }
            _ => {}
        }
    }
    Ok(poll)
}

fn first_string(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn prop_string(node: &KdlNode, key: &str) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_some_and(|n| n.value() == key))
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}
