use modrun_store::{AssetRecord, ModuleRecord, TaskRecord};

/// Render module records as aligned text, one per line.
pub fn render_modules(modules: &[ModuleRecord]) -> String {
    if modules.is_empty() {
        return "No modules registered.\n".to_string();
    }
    let mut out = String::new();
    for m in modules {
        out.push_str(&format!(
            "{:<28} {:<11} v{:<8} {}\n",
            m.id, m.status, m.config.version, m.path.display()
        ));
        let inputs: Vec<&str> = m.capabilities.inputs.iter().map(|i| i.key.as_str()).collect();
        let outputs: Vec<&str> = m.capabilities.outputs.iter().map(|o| o.key.as_str()).collect();
        out.push_str(&format!(
            "    inputs: [{}]  outputs: [{}]\n",
            inputs.join(", "),
            outputs.join(", ")
        ));
    }
    out
}

pub fn render_assets(assets: &[AssetRecord]) -> String {
    if assets.is_empty() {
        return "No assets.\n".to_string();
    }
    let mut out = String::new();
    for a in assets {
        out.push_str(&format!(
            "{}  {:<9} {:<5} {:<24} {}\n",
            a.id, a.status, a.kind, a.media_type, a.label
        ));
    }
    out
}

pub fn render_task(task: &TaskRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("task:     {}\n", task.id));
    out.push_str(&format!("module:   {}\n", task.module_id));
    out.push_str(&format!("status:   {}\n", task.status));
    out.push_str(&format!("created:  {}\n", task.created_at));
    if let Some(started) = task.started_at {
        out.push_str(&format!("started:  {}\n", started));
    }
    if let Some(finished) = task.finished_at {
        out.push_str(&format!("finished: {}\n", finished));
    }
    for (key, asset) in &task.input_map {
        out.push_str(&format!("input:    {} <- {}\n", key, asset));
    }
    for (key, asset) in &task.output_map {
        out.push_str(&format!("output:   {} -> {}\n", key, asset));
    }
    if !task.blocking_assets.is_empty() {
        let blockers: Vec<&str> = task.blocking_assets.iter().map(|a| a.as_str()).collect();
        out.push_str(&format!("blocked on: {}\n", blockers.join(", ")));
    }
    if let Some(error) = &task.error_log {
        out.push_str(&format!("error:    {}\n", error));
    }
    if !task.logs.is_empty() {
        out.push_str("logs:\n");
        for line in &task.logs {
            out.push_str(&format!("  {}\n", line));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use modrun_domain::{AssetId, ModuleId, TaskId};
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn task_rendering_covers_bindings_and_errors() {
        let mut task = TaskRecord::new(
            TaskId::new("t-1"),
            ModuleId::new("echo"),
            BTreeMap::from([("msg".to_string(), AssetId::new("a-in"))]),
            BTreeMap::from([("response".to_string(), AssetId::new("a-out"))]),
            json!({}),
            vec![AssetId::new("a-in")],
            Utc::now(),
        );
        task.mark_failed("boom".to_string(), vec!["line one".to_string()], Utc::now());

        let text = render_task(&task);
        assert!(text.contains("msg <- a-in"));
        assert!(text.contains("response -> a-out"));
        assert!(text.contains("error:    boom"));
        assert!(text.contains("line one"));
    }

    #[test]
    fn empty_listings_have_placeholders() {
        assert_eq!(render_modules(&[]), "No modules registered.\n");
        assert_eq!(render_assets(&[]), "No assets.\n");
    }
}
